use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("ACH parse error: {0}")]
    Parse(String),
    #[error("invalid filename {0:?}")]
    Filename(String),
    #[error("invalid cutoff time: {0}")]
    Cutoff(String),
    #[error("file {0:?} has no batches")]
    EmptyFile(String),
    #[error("no transfer matches trace number {0}")]
    TransferNotFound(String),
    #[error("no transfer or micro-deposit matches returned entry {0}")]
    ReturnNotMatched(String),
    #[error("unhandled return code {0}")]
    UnhandledReturnCode(String),
    #[error("change code {0} is unsupported, skipping")]
    UnsupportedChangeCode(String),
    #[error("missing corrected data for change code {0}")]
    MissingCorrectedData(String),
    #[error("agent error: {0}")]
    Agent(String),
    #[error("coordinator is not running")]
    CoordinatorStopped,
    #[error("request {0} timed out")]
    RequestTimeout(String),
    #[error("validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, TransferError>;

use crate::domain::ach::TraceNumber;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepositoryStatus {
    Unverified,
    Verified,
    Rejected,
}

/// A bank account we originate to or receive from. Account numbers arrive
/// encrypted from upstream; this system treats them as opaque strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Depository {
    pub id: String,
    pub routing_number: String,
    pub account_number: String,
    pub status: DepositoryStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Pending,
    /// Folded into a merged file; filename and trace number recorded. Marking
    /// is idempotent so reprocessing the same source file is harmless.
    Merged,
    /// Uploaded to the destination institution.
    Processed,
    /// Pulled back by a correction or return.
    Reclaimed,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: String,
    pub sec_code: String,
    pub amount: Decimal,
    pub trace_number: Option<TraceNumber>,
    /// YYMMDD effective entry date.
    pub effective_date: String,
    pub status: TransferStatus,
    pub originator_depository: String,
    pub receiver_depository: String,
    pub return_code: Option<String>,
    /// Ledger posting to reverse on reclaim; absent for transfers that never
    /// posted.
    pub transaction_id: Option<String>,
    /// Merged-file name once status reaches `Merged`.
    pub merged_filename: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MicroDeposit {
    pub depository_id: String,
    pub amount: Decimal,
    pub status: TransferStatus,
    pub trace_number: Option<TraceNumber>,
    pub merged_filename: Option<String>,
    pub transaction_id: Option<String>,
    pub return_code: Option<String>,
}

/// A pending payment record not yet folded into a merged file. Carries its
/// destination and the path of its own single-payment source file.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupableTransfer {
    pub transfer_id: String,
    pub destination: String,
    pub source_path: std::path::PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadableMicroDeposit {
    pub depository_id: String,
    pub destination: String,
    pub source_path: std::path::PathBuf,
}

/// Per-routing-number transfer configuration, read fresh each cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferConfig {
    pub routing_number: String,
    pub inbound_path: String,
    pub outbound_path: String,
    pub return_path: String,
    #[serde(default)]
    pub filename_template: Option<String>,
    #[serde(default)]
    pub allowed_ips: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportCredentials {
    pub routing_number: String,
    pub hostname: String,
    pub username: String,
    pub password: String,
}

/// Which wire protocol serves a routing number, resolved once per cycle from
/// the credential tables (FTP checked first).
#[derive(Debug, Clone, PartialEq)]
pub enum Transport {
    Ftp(TransportCredentials),
    Sftp(TransportCredentials),
}

impl Transport {
    pub fn resolve(
        routing_number: &str,
        ftp: &[TransportCredentials],
        sftp: &[TransportCredentials],
    ) -> Option<Transport> {
        if let Some(c) = ftp.iter().find(|c| c.routing_number == routing_number) {
            return Some(Transport::Ftp(c.clone()));
        }
        sftp.iter()
            .find(|c| c.routing_number == routing_number)
            .map(|c| Transport::Sftp(c.clone()))
    }
}

use crate::domain::ach::TraceNumber;
use crate::domain::cutoff::CutoffTime;
use crate::domain::records::{
    Depository, GroupableTransfer, MicroDeposit, Transfer, TransferConfig, Transport,
    TransportCredentials, UploadableMicroDeposit,
};
use crate::error::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Read-only source of per-routing-number configuration. Reloaded each cycle
/// so admin-side changes take effect at the next tick.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get_configs(&self) -> Result<Vec<TransferConfig>>;
    async fn get_cutoff_times(&self) -> Result<Vec<CutoffTime>>;
    async fn get_ftp_configs(&self) -> Result<Vec<TransportCredentials>>;
    async fn get_sftp_configs(&self) -> Result<Vec<TransportCredentials>>;
}

#[async_trait]
pub trait DepositoryRepo: Send + Sync {
    /// Look up the depository owning (destination routing number, account
    /// number). Corrections and returns resolve their targets this way.
    async fn lookup(&self, routing_number: &str, account_number: &str)
        -> Result<Option<Depository>>;
    /// Replace an existing depository. Never creates one.
    async fn update(&self, depository: Depository) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<Depository>>;
}

#[async_trait]
pub trait TransferRepo: Send + Sync {
    /// Match a transfer the way corrections and returns identify one:
    /// SEC code + amount + trace number + effective entry date.
    async fn find_matching(
        &self,
        sec_code: &str,
        amount: Decimal,
        trace_number: &TraceNumber,
        effective_date: &str,
    ) -> Result<Option<Transfer>>;
    async fn get(&self, id: &str) -> Result<Option<Transfer>>;
    async fn update(&self, transfer: Transfer) -> Result<()>;
    /// Transfers awaiting a merge, with their single-payment source files.
    async fn pending(&self) -> Result<Vec<GroupableTransfer>>;
    /// Record that a transfer landed in a merged file. Idempotent.
    async fn mark_merged(
        &self,
        transfer_id: &str,
        filename: &str,
        trace_number: &TraceNumber,
    ) -> Result<()>;
    /// Flip records matching an uploaded trace number to processed.
    async fn mark_processed(&self, trace_number: &TraceNumber) -> Result<()>;
}

#[async_trait]
pub trait MicroDepositRepo: Send + Sync {
    /// Match a returned micro-deposit credit by owning depository and amount.
    async fn find_by_amount(
        &self,
        depository_id: &str,
        amount: Decimal,
    ) -> Result<Option<MicroDeposit>>;
    async fn update(&self, micro_deposit: MicroDeposit) -> Result<()>;
    async fn pending(&self) -> Result<Vec<UploadableMicroDeposit>>;
    /// Record that a micro-deposit landed in a merged file. Idempotent.
    async fn mark_merged(
        &self,
        depository_id: &str,
        filename: &str,
        trace_number: &TraceNumber,
    ) -> Result<()>;
    async fn mark_processed(&self, trace_number: &TraceNumber) -> Result<()>;
    /// Reject a depository's micro-deposits outright and drop them from the
    /// pending set.
    async fn mark_rejected(&self, depository_id: &str) -> Result<()>;
}

/// Reverses postings in the accounts ledger when a transfer comes back.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn reverse_transaction(&self, transaction_id: &str) -> Result<()>;
}

/// One file pulled from a remote directory.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFile {
    pub filename: String,
    pub contents: Vec<u8>,
}

/// Session against one institution's remote directory tree. Sessions are
/// short-lived: opened, used for one download or upload batch, closed.
/// Methods take `&mut self` because the underlying session holds a current
/// directory and is not safe for concurrent navigation.
#[async_trait]
pub trait Agent: Send {
    async fn get_inbound_files(&mut self) -> Result<Vec<RemoteFile>>;
    async fn get_return_files(&mut self) -> Result<Vec<RemoteFile>>;
    /// Uploads and consumes the contents in one call.
    async fn upload_file(&mut self, filename: &str, contents: Vec<u8>) -> Result<()>;
    async fn delete(&mut self, path: &str) -> Result<()>;
    fn inbound_path(&self) -> &str;
    fn outbound_path(&self) -> &str;
    fn return_path(&self) -> &str;
    async fn close(&mut self) -> Result<()>;
}

/// Opens an Agent for a resolved transport. Injected so tests and local
/// deployments can swap the wire protocol for a filesystem double.
#[async_trait]
pub trait AgentFactory: Send + Sync {
    async fn connect(&self, transport: &Transport, config: &TransferConfig)
        -> Result<Box<dyn Agent>>;
}

pub type ConfigStoreBox = Box<dyn ConfigStore>;
pub type DepositoryRepoBox = Box<dyn DepositoryRepo>;
pub type TransferRepoBox = Box<dyn TransferRepo>;
pub type MicroDepositRepoBox = Box<dyn MicroDepositRepo>;
pub type LedgerClientBox = Box<dyn LedgerClient>;
pub type AgentFactoryBox = Box<dyn AgentFactory>;

//! Application layer: the scheduling coordinator, the merge engine, and the
//! cycle/processor logic it drives. Everything here talks to the outside
//! world through the ports in `domain::ports`, injected once at
//! construction.

pub mod coordinator;
pub mod correction;
pub mod inbound;
pub mod merge;
pub mod metrics;
pub mod removal;
pub mod returns;
pub mod upload;

use crate::application::metrics::Metrics;
use crate::domain::ports::{
    AgentFactoryBox, ConfigStoreBox, DepositoryRepoBox, LedgerClientBox, MicroDepositRepoBox,
    TransferRepoBox,
};
use std::sync::Arc;

/// Every external collaborator the orchestration core consumes, bundled so
/// cycle tasks can share one `Arc`.
pub struct Environment {
    pub config: ConfigStoreBox,
    pub depositories: DepositoryRepoBox,
    pub transfers: TransferRepoBox,
    pub micro_deposits: MicroDepositRepoBox,
    pub ledger: LedgerClientBox,
    pub agents: AgentFactoryBox,
    pub metrics: Arc<Metrics>,
}

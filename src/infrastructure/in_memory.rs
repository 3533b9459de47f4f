use crate::domain::ach::TraceNumber;
use crate::domain::ports::{DepositoryRepo, LedgerClient, MicroDepositRepo, TransferRepo};
use crate::domain::records::{
    Depository, GroupableTransfer, MicroDeposit, Transfer, TransferStatus, UploadableMicroDeposit,
};
use crate::error::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Thread-safe in-memory depository repository. The production deployment
/// points this port at the platform's SQL-backed repositories; this stand-in
/// serves tests and local runs.
#[derive(Default, Clone)]
pub struct InMemoryDepositoryRepo {
    depositories: Arc<RwLock<HashMap<String, Depository>>>,
}

impl InMemoryDepositoryRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, depository: Depository) {
        let mut map = self.depositories.write().await;
        map.insert(depository.id.clone(), depository);
    }
}

#[async_trait]
impl DepositoryRepo for InMemoryDepositoryRepo {
    async fn lookup(
        &self,
        routing_number: &str,
        account_number: &str,
    ) -> Result<Option<Depository>> {
        let map = self.depositories.read().await;
        Ok(map
            .values()
            .find(|d| d.routing_number == routing_number && d.account_number == account_number)
            .cloned())
    }

    async fn update(&self, depository: Depository) -> Result<()> {
        let mut map = self.depositories.write().await;
        // Upsert of an existing record only; unknown ids are dropped rather
        // than created.
        if map.contains_key(&depository.id) {
            map.insert(depository.id.clone(), depository);
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Depository>> {
        let map = self.depositories.read().await;
        Ok(map.get(id).cloned())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryTransferRepo {
    transfers: Arc<RwLock<HashMap<String, Transfer>>>,
    pending: Arc<RwLock<Vec<GroupableTransfer>>>,
}

impl InMemoryTransferRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, transfer: Transfer) {
        let mut map = self.transfers.write().await;
        map.insert(transfer.id.clone(), transfer);
    }

    pub async fn push_pending(&self, pending: GroupableTransfer) {
        self.pending.write().await.push(pending);
    }
}

#[async_trait]
impl TransferRepo for InMemoryTransferRepo {
    async fn find_matching(
        &self,
        sec_code: &str,
        amount: Decimal,
        trace_number: &TraceNumber,
        effective_date: &str,
    ) -> Result<Option<Transfer>> {
        let map = self.transfers.read().await;
        Ok(map
            .values()
            .find(|t| {
                t.sec_code == sec_code
                    && t.amount == amount
                    && t.trace_number.as_ref() == Some(trace_number)
                    && t.effective_date == effective_date
            })
            .cloned())
    }

    async fn get(&self, id: &str) -> Result<Option<Transfer>> {
        let map = self.transfers.read().await;
        Ok(map.get(id).cloned())
    }

    async fn update(&self, transfer: Transfer) -> Result<()> {
        if transfer.status != TransferStatus::Pending {
            self.pending
                .write()
                .await
                .retain(|p| p.transfer_id != transfer.id);
        }
        let mut map = self.transfers.write().await;
        map.insert(transfer.id.clone(), transfer);
        Ok(())
    }

    async fn pending(&self) -> Result<Vec<GroupableTransfer>> {
        Ok(self.pending.read().await.clone())
    }

    async fn mark_merged(
        &self,
        transfer_id: &str,
        filename: &str,
        trace_number: &TraceNumber,
    ) -> Result<()> {
        let mut map = self.transfers.write().await;
        if let Some(transfer) = map.get_mut(transfer_id) {
            transfer.status = TransferStatus::Merged;
            transfer.merged_filename = Some(filename.to_string());
            transfer.trace_number = Some(trace_number.clone());
        }
        self.pending
            .write()
            .await
            .retain(|p| p.transfer_id != transfer_id);
        Ok(())
    }

    async fn mark_processed(&self, trace_number: &TraceNumber) -> Result<()> {
        let mut map = self.transfers.write().await;
        for transfer in map.values_mut() {
            if transfer.trace_number.as_ref() == Some(trace_number) {
                transfer.status = TransferStatus::Processed;
            }
        }
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryMicroDepositRepo {
    deposits: Arc<RwLock<Vec<MicroDeposit>>>,
    pending: Arc<RwLock<Vec<UploadableMicroDeposit>>>,
}

impl InMemoryMicroDepositRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, micro_deposit: MicroDeposit) {
        self.deposits.write().await.push(micro_deposit);
    }

    pub async fn push_pending(&self, pending: UploadableMicroDeposit) {
        self.pending.write().await.push(pending);
    }
}

#[async_trait]
impl MicroDepositRepo for InMemoryMicroDepositRepo {
    async fn find_by_amount(
        &self,
        depository_id: &str,
        amount: Decimal,
    ) -> Result<Option<MicroDeposit>> {
        let deposits = self.deposits.read().await;
        Ok(deposits
            .iter()
            .find(|m| m.depository_id == depository_id && m.amount == amount)
            .cloned())
    }

    async fn update(&self, micro_deposit: MicroDeposit) -> Result<()> {
        let mut deposits = self.deposits.write().await;
        if let Some(slot) = deposits
            .iter_mut()
            .find(|m| m.depository_id == micro_deposit.depository_id && m.amount == micro_deposit.amount)
        {
            *slot = micro_deposit;
        }
        Ok(())
    }

    async fn pending(&self) -> Result<Vec<UploadableMicroDeposit>> {
        Ok(self.pending.read().await.clone())
    }

    async fn mark_merged(
        &self,
        depository_id: &str,
        filename: &str,
        trace_number: &TraceNumber,
    ) -> Result<()> {
        let mut deposits = self.deposits.write().await;
        for deposit in deposits
            .iter_mut()
            .filter(|m| m.depository_id == depository_id)
        {
            deposit.status = TransferStatus::Merged;
            deposit.merged_filename = Some(filename.to_string());
            deposit.trace_number = Some(trace_number.clone());
        }
        self.pending
            .write()
            .await
            .retain(|p| p.depository_id != depository_id);
        Ok(())
    }

    async fn mark_processed(&self, trace_number: &TraceNumber) -> Result<()> {
        let mut deposits = self.deposits.write().await;
        for deposit in deposits.iter_mut() {
            if deposit.trace_number.as_ref() == Some(trace_number) {
                deposit.status = TransferStatus::Processed;
            }
        }
        Ok(())
    }

    async fn mark_rejected(&self, depository_id: &str) -> Result<()> {
        let mut deposits = self.deposits.write().await;
        for deposit in deposits
            .iter_mut()
            .filter(|m| m.depository_id == depository_id)
        {
            deposit.status = TransferStatus::Rejected;
        }
        drop(deposits);
        self.pending
            .write()
            .await
            .retain(|p| p.depository_id != depository_id);
        Ok(())
    }
}

/// Records reversals instead of talking to the accounts ledger.
#[derive(Default, Clone)]
pub struct InMemoryLedger {
    reversed: Arc<RwLock<Vec<String>>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn reversed(&self) -> Vec<String> {
        self.reversed.read().await.clone()
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn reverse_transaction(&self, transaction_id: &str) -> Result<()> {
        self.reversed.write().await.push(transaction_id.to_string());
        Ok(())
    }
}

#[cfg(test)]
pub use fixtures::{Fixtures, test_environment};

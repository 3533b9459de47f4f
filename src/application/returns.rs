//! Return processing: match returned entries back to transfers or
//! micro-deposits, reverse their ledger postings, and apply the fixed
//! return-code table to the involved depositories.

use crate::application::Environment;
use crate::domain::ach::{AchFile, BatchHeader, EntryDetail};
use crate::domain::codes::{ReturnDisposition, return_disposition};
use crate::domain::records::DepositoryStatus;
use crate::error::{Result, TransferError};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, error, warn};

pub struct ReturnProcessor {
    env: Arc<Environment>,
}

impl ReturnProcessor {
    pub fn new(env: Arc<Environment>) -> Self {
        Self { env }
    }

    /// Walks every returned entry in the file. The walk is never aborted by
    /// a single entry; the first hard error surfaces once it completes.
    pub async fn process_file(&self, source: &str, file: &AchFile) -> Result<()> {
        let mut first_err = None;
        for (header, entry) in file.returned_entries() {
            match self.process_entry(header, entry).await {
                Ok(()) => {}
                Err(err @ TransferError::UnhandledReturnCode(_)) => {
                    // The match and reversal already succeeded.
                    warn!(source, trace = %entry.trace_number, "{err}");
                }
                Err(err) => {
                    error!(source, trace = %entry.trace_number, "return failed: {err}");
                    first_err.get_or_insert(err);
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn process_entry(&self, header: &BatchHeader, entry: &EntryDetail) -> Result<()> {
        let Some(retrn) = &entry.retrn else {
            warn!(trace = %entry.trace_number, "entry missing return addenda, skipping");
            return Ok(());
        };
        let amount = Decimal::new(entry.amount_cents, 2);

        // Match order: a transfer first, then a micro-deposit credit.
        if let Some(mut transfer) = self
            .env
            .transfers
            .find_matching(
                &header.sec_code,
                amount,
                &retrn.original_trace,
                &header.effective_date,
            )
            .await?
        {
            transfer.return_code = Some(retrn.return_code.clone());
            transfer.status = crate::domain::records::TransferStatus::Reclaimed;
            let transaction_id = transfer.transaction_id.clone();
            let originator = transfer.originator_depository.clone();
            let receiver = transfer.receiver_depository.clone();
            self.env.transfers.update(transfer).await?;
            self.reverse(transaction_id.as_deref(), &retrn.original_trace)
                .await?;
            return self
                .apply_disposition(&retrn.return_code, Some(&originator), &receiver)
                .await;
        }

        let Some(depository) = self
            .env
            .depositories
            .lookup(&entry.routing_number, &entry.account_number)
            .await?
        else {
            return Err(TransferError::ReturnNotMatched(entry.trace_number.0.clone()));
        };
        let Some(mut micro_deposit) = self
            .env
            .micro_deposits
            .find_by_amount(&depository.id, amount)
            .await?
        else {
            return Err(TransferError::ReturnNotMatched(entry.trace_number.0.clone()));
        };
        micro_deposit.return_code = Some(retrn.return_code.clone());
        let transaction_id = micro_deposit.transaction_id.clone();
        self.env.micro_deposits.update(micro_deposit).await?;
        self.reverse(transaction_id.as_deref(), &retrn.original_trace)
            .await?;
        // Micro-deposits have no originator record of their own.
        self.apply_disposition(&retrn.return_code, None, &depository.id)
            .await
    }

    async fn reverse(
        &self,
        transaction_id: Option<&str>,
        trace: &crate::domain::ach::TraceNumber,
    ) -> Result<()> {
        match transaction_id {
            Some(id) => self.env.ledger.reverse_transaction(id).await,
            None => {
                debug!(%trace, "no transaction id attached, nothing to reverse");
                Ok(())
            }
        }
    }

    async fn apply_disposition(
        &self,
        return_code: &str,
        originator: Option<&str>,
        receiver: &str,
    ) -> Result<()> {
        match return_disposition(return_code) {
            ReturnDisposition::RejectReceiver => self.reject(receiver).await,
            ReturnDisposition::RejectBoth => {
                if let Some(originator) = originator {
                    self.reject(originator).await?;
                }
                self.reject(receiver).await
            }
            ReturnDisposition::Unhandled => Err(TransferError::UnhandledReturnCode(
                return_code.to_string(),
            )),
        }
    }

    /// Status-only update; a second application to an already-rejected
    /// depository is a no-op.
    async fn reject(&self, depository_id: &str) -> Result<()> {
        let Some(mut depository) = self.env.depositories.get(depository_id).await? else {
            warn!(depository_id, "depository vanished during return processing");
            return Ok(());
        };
        if depository.status == DepositoryStatus::Rejected {
            return Ok(());
        }
        depository.status = DepositoryStatus::Rejected;
        self.env.depositories.update(depository).await
    }
}

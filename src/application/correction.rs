//! Notification-of-Change processing: a state machine over NACHA change
//! codes that reconciles bank-requested corrections against Depository and
//! Transfer records.

use crate::application::Environment;
use crate::domain::ach::{AchFile, BatchHeader, Correction, EntryDetail};
use crate::domain::codes::{ChangeDisposition, ChangeEffect, change_disposition};
use crate::domain::records::{Depository, DepositoryStatus, TransferStatus};
use crate::error::{Result, TransferError};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, warn};

pub struct CorrectionProcessor {
    env: Arc<Environment>,
    /// When false (the default posture), every NOC rejects the depository
    /// and reclaims the transfer instead of editing account data in place.
    update_policy: bool,
}

impl CorrectionProcessor {
    pub fn new(env: Arc<Environment>, update_policy: bool) -> Self {
        Self { env, update_policy }
    }

    /// Walks every corrected entry in the file. Per-item failures do not
    /// abort the walk; the first hard error is surfaced to the caller once
    /// the walk completes.
    pub async fn process_file(&self, source: &str, file: &AchFile) -> Result<()> {
        let mut first_err = None;
        for (header, entry) in file.corrections() {
            match self.process_entry(header, entry).await {
                Ok(()) => {}
                Err(err @ TransferError::UnsupportedChangeCode(_)) => {
                    warn!(source, trace = %entry.trace_number, "{err}");
                }
                Err(err) => {
                    error!(source, trace = %entry.trace_number, "correction failed: {err}");
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
        let Some(correction) = &entry.correction else {
            warn!(trace = %entry.trace_number, "entry missing change code addenda, skipping");
            return Ok(());
        };
        let Some(depository) = self
            .env
            .depositories
            .lookup(&entry.routing_number, &entry.account_number)
            .await?
        else {
            warn!(
                routing = %entry.routing_number,
                trace = %entry.trace_number,
                "no depository for corrected entry, skipping"
            );
            return Ok(());
        };

        if !self.update_policy {
            return self.reject_pair(header, entry, correction, depository).await;
        }

        match change_disposition(&correction.change_code) {
            ChangeDisposition::Apply(effect) => {
                self.apply_change(effect, correction, depository).await
            }
            ChangeDisposition::Unsupported => Err(TransferError::UnsupportedChangeCode(
                correction.change_code.clone(),
            )),
            ChangeDisposition::Unknown => Err(TransferError::MissingCorrectedData(
                correction.change_code.clone(),
            )),
        }
    }

    /// Default posture: reject the depository and reclaim the matching
    /// transfer. A missing transfer is a hard error for the entry.
    async fn reject_pair(
        &self,
        header: &BatchHeader,
        entry: &EntryDetail,
        correction: &Correction,
        mut depository: Depository,
    ) -> Result<()> {
        depository.status = DepositoryStatus::Rejected;
        self.env.depositories.update(depository).await?;

        let amount = Decimal::new(entry.amount_cents, 2);
        let Some(mut transfer) = self
            .env
            .transfers
            .find_matching(
                &header.sec_code,
                amount,
                &correction.original_trace,
                &header.effective_date,
            )
            .await?
        else {
            return Err(TransferError::TransferNotFound(
                correction.original_trace.0.clone(),
            ));
        };
        transfer.status = TransferStatus::Reclaimed;
        self.env.transfers.update(transfer).await
    }

    /// Update-policy branch: edit the depository per the change code table.
    /// Always an upsert of an existing depository, never a create.
    async fn apply_change(
        &self,
        effect: ChangeEffect,
        correction: &Correction,
        mut depository: Depository,
    ) -> Result<()> {
        if effect.fix_account || effect.fix_routing {
            let (routing, account) = parse_corrected_data(effect, correction)?;
            if let Some(routing) = routing {
                depository.routing_number = routing;
            }
            if let Some(account) = account {
                depository.account_number = account;
            }
        }
        if effect.reject {
            depository.status = DepositoryStatus::Rejected;
        }
        self.env.depositories.update(depository).await
    }
}

/// Splits the addenda's corrected data into its replacement fields. Codes
/// fixing both fields carry them space-separated, routing first.
fn parse_corrected_data(
    effect: ChangeEffect,
    correction: &Correction,
) -> Result<(Option<String>, Option<String>)> {
    let missing = || TransferError::MissingCorrectedData(correction.change_code.clone());
    let data = correction.corrected_data.trim();
    if data.is_empty() {
        return Err(missing());
    }
    if effect.fix_routing && effect.fix_account {
        let mut parts = data.split_whitespace();
        let (Some(routing), Some(account)) = (parts.next(), parts.next()) else {
            return Err(missing());
        };
        return Ok((Some(routing.to_string()), Some(account.to_string())));
    }
    if effect.fix_routing {
        return Ok((Some(data.to_string()), None));
    }
    Ok((None, Some(data.to_string())))
}

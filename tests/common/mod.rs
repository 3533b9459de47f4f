//! Shared scaffolding for the integration tests: a fully wired Environment
//! over the filesystem agent, plus builders for the payment, correction,
//! and return files the scenarios feed it.

use achgate::application::Environment;
use achgate::application::metrics::Metrics;
use achgate::domain::ach::{
    AchFile, Batch, BatchHeader, Correction, EntryDetail, FileHeader, Return, TraceNumber,
};
use achgate::domain::cutoff::CutoffTime;
use achgate::domain::records::{
    Depository, DepositoryStatus, Transfer, TransferConfig, TransferStatus, TransportCredentials,
};
use achgate::infrastructure::in_memory::{
    InMemoryDepositoryRepo, InMemoryLedger, InMemoryMicroDepositRepo, InMemoryTransferRepo,
};
use achgate::infrastructure::local_agent::LocalAgentFactory;
use achgate::infrastructure::static_store::StaticConfigStore;
use chrono_tz::America::New_York;
use rust_decimal_macros::dec;
use std::fs;
use std::path::Path;
use std::sync::Arc;

pub const DESTINATION: &str = "076401251";
pub const ORIGIN: &str = "121042882";
pub const TRACE: &str = "076401255655291";
pub const TRANSFER_ID: &str = "xfer-1";
pub const RECEIVER_DEP: &str = "dep-receiver";

/// Environment plus concrete repo handles, so scenarios can seed pending
/// records after construction.
pub struct World {
    pub env: Arc<Environment>,
    pub transfers: InMemoryTransferRepo,
    pub depositories: InMemoryDepositoryRepo,
}

pub async fn world(remote_root: &Path) -> World {
    let depositories = InMemoryDepositoryRepo::new();
    depositories
        .insert(Depository {
            id: "dep-originator".to_string(),
            routing_number: ORIGIN.to_string(),
            account_number: "123456789".to_string(),
            status: DepositoryStatus::Verified,
        })
        .await;
    depositories
        .insert(Depository {
            id: RECEIVER_DEP.to_string(),
            routing_number: "231380104".to_string(),
            account_number: "81967038518".to_string(),
            status: DepositoryStatus::Verified,
        })
        .await;

    let transfers = InMemoryTransferRepo::new();
    transfers
        .insert(Transfer {
            id: TRANSFER_ID.to_string(),
            sec_code: "PPD".to_string(),
            amount: dec!(100.00),
            trace_number: Some(TraceNumber(TRACE.to_string())),
            effective_date: "190330".to_string(),
            status: TransferStatus::Pending,
            originator_depository: "dep-originator".to_string(),
            receiver_depository: RECEIVER_DEP.to_string(),
            return_code: None,
            transaction_id: Some("txn-1".to_string()),
            merged_filename: None,
        })
        .await;

    let env = Arc::new(Environment {
        config: Box::new(config_store()),
        depositories: Box::new(depositories.clone()),
        transfers: Box::new(transfers.clone()),
        micro_deposits: Box::new(InMemoryMicroDepositRepo::new()),
        ledger: Box::new(InMemoryLedger::new()),
        agents: Box::new(LocalAgentFactory::new(remote_root)),
        metrics: Arc::new(Metrics::new()),
    });
    World {
        env,
        transfers,
        depositories,
    }
}

/// One destination with an FTP credential row and a 17:00 New York cutoff.
pub fn config_store() -> StaticConfigStore {
    StaticConfigStore::new(
        vec![TransferConfig {
            routing_number: DESTINATION.to_string(),
            inbound_path: "inbound".to_string(),
            outbound_path: "outbound".to_string(),
            return_path: "returned".to_string(),
            filename_template: None,
            allowed_ips: Vec::new(),
        }],
        vec![CutoffTime::new(DESTINATION, 1700, New_York).unwrap()],
        vec![TransportCredentials {
            routing_number: DESTINATION.to_string(),
            hostname: "localhost:2121".to_string(),
            username: "admin".to_string(),
            password: "secret".to_string(),
        }],
        Vec::new(),
    )
}

pub fn payment_file(trace: &str) -> AchFile {
    AchFile {
        header: FileHeader {
            destination: DESTINATION.to_string(),
            origin: ORIGIN.to_string(),
            creation_date: "190329".to_string(),
            creation_time: "1511".to_string(),
            id_modifier: '1',
        },
        batches: vec![Batch {
            header: BatchHeader {
                sec_code: "PPD".to_string(),
                company_name: "Acme Corp".to_string(),
                effective_date: "190330".to_string(),
            },
            entries: vec![EntryDetail {
                transaction_code: 22,
                routing_number: "231380104".to_string(),
                account_number: "81967038518".to_string(),
                amount_cents: 10_000,
                trace_number: TraceNumber(trace.to_string()),
                correction: None,
                retrn: None,
            }],
        }],
    }
}

pub fn correction_file(change_code: &str, original_trace: &str) -> AchFile {
    let mut file = payment_file("231380100000001");
    file.batches[0].entries[0].correction = Some(Correction {
        change_code: change_code.to_string(),
        corrected_data: "9912345".to_string(),
        original_trace: TraceNumber(original_trace.to_string()),
    });
    file
}

pub fn return_file(return_code: &str, original_trace: &str) -> AchFile {
    let mut file = payment_file("231380100000002");
    file.batches[0].entries[0].retrn = Some(Return {
        return_code: return_code.to_string(),
        original_trace: TraceNumber(original_trace.to_string()),
    });
    file
}

/// Writes a single-payment source file and returns its path.
pub fn write_source(dir: &Path, trace: &str) -> std::path::PathBuf {
    let path = dir.join(format!("{trace}.ach"));
    fs::write(&path, payment_file(trace).encode()).unwrap();
    path
}

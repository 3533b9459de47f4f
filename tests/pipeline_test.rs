//! End-to-end scenarios through the coordinator: pending records merged and
//! uploaded to a destination's directory tree, and inbound correction/return
//! files pulled back down and reconciled.

mod common;

use achgate::application::coordinator::{Coordinator, CoordinatorOptions};
use achgate::application::merge::DEFAULT_LINE_LIMIT;
use achgate::domain::ach::TraceNumber;
use achgate::domain::ports::DepositoryRepo;
use achgate::domain::records::{DepositoryStatus, GroupableTransfer, TransferStatus};
use chrono::Utc;
use common::{DESTINATION, RECEIVER_DEP, TRACE, TRANSFER_ID};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

fn options(root: &Path) -> CoordinatorOptions {
    CoordinatorOptions {
        root: root.to_path_buf(),
        interval: Duration::from_secs(3600),
        cutoff_delta: chrono::Duration::minutes(5),
        line_limit: DEFAULT_LINE_LIMIT,
        update_policy: false,
    }
}

#[tokio::test]
async fn forced_outbound_cycle_merges_and_uploads() {
    let storage = TempDir::new().unwrap();
    let remote = TempDir::new().unwrap();
    let sources = TempDir::new().unwrap();
    let world = common::world(remote.path()).await;

    let source = common::write_source(sources.path(), TRACE);
    world
        .transfers
        .push_pending(GroupableTransfer {
            transfer_id: TRANSFER_ID.to_string(),
            destination: DESTINATION.to_string(),
            source_path: source,
        })
        .await;

    let (coordinator, controller) =
        Coordinator::new(world.env.clone(), options(storage.path())).unwrap();
    let handle = tokio::spawn(coordinator.run());

    controller
        .flush_outgoing("itest-out", "integration", false, true)
        .await
        .unwrap();

    let transfer = world.env.transfers.get(TRANSFER_ID).await.unwrap().unwrap();
    assert_eq!(transfer.status, TransferStatus::Processed);

    // The merged file landed in the destination's outbound tree under the
    // default template name.
    let today = Utc::now().date_naive().format("%Y%m%d");
    let remote_file = remote
        .path()
        .join(DESTINATION)
        .join("outbound")
        .join(format!("{today}-{DESTINATION}-1.ach"));
    assert!(remote_file.exists());

    // The local copy was frozen under the uploaded suffix.
    let merged: Vec<String> = fs::read_dir(storage.path().join("merged"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(merged, vec![format!("{today}-{DESTINATION}-1.ach.uploaded")]);

    controller.shutdown();
    handle.await.unwrap();
}

#[tokio::test]
async fn second_cycle_continues_the_sequence_lineage() {
    let storage = TempDir::new().unwrap();
    let remote = TempDir::new().unwrap();
    let sources = TempDir::new().unwrap();
    let world = common::world(remote.path()).await;

    let (coordinator, controller) =
        Coordinator::new(world.env.clone(), options(storage.path())).unwrap();
    let handle = tokio::spawn(coordinator.run());

    for (cycle, trace) in [(1u8, "trace-a"), (2u8, "trace-b")] {
        let source = common::write_source(sources.path(), trace);
        world
            .transfers
            .push_pending(GroupableTransfer {
                transfer_id: format!("xfer-{trace}"),
                destination: DESTINATION.to_string(),
                source_path: source,
            })
            .await;
        controller
            .flush_outgoing(&format!("itest-seq-{cycle}"), "integration", false, true)
            .await
            .unwrap();

        let today = Utc::now().date_naive().format("%Y%m%d");
        assert!(
            remote
                .path()
                .join(DESTINATION)
                .join("outbound")
                .join(format!("{today}-{DESTINATION}-{cycle}.ach"))
                .exists()
        );
    }

    controller.shutdown();
    handle.await.unwrap();
}

#[tokio::test]
async fn inbound_cycle_reconciles_corrections_and_returns() {
    let storage = TempDir::new().unwrap();
    let remote = TempDir::new().unwrap();
    let world = common::world(remote.path()).await;

    let base = remote.path().join(DESTINATION);
    fs::create_dir_all(base.join("inbound")).unwrap();
    fs::create_dir_all(base.join("returned")).unwrap();
    fs::write(
        base.join("inbound/cor.ach"),
        common::correction_file("C01", TRACE).encode(),
    )
    .unwrap();
    fs::write(
        base.join("returned/ret.ach"),
        common::return_file("R02", TRACE).encode(),
    )
    .unwrap();

    let (coordinator, controller) =
        Coordinator::new(world.env.clone(), options(storage.path())).unwrap();
    let handle = tokio::spawn(coordinator.run());

    controller
        .flush_incoming("itest-in", "integration")
        .await
        .unwrap();

    // NOC default posture rejected the depository; the R02 return reclaimed
    // the transfer and recorded its code.
    let dep = world
        .depositories
        .get(RECEIVER_DEP)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(dep.status, DepositoryStatus::Rejected);
    let transfer = world.env.transfers.get(TRANSFER_ID).await.unwrap().unwrap();
    assert_eq!(transfer.status, TransferStatus::Reclaimed);
    assert_eq!(transfer.return_code.as_deref(), Some("R02"));

    // Remote originals were consumed.
    assert!(!base.join("inbound/cor.ach").exists());
    assert!(!base.join("returned/ret.ach").exists());

    controller.shutdown();
    handle.await.unwrap();
}

#[tokio::test]
async fn removal_excises_a_merged_entry_before_upload() {
    let storage = TempDir::new().unwrap();
    let remote = TempDir::new().unwrap();
    let sources = TempDir::new().unwrap();
    let world = common::world(remote.path()).await;

    let source = common::write_source(sources.path(), TRACE);
    world
        .transfers
        .push_pending(GroupableTransfer {
            transfer_id: TRANSFER_ID.to_string(),
            destination: DESTINATION.to_string(),
            source_path: source,
        })
        .await;

    let (coordinator, controller) =
        Coordinator::new(world.env.clone(), options(storage.path())).unwrap();
    let handle = tokio::spawn(coordinator.run());

    // Merge without uploading, then pull the entry back out.
    controller
        .flush_outgoing("itest-rm-1", "integration", true, false)
        .await
        .unwrap();
    controller
        .remove(
            "itest-rm-2",
            "integration",
            DESTINATION,
            TraceNumber(TRACE.to_string()),
        )
        .await
        .unwrap();

    // A forced upload afterwards finds nothing to push.
    controller
        .flush_outgoing("itest-rm-3", "integration", false, true)
        .await
        .unwrap();
    assert!(!remote.path().join(DESTINATION).join("outbound").exists());

    controller.shutdown();
    handle.await.unwrap();
}

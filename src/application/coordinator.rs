//! The long-lived scheduling loop: on a timer or an explicit request, run
//! the download/process and merge/upload cycles, and serve removal requests
//! alongside them.

use crate::application::merge::{DirLocks, MergeEngine};
use crate::application::removal::{self, RemovalOutcome};
use crate::application::upload::UploadMode;
use crate::application::{Environment, inbound, upload};
use crate::domain::ach::TraceNumber;
use crate::error::{Result, TransferError};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, interval_at, timeout};
use tracing::{error, info};

/// Bound on how long a synchronous caller waits for its flush or removal to
/// complete, so an admin request never blocks forever.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// Directory holding `merged/`.
    pub root: PathBuf,
    /// Wall-clock period between scheduled cycles.
    pub interval: Duration,
    /// Window before a cutoff during which its files upload.
    pub cutoff_delta: chrono::Duration,
    /// Hard ceiling on encoded lines per merged file.
    pub line_limit: usize,
    /// Apply NOC field updates instead of rejecting outright.
    pub update_policy: bool,
}

/// One externally triggered flush.
#[derive(Debug)]
pub struct FlushRequest {
    pub correlation_id: String,
    pub user_id: String,
    /// Merge only, no upload; used by ops tooling and tests.
    pub skip_upload: bool,
    /// Upload everything instead of waiting for cutoffs.
    pub force: bool,
    pub wait: Option<oneshot::Sender<Result<()>>>,
}

#[derive(Debug)]
pub struct RemovalRequest {
    pub correlation_id: String,
    pub user_id: String,
    pub destination: String,
    pub trace_number: TraceNumber,
    pub wait: Option<oneshot::Sender<Result<RemovalOutcome>>>,
}

/// Handle for feeding the coordinator requests and shutting it down.
#[derive(Clone)]
pub struct Controller {
    incoming_tx: mpsc::Sender<FlushRequest>,
    outgoing_tx: mpsc::Sender<FlushRequest>,
    removal_tx: mpsc::Sender<RemovalRequest>,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl Controller {
    /// Run the download/process step now and wait (bounded) for it.
    pub async fn flush_incoming(&self, correlation_id: &str, user_id: &str) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.incoming_tx
            .send(FlushRequest {
                correlation_id: correlation_id.to_string(),
                user_id: user_id.to_string(),
                skip_upload: false,
                force: false,
                wait: Some(tx),
            })
            .await
            .map_err(|_| TransferError::CoordinatorStopped)?;
        await_reply(correlation_id, rx).await?
    }

    /// Run the merge step now, then upload unless `skip_upload`.
    pub async fn flush_outgoing(
        &self,
        correlation_id: &str,
        user_id: &str,
        skip_upload: bool,
        force: bool,
    ) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.outgoing_tx
            .send(FlushRequest {
                correlation_id: correlation_id.to_string(),
                user_id: user_id.to_string(),
                skip_upload,
                force,
                wait: Some(tx),
            })
            .await
            .map_err(|_| TransferError::CoordinatorStopped)?;
        await_reply(correlation_id, rx).await?
    }

    /// Excise a merged entry by trace number.
    pub async fn remove(
        &self,
        correlation_id: &str,
        user_id: &str,
        destination: &str,
        trace_number: TraceNumber,
    ) -> Result<RemovalOutcome> {
        let (tx, rx) = oneshot::channel();
        self.removal_tx
            .send(RemovalRequest {
                correlation_id: correlation_id.to_string(),
                user_id: user_id.to_string(),
                destination: destination.to_string(),
                trace_number,
                wait: Some(tx),
            })
            .await
            .map_err(|_| TransferError::CoordinatorStopped)?;
        await_reply(correlation_id, rx).await?
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

async fn await_reply<T>(
    correlation_id: &str,
    rx: oneshot::Receiver<Result<T>>,
) -> Result<Result<T>> {
    match timeout(REQUEST_TIMEOUT, rx).await {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(_)) => Err(TransferError::CoordinatorStopped),
        Err(_) => Err(TransferError::RequestTimeout(correlation_id.to_string())),
    }
}

pub struct Coordinator {
    env: Arc<Environment>,
    engine: Arc<MergeEngine>,
    opts: CoordinatorOptions,
    incoming_rx: mpsc::Receiver<FlushRequest>,
    outgoing_rx: mpsc::Receiver<FlushRequest>,
    removal_rx: mpsc::Receiver<RemovalRequest>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Coordinator {
    pub fn new(env: Arc<Environment>, opts: CoordinatorOptions) -> Result<(Self, Controller)> {
        let engine = Arc::new(MergeEngine::new(&opts.root, opts.line_limit, DirLocks::new())?);
        let (incoming_tx, incoming_rx) = mpsc::channel(16);
        let (outgoing_tx, outgoing_rx) = mpsc::channel(16);
        let (removal_tx, removal_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Ok((
            Self {
                env,
                engine,
                opts,
                incoming_rx,
                outgoing_rx,
                removal_rx,
                shutdown_rx,
            },
            Controller {
                incoming_tx,
                outgoing_tx,
                removal_tx,
                shutdown_tx: Arc::new(shutdown_tx),
            },
        ))
    }

    pub fn merge_engine(&self) -> Arc<MergeEngine> {
        self.engine.clone()
    }

    /// The event loop. Cancellation is cooperative: it is observed at the
    /// top of the select, and any cycle already in flight is awaited to
    /// completion, never interrupted.
    pub async fn run(mut self) {
        let period = self.opts.interval;
        let mut tick = interval_at(Instant::now() + period, period);
        info!(interval = ?period, "transfer coordinator started");
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown_rx.changed() => {
                    info!("transfer coordinator shutting down");
                    return;
                }
                _ = tick.tick() => self.tick().await,
                Some(req) = self.incoming_rx.recv() => self.handle_incoming(req).await,
                Some(req) = self.outgoing_rx.recv() => self.handle_outgoing(req).await,
                Some(req) = self.removal_rx.recv() => self.handle_removal(req),
            }
        }
    }

    /// One scheduled cycle: the download/process and merge/upload tasks run
    /// concurrently and are both joined before the loop resumes, so cycles
    /// never overlap. Failures are logged and retried naturally at the next
    /// tick; merge and upload markers are idempotent.
    async fn tick(&self) {
        let download = tokio::spawn(inbound::download_and_process(
            self.env.clone(),
            self.opts.update_policy,
        ));
        let outbound = tokio::spawn(upload::merge_and_upload(
            self.env.clone(),
            self.engine.clone(),
            self.opts.cutoff_delta,
            UploadMode::CutoffDriven,
        ));
        let (download, outbound) = tokio::join!(download, outbound);
        for (step, joined) in [("download", download), ("merge/upload", outbound)] {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => error!(step, "cycle step failed: {err}"),
                Err(err) => error!(step, "cycle step panicked: {err}"),
            }
        }
        info!("scheduled cycle finished");
    }

    /// Explicit incoming flush: only the download/process step, run
    /// synchronously inside the loop.
    async fn handle_incoming(&self, req: FlushRequest) {
        let result =
            inbound::download_and_process(self.env.clone(), self.opts.update_policy).await;
        finish_flush("incoming flush", req, result);
    }

    async fn handle_outgoing(&self, req: FlushRequest) {
        let mode = if req.skip_upload {
            UploadMode::Skip
        } else if req.force {
            UploadMode::Forced
        } else {
            UploadMode::CutoffDriven
        };
        let result = upload::merge_and_upload(
            self.env.clone(),
            self.engine.clone(),
            self.opts.cutoff_delta,
            mode,
        )
        .await;
        finish_flush("outgoing flush", req, result);
    }

    /// Removals do not join the flush/tick wait: the work is spawned and may
    /// overlap an in-flight merge, which is safe because both sides take the
    /// per-destination lock.
    fn handle_removal(&self, req: RemovalRequest) {
        let engine = self.engine.clone();
        tokio::spawn(async move {
            let result =
                removal::remove_entry(&engine, &req.destination, &req.trace_number).await;
            if let Err(err) = &result {
                error!(
                    correlation_id = %req.correlation_id,
                    user_id = %req.user_id,
                    destination = %req.destination,
                    "removal failed: {err}"
                );
            }
            if let Some(wait) = req.wait {
                let _ = wait.send(result);
            }
        });
    }
}

fn finish_flush(kind: &str, req: FlushRequest, result: Result<()>) {
    match &result {
        Ok(()) => info!(
            correlation_id = %req.correlation_id,
            user_id = %req.user_id,
            "{kind} finished"
        ),
        Err(err) => error!(
            correlation_id = %req.correlation_id,
            user_id = %req.user_id,
            "{kind} failed: {err}"
        ),
    }
    if let Some(wait) = req.wait {
        let _ = wait.send(result);
    }
}

//! Background worker handling uploads, jobs and downloads.

use std::{collections::HashMap, path::PathBuf, sync::Arc};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::{
    config::Config,
    dispatcher::{Dispatcher, ProgressTx},
    jobs::Job,
    materializer::{ResultPayload, SaveTarget},
    media::{self, MediaItem},
    operation::Operation,
};

/// Commands sent from the UI to the worker.
#[derive(Debug)]
pub enum WorkerCmd {
    /// Read a file, or the videos in a directory.
    LoadMedia(PathBuf),
    /// Run an operation against a snapshot of the working set.
    Submit {
        operation: Operation,
        items: Vec<MediaItem>,
    },
    /// Abort the pending job for an operation.
    Cancel(Operation),
    /// Write one downloadable unit of a result to the output directory.
    Save {
        operation: Operation,
        payload: Arc<ResultPayload>,
        target: SaveTarget,
    },
    /// Apply updated settings to subsequent jobs.
    UpdateConfig(Config),
}

/// Events emitted by the worker for UI updates.
#[derive(Debug)]
pub enum WorkerEvent {
    /// Files read and ready to stage.
    MediaLoaded(Vec<MediaItem>),
    /// New progress estimate for a pending job.
    Progress { operation: Operation, value: u8 },
    /// Job reached a terminal state.
    JobFinished(Job),
    /// A result unit was written to disk.
    Saved { operation: Operation, path: PathBuf },
    /// Informational log message.
    Log(String),
    /// User-visible error message.
    Error(String),
}

/// Main worker loop. Jobs run concurrently; other commands are handled in order.
pub async fn run(mut rx: mpsc::Receiver<WorkerCmd>, tx: mpsc::Sender<WorkerEvent>, mut cfg: Config) {
    let mut dispatcher = match Dispatcher::from_config(&cfg) {
        Ok(d) => d,
        Err(e) => {
            tracing::error!("http client init failed: {e}");
            let _ = tx
                .send(WorkerEvent::Error(format!("http client init failed: {e}")))
                .await;
            return;
        }
    };
    let mut cancels: HashMap<Operation, CancellationToken> = HashMap::new();
    tracing::info!("worker started: {}", cfg.server.base_url);

    while let Some(cmd) = rx.recv().await {
        match cmd {
            WorkerCmd::LoadMedia(path) => {
                tracing::info!("load media: {}", path.display());
                match media::collect_media(&path).await {
                    Ok(items) if items.is_empty() => {
                        let _ = tx
                            .send(WorkerEvent::Error(format!(
                                "no video files in {}",
                                path.display()
                            )))
                            .await;
                    }
                    Ok(items) => {
                        let _ = tx.send(WorkerEvent::MediaLoaded(items)).await;
                    }
                    Err(e) => {
                        tracing::warn!("load media failed: {e}");
                        let _ = tx.send(WorkerEvent::Error(e.to_string())).await;
                    }
                }
            }

            WorkerCmd::Submit { operation, items } => {
                let token = CancellationToken::new();
                if let Some(stale) = cancels.insert(operation, token.clone()) {
                    stale.cancel();
                }
                tokio::spawn(run_job(
                    dispatcher.clone(),
                    operation,
                    items,
                    token,
                    tx.clone(),
                ));
            }

            WorkerCmd::Cancel(operation) => {
                if let Some(token) = cancels.remove(&operation) {
                    tracing::info!("cancel requested: {operation}");
                    token.cancel();
                }
            }

            WorkerCmd::Save {
                operation,
                payload,
                target,
            } => {
                let Some(unit) = payload.unit(operation, target) else {
                    let _ = tx
                        .send(WorkerEvent::Error(format!("{operation}: nothing to save")))
                        .await;
                    continue;
                };
                match unit.save(&cfg.download.output_dir).await {
                    Ok(path) => {
                        let _ = tx.send(WorkerEvent::Saved { operation, path }).await;
                    }
                    Err(e) => {
                        // The payload stays in the session for another attempt.
                        tracing::error!("save failed: {e}");
                        let _ = tx.send(WorkerEvent::Error(e.to_string())).await;
                    }
                }
            }

            WorkerCmd::UpdateConfig(new_cfg) => {
                match Dispatcher::from_config(&new_cfg) {
                    Ok(d) => {
                        dispatcher = d;
                        cfg = new_cfg;
                        tracing::info!("settings updated: {}", cfg.server.base_url);
                        let _ = tx.send(WorkerEvent::Log("settings updated".into())).await;
                    }
                    Err(e) => {
                        tracing::error!("settings rejected: {e}");
                        let _ = tx
                            .send(WorkerEvent::Error(format!("settings rejected: {e}")))
                            .await;
                    }
                }
            }
        }
    }
    tracing::info!("worker stopped");
}

/// Run one job and forward its progress and outcome.
async fn run_job(
    dispatcher: Dispatcher,
    operation: Operation,
    items: Vec<MediaItem>,
    cancel: CancellationToken,
    tx: mpsc::Sender<WorkerEvent>,
) {
    let progress: ProgressTx = Arc::new(watch::channel(0u8).0);
    let forward = tokio::spawn(forward_progress(operation, progress.subscribe(), tx.clone()));

    let job = dispatcher.submit(operation, &items, &progress, &cancel).await;

    forward.abort();
    let _ = tx.send(WorkerEvent::JobFinished(job)).await;
}

async fn forward_progress(
    operation: Operation,
    mut rx: watch::Receiver<u8>,
    tx: mpsc::Sender<WorkerEvent>,
) {
    while rx.changed().await.is_ok() {
        let value = *rx.borrow_and_update();
        if tx
            .send(WorkerEvent::Progress { operation, value })
            .await
            .is_err()
        {
            break;
        }
    }
}

//! Worker loop: idempotent fetch-and-store with retry, plus extraction.
//!
//! Each worker pulls identifiers from the shared queue until it is closed
//! and drained. One iteration: derive the target, consult the local
//! filesystem (skip or force-delete), download with retry re-reading the
//! bearer token per attempt, then optionally extract. No partial file
//! survives a failed attempt.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;

use super::Counters;
use crate::auth::TokenStore;
use crate::config::Config;
use crate::error::FetchError;
use crate::extraction::extract_member;
use crate::retry::retry_with_backoff;
use crate::target::DownloadTarget;
use crate::types::Event;

/// Everything one worker needs, cloned per worker at pool startup
pub(crate) struct WorkerContext {
    pub(crate) id: usize,
    pub(crate) config: Arc<Config>,
    pub(crate) client: reqwest::Client,
    pub(crate) store: Arc<TokenStore>,
    pub(crate) tasks: Arc<tokio::sync::Mutex<tokio::sync::mpsc::Receiver<String>>>,
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    pub(crate) counters: Arc<Counters>,
}

/// Outcome of one product, for counter bookkeeping
enum TaskOutcome {
    Downloaded,
    Skipped,
    Failed,
}

pub(crate) async fn run_worker(ctx: WorkerContext) {
    tracing::info!(worker = ctx.id, "worker started");

    loop {
        // Lock only to receive; the queue is free while this worker fetches.
        let product = { ctx.tasks.lock().await.recv().await };
        let Some(product) = product else {
            break;
        };

        tracing::info!(worker = ctx.id, product = %product, "processing product");
        match process_product(&ctx, &product).await {
            TaskOutcome::Downloaded => {
                ctx.counters.downloaded.fetch_add(1, Ordering::Relaxed);
            }
            TaskOutcome::Skipped => {
                ctx.counters.skipped.fetch_add(1, Ordering::Relaxed);
            }
            TaskOutcome::Failed => {
                ctx.counters.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    tracing::info!(worker = ctx.id, "worker finished");
}

async fn process_product(ctx: &WorkerContext, product: &str) -> TaskOutcome {
    let target = match DownloadTarget::for_product(&ctx.config, product) {
        Ok(target) => target,
        Err(e) => {
            return fail(ctx, product, &format!("cannot derive download target: {e}"));
        }
    };

    // Idempotency check: the archive path is a pure function of the product
    // identifier, so an existing file means the work was already done.
    if target.archive_path.exists() {
        if ctx.config.force {
            if let Err(e) = tokio::fs::remove_file(&target.archive_path).await {
                return fail(ctx, product, &format!("cannot remove existing archive: {e}"));
            }
        } else {
            tracing::info!(
                worker = ctx.id,
                product = %product,
                path = ?target.archive_path,
                "archive already present, skipping"
            );
            ctx.event_tx
                .send(Event::ProductSkipped {
                    product: product.to_string(),
                    path: target.archive_path.clone(),
                })
                .ok();
            return TaskOutcome::Skipped;
        }
    }

    if let Err(e) = retry_with_backoff(&ctx.config.retry, || fetch_attempt(ctx, &target)).await {
        return fail(ctx, product, &format!("download failed: {e}"));
    }

    tracing::info!(worker = ctx.id, product = %product, path = ?target.archive_path, "downloaded");
    ctx.event_tx
        .send(Event::ProductDownloaded {
            product: product.to_string(),
            path: target.archive_path.clone(),
        })
        .ok();

    if let Some(extract) = &ctx.config.extract {
        let dir = target.extraction_dir(&extract.dir);
        let archive_path = target.archive_path.clone();
        let member_suffix = extract.member_suffix.clone();
        let extract_dir = dir.clone();

        let extracted = tokio::task::spawn_blocking(move || {
            extract_member(&archive_path, &extract_dir, &member_suffix)
        })
        .await;

        match extracted {
            Ok(Ok(_written)) => {
                if let Err(e) = tokio::fs::remove_file(&target.archive_path).await {
                    tracing::warn!(
                        worker = ctx.id,
                        product = %product,
                        error = %e,
                        "failed to remove archive after extraction"
                    );
                }
                ctx.event_tx
                    .send(Event::ProductExtracted {
                        product: product.to_string(),
                        dir,
                    })
                    .ok();
            }
            Ok(Err(e)) => {
                // The download itself succeeded; extraction failure is
                // terminal for this product and is not retried. The archive
                // is left in place for inspection.
                return fail(ctx, product, &format!("extraction failed: {e}"));
            }
            Err(e) => {
                return fail(ctx, product, &format!("extraction task panicked: {e}"));
            }
        }
    }

    TaskOutcome::Downloaded
}

/// One download attempt: authenticated GET streamed to the archive path
///
/// The bearer token is read from the store here, per attempt, because it may
/// have rotated since the previous attempt. On any failure the partial file
/// is removed before the error is returned, so the retry loop never observes
/// a half-written archive.
async fn fetch_attempt(ctx: &WorkerContext, target: &DownloadTarget) -> Result<(), FetchError> {
    let token = ctx.store.bearer();
    let result = stream_to_file(ctx, target, &token).await;
    if result.is_err() {
        let _ = tokio::fs::remove_file(&target.archive_path).await;
    }
    result
}

async fn stream_to_file(
    ctx: &WorkerContext,
    target: &DownloadTarget,
    token: &str,
) -> Result<(), FetchError> {
    let response = ctx
        .client
        .get(target.url.clone())
        .bearer_auth(token)
        .send()
        .await
        .map_err(|e| FetchError::Network {
            url: target.url.to_string(),
            source: e,
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: target.url.to_string(),
            status,
        });
    }

    let mut file = tokio::fs::File::create(&target.archive_path)
        .await
        .map_err(|e| FetchError::Write {
            path: target.archive_path.clone(),
            source: e,
        })?;

    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| FetchError::Network {
            url: target.url.to_string(),
            source: e,
        })?;
        file.write_all(&chunk)
            .await
            .map_err(|e| FetchError::Write {
                path: target.archive_path.clone(),
                source: e,
            })?;
    }

    file.flush().await.map_err(|e| FetchError::Write {
        path: target.archive_path.clone(),
        source: e,
    })?;

    Ok(())
}

fn fail(ctx: &WorkerContext, product: &str, error: &str) -> TaskOutcome {
    tracing::error!(worker = ctx.id, product = %product, error, "product failed");
    ctx.event_tx
        .send(Event::ProductFailed {
            product: product.to_string(),
            error: error.to_string(),
        })
        .ok();
    TaskOutcome::Failed
}

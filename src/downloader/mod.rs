//! Core bulk download pipeline
//!
//! The orchestrator performs the initial token exchange, starts the
//! background refresher and a fixed pool of workers, feeds product
//! identifiers through a hand-off channel, and waits for the pool to drain.
//! Identifiers are handed out in input order; completion order across
//! workers is unordered.

mod worker;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio_util::sync::CancellationToken;

use crate::auth::{TokenStore, authenticate, spawn_refresher};
use crate::config::Config;
use crate::error::Result;
use crate::types::{Event, RunSummary};
use crate::utils::read_product_list;

/// Buffer size for the task hand-off channel
///
/// Kept at 1 so the producer runs at most one identifier ahead of the
/// workers — effectively a rendezvous, and backpressure when the pool is
/// saturated.
const TASK_CHANNEL_BUFFER: usize = 1;

/// Buffer size for the event broadcast channel
const EVENT_CHANNEL_BUFFER: usize = 256;

/// Per-run outcome counters shared across workers
#[derive(Default)]
pub(crate) struct Counters {
    pub(crate) downloaded: AtomicU64,
    pub(crate) skipped: AtomicU64,
    pub(crate) failed: AtomicU64,
}

impl Counters {
    fn summary(&self) -> RunSummary {
        RunSummary {
            downloaded: self.downloaded.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Bulk product downloader
///
/// Obtains a bearer token, keeps it fresh for the lifetime of the run, and
/// fans product identifiers out to a bounded pool of concurrent workers.
/// Each worker performs idempotent fetch-and-store operations and, when
/// configured, single-member archive extraction.
///
/// # Example
///
/// ```no_run
/// use datastore_dl::{BulkDownloader, Config};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut config = Config::default();
///     config.credentials.client_id = "key".to_string();
///     config.credentials.client_secret = "secret".to_string();
///     config.workers = 4;
///
///     let downloader = BulkDownloader::new(config)?;
///     let summary = downloader.run("products.txt".as_ref()).await?;
///     println!(
///         "downloaded {}, skipped {}, failed {}",
///         summary.downloaded, summary.skipped, summary.failed
///     );
///     Ok(())
/// }
/// ```
pub struct BulkDownloader {
    config: Arc<Config>,
    client: reqwest::Client,
    event_tx: tokio::sync::broadcast::Sender<Event>,
}

impl BulkDownloader {
    /// Create a downloader from a validated configuration
    ///
    /// # Errors
    ///
    /// Returns a configuration error for invalid settings (zero workers,
    /// empty collection) or a network error if the HTTP client cannot be
    /// constructed.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        // No request timeout: product archives can be large and slow links
        // are expected; stalled transfers surface as connection errors.
        let client = reqwest::Client::builder().build()?;
        let (event_tx, _) = tokio::sync::broadcast::channel(EVENT_CHANNEL_BUFFER);
        Ok(Self {
            config: Arc::new(config),
            client,
            event_tx,
        })
    }

    /// Subscribe to pipeline events
    ///
    /// Events are broadcast best-effort; a lagging subscriber misses events
    /// but never blocks the pipeline.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Run the pipeline over identifiers read from a newline-separated file
    ///
    /// Blank lines are ignored. See [`run_with_products`] for the execution
    /// model and error behavior.
    ///
    /// [`run_with_products`]: BulkDownloader::run_with_products
    pub async fn run(&self, list_path: &Path) -> Result<RunSummary> {
        let products = read_product_list(list_path).await?;
        self.run_with_products(products).await
    }

    /// Run the pipeline over an in-memory identifier sequence
    ///
    /// Performs the initial token exchange (fatal on failure — nothing is
    /// downloaded without a token), starts the refresher and the worker
    /// pool, enqueues every non-empty identifier in order, then waits for
    /// all workers to finish and stops the refresher.
    ///
    /// Per-product failures are counted and reported via events; they are
    /// never escalated out of this method.
    pub async fn run_with_products<I>(&self, products: I) -> Result<RunSummary>
    where
        I: IntoIterator<Item = String>,
    {
        let credential = authenticate(&self.client, &self.config).await?;
        tracing::info!(
            valid_for_secs = credential.valid_for.as_secs(),
            scope = %credential.scope,
            "acquired access token"
        );
        let store = TokenStore::new(credential);

        let cancel_token = CancellationToken::new();
        let refresher = spawn_refresher(
            store.clone(),
            self.client.clone(),
            self.config.clone(),
            self.event_tx.clone(),
            cancel_token.clone(),
        );

        let (task_tx, task_rx) = tokio::sync::mpsc::channel::<String>(TASK_CHANNEL_BUFFER);
        let task_rx = Arc::new(tokio::sync::Mutex::new(task_rx));

        let counters = Arc::new(Counters::default());
        let mut workers = Vec::with_capacity(self.config.workers);
        for id in 1..=self.config.workers {
            let ctx = worker::WorkerContext {
                id,
                config: Arc::clone(&self.config),
                client: self.client.clone(),
                store: Arc::clone(&store),
                tasks: Arc::clone(&task_rx),
                event_tx: self.event_tx.clone(),
                counters: Arc::clone(&counters),
            };
            workers.push(tokio::spawn(worker::run_worker(ctx)));
        }

        for product in products {
            if product.is_empty() {
                continue;
            }
            if task_tx.send(product).await.is_err() {
                // All workers exited early; nothing left to hand work to.
                tracing::error!("task queue closed before all products were enqueued");
                break;
            }
        }
        // Dropping the sender closes the queue: workers drain and exit.
        drop(task_tx);

        for joined in futures::future::join_all(workers).await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "worker task panicked");
            }
        }

        cancel_token.cancel();
        refresher.await.ok();

        let summary = counters.summary();
        tracing::info!(
            downloaded = summary.downloaded,
            skipped = summary.skipped,
            failed = summary.failed,
            "bulk run complete"
        );
        Ok(summary)
    }
}

//! Core types and events

use std::path::PathBuf;
use std::time::Duration;

/// Aggregate outcome of one bulk run
///
/// Counter totals across all workers. `downloaded + skipped + failed` equals
/// the number of non-empty identifiers fed to the run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Products fetched (and, when configured, extracted) successfully
    pub downloaded: u64,
    /// Products skipped because their archive already existed locally
    pub skipped: u64,
    /// Products abandoned after a terminal failure
    pub failed: u64,
}

/// Events emitted while a run progresses
///
/// Subscribe via [`crate::BulkDownloader::subscribe`]. Events are broadcast
/// best-effort; a slow subscriber may miss events but never blocks a worker.
#[derive(Clone, Debug)]
pub enum Event {
    /// The background refresher installed a new access token
    TokenRefreshed {
        /// Validity window reported by the token endpoint
        valid_for: Duration,
    },
    /// The background refresher failed and exited; subsequent requests will
    /// carry a stale token
    TokenRefreshFailed {
        /// Description of the refresh failure
        error: String,
    },
    /// An archive already existed locally and force-overwrite was off
    ProductSkipped {
        /// Product identifier
        product: String,
        /// Existing local archive path
        path: PathBuf,
    },
    /// A product archive was downloaded to disk
    ProductDownloaded {
        /// Product identifier
        product: String,
        /// Local archive path
        path: PathBuf,
    },
    /// The configured member was extracted and the archive removed
    ProductExtracted {
        /// Product identifier
        product: String,
        /// Directory the member was extracted into
        dir: PathBuf,
    },
    /// A product was abandoned after a terminal failure
    ProductFailed {
        /// Product identifier
        product: String,
        /// Description of the terminal failure
        error: String,
    },
}

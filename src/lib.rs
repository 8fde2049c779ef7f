//! # datastore-dl
//!
//! Bulk downloader library for OAuth2-protected satellite data stores.
//!
//! Given a list of product identifiers, datastore-dl obtains a bearer token
//! via the client-credentials flow, keeps it fresh in the background for the
//! lifetime of the run, and fans the identifiers out to a bounded pool of
//! concurrent workers. Each worker performs an idempotent fetch-and-store:
//! archives that already exist locally are skipped (or replaced in force
//! mode), failed attempts are retried with backoff and never leave a partial
//! file behind, and each downloaded archive can optionally have a single
//! payload member extracted before the archive is deleted.
//!
//! ## Design Philosophy
//!
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Sensible defaults** - Works against the EUMETSAT Data Store out of
//!   the box; every endpoint and knob is configurable
//! - **Idempotent** - A re-run over the same list downloads nothing that is
//!   already on disk
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use datastore_dl::{BulkDownloader, Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.credentials.client_id = "consumer-key".to_string();
//!     config.credentials.client_secret = "consumer-secret".to_string();
//!     config.output_dir = "./archives".into();
//!     config.workers = 4;
//!
//!     let downloader = BulkDownloader::new(config)?;
//!
//!     // Subscribe to events
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let summary = downloader.run("products.txt".as_ref()).await?;
//!     println!("{summary:?}");
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Token acquisition, credential store, and background refresh
pub mod auth;
/// Configuration types
pub mod config;
/// Core bulk download pipeline
pub mod downloader;
/// Error types
pub mod error;
/// Single-member archive extraction
pub mod extraction;
/// Retry logic with exponential backoff
pub mod retry;
/// URL and local-path derivation for products
pub mod target;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use auth::{Credential, TokenStore, authenticate};
pub use config::{Config, CredentialsConfig, EndpointConfig, ExtractConfig, RetryConfig};
pub use downloader::BulkDownloader;
pub use error::{AuthError, Error, ExtractError, FetchError, Result};
pub use extraction::extract_member;
pub use retry::{IsRetryable, retry_with_backoff};
pub use target::DownloadTarget;
pub use types::{Event, RunSummary};
pub use utils::{parse_product_list, read_product_list};

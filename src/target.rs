//! Deriving the remote URL and local archive path for a product

use std::path::{Path, PathBuf};

use url::Url;

use crate::config::Config;
use crate::error::{Error, Result};

/// Extension appended to downloaded product archives
const ARCHIVE_EXT: &str = "zip";

/// The remote URL and local archive path derived from one product identifier
///
/// Derivation is a pure function of configuration and identifier, so the
/// idempotency check can be answered from the filesystem alone: the same
/// product always maps to the same archive path, and distinct products map
/// to distinct paths.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadTarget {
    /// Fully escaped product download URL
    pub url: Url,
    /// Local path the archive is written to
    pub archive_path: PathBuf,
}

impl DownloadTarget {
    /// Derive the target for one product identifier
    ///
    /// The URL is `<base>/collections/<collection>/products/<id>` with both
    /// the collection and the identifier percent-escaped. The archive path
    /// is the URL's final path segment plus `.zip` inside the output
    /// directory.
    pub fn for_product(config: &Config, product: &str) -> Result<Self> {
        let raw = format!(
            "{}/collections/{}/products/{}",
            config.endpoints.download_base.trim_end_matches('/'),
            urlencoding::encode(&config.collection),
            urlencoding::encode(product),
        );
        let url = Url::parse(&raw).map_err(|e| Error::Config {
            message: format!("cannot build product URL from '{raw}': {e}"),
            key: Some("endpoints.download_base".to_string()),
        })?;

        let basename = url
            .path_segments()
            .and_then(|segments| segments.last())
            .filter(|segment| !segment.is_empty())
            .ok_or_else(|| Error::Config {
                message: format!("product URL '{url}' has no basename"),
                key: Some("endpoints.download_base".to_string()),
            })?;

        let archive_path = config.output_dir.join(format!("{basename}.{ARCHIVE_EXT}"));
        Ok(Self { url, archive_path })
    }

    /// Directory this archive's member is extracted into
    ///
    /// The archive filename without its `.zip` extension, under the
    /// configured extraction root.
    pub fn extraction_dir(&self, extract_root: &Path) -> PathBuf {
        let stem = self
            .archive_path
            .file_stem()
            .map(|s| s.to_os_string())
            .unwrap_or_default();
        extract_root.join(stem)
    }
}

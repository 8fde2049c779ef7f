//! Utility functions for input handling

use std::path::Path;

use crate::error::Result;

/// Read a newline-separated product identifier list from a file
///
/// Blank lines are ignored; Windows line endings are tolerated.
pub async fn read_product_list(path: &Path) -> Result<Vec<String>> {
    let contents = tokio::fs::read_to_string(path).await?;
    Ok(parse_product_list(&contents))
}

/// Split an identifier listing into its non-empty entries, in input order
#[must_use]
pub fn parse_product_list(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

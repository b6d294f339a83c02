//! File-backed record source
//!
//! Replays captured feeds from a directory:
//!
//! ```text
//! <dir>/trades_page_1.json   [TradeRecord, ...]
//! <dir>/trades_page_2.json
//! <dir>/outgoing.json        [OutgoingRow, ...]
//! <dir>/modal.lock           present while a blocking modal is open
//! ```
//!
//! A missing page file is an empty page, which ends page growth. A row that
//! does not match the record layout is skipped with a warning; the file only
//! fails as a whole when it is not a JSON array. Files are re-read on every
//! fetch so a capture can be swapped out while running.

use anyhow::Context;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{MonitorError, Result};
use crate::models::{OutgoingRow, TradeRecord};
use crate::runtime::{BlockingSignal, RecordSource};

pub const OUTGOING_FILE: &str = "outgoing.json";
pub const MODAL_FLAG_FILE: &str = "modal.lock";

pub fn trade_page_file(page: u32) -> String {
    format!("trades_page_{}.json", page)
}

#[derive(Debug, Clone)]
pub struct FileFeed {
    dir: PathBuf,
}

impl FileFeed {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Flag-file blocking signal for the same directory
    pub fn modal_signal(&self) -> FlagFileSignal {
        FlagFileSignal::new(self.dir.join(MODAL_FLAG_FILE))
    }

    async fn read_rows<T: DeserializeOwned>(&self, name: &str) -> anyhow::Result<Vec<T>> {
        let path = self.dir.join(name);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "feed file missing, treating as empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
        };

        let values: Vec<serde_json::Value> =
            serde_json::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))?;

        let mut rows = Vec::with_capacity(values.len());
        for (index, value) in values.into_iter().enumerate() {
            match serde_json::from_value(value) {
                Ok(row) => rows.push(row),
                Err(e) => warn!(file = name, row = index, error = %e, "skipping malformed feed row"),
            }
        }
        Ok(rows)
    }
}

#[async_trait]
impl RecordSource for FileFeed {
    async fn fetch_trade_page(&self, page: u32) -> Result<Vec<TradeRecord>> {
        self.read_rows(&trade_page_file(page))
            .await
            .map_err(|e| MonitorError::feed(format!("{:#}", e)))
    }

    async fn fetch_outgoing(&self) -> Result<Vec<OutgoingRow>> {
        self.read_rows(OUTGOING_FILE)
            .await
            .map_err(|e| MonitorError::feed(format!("{:#}", e)))
    }
}

/// Reports a modal as open while a flag file exists
#[derive(Debug, Clone)]
pub struct FlagFileSignal {
    path: PathBuf,
}

impl FlagFileSignal {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl BlockingSignal for FlagFileSignal {
    fn is_blocking(&self) -> bool {
        self.path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const PAGE: &str = r#"[
        {"trade_id": "uc_1", "member_id": "m1", "member_name": "Alice", "member_points": 300,
         "country": "US", "card_name": "Lightning Bolt", "card_points": 40},
        {"trade_id": "uc_2", "member_id": "m2", "member_name": "Bob", "member_points": 90,
         "country": "DE", "card_set": "M10", "card_name": "Duress", "card_points": 5}
    ]"#;

    #[tokio::test]
    async fn test_reads_trade_page() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(trade_page_file(1)), PAGE).unwrap();
        let feed = FileFeed::new(dir.path());

        let rows = feed.fetch_trade_page(1).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].trade_id, "uc_1");
        assert_eq!(rows[1].card_set, "M10");
    }

    #[tokio::test]
    async fn test_missing_files_are_empty() {
        let dir = TempDir::new().unwrap();
        let feed = FileFeed::new(dir.path());

        assert!(feed.fetch_trade_page(4).await.unwrap().is_empty());
        assert!(feed.fetch_outgoing().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_file_is_feed_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(OUTGOING_FILE), "[{ broken").unwrap();
        let feed = FileFeed::new(dir.path());

        let err = feed.fetch_outgoing().await.unwrap_err();
        assert!(matches!(err, MonitorError::Feed(_)));
        assert!(err.to_string().contains("outgoing.json"));
    }

    #[tokio::test]
    async fn test_malformed_row_is_skipped_not_fatal() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(trade_page_file(2)),
            r#"[
                {"trade_id": "uc_1", "member_id": "m1", "member_name": "Alice", "member_points": 300,
                 "country": "US", "card_name": "Lightning Bolt", "card_points": 40},
                {"trade_id": "uc_2", "member_id": "m2", "member_name": "Bob", "member_points": 90,
                 "country": "DE", "card_name": "Duress"}
            ]"#,
        )
        .unwrap();
        let feed = FileFeed::new(dir.path());

        let rows = feed.fetch_trade_page(2).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].trade_id, "uc_1");
    }

    #[tokio::test]
    async fn test_non_array_file_is_feed_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(trade_page_file(1)), r#"{"trade_id": "uc_1"}"#).unwrap();
        let feed = FileFeed::new(dir.path());

        assert!(matches!(feed.fetch_trade_page(1).await, Err(MonitorError::Feed(_))));
    }

    #[tokio::test]
    async fn test_outgoing_rows_without_member() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(OUTGOING_FILE),
            r#"[{"member_id": "m1", "member_name": "Alice", "card_points": 30},
                {"member_id": null, "card_points": 12}]"#,
        )
        .unwrap();
        let feed = FileFeed::new(dir.path());

        let rows = feed.fetch_outgoing().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].member_id, None);
    }

    #[test]
    fn test_flag_file_signal() {
        let dir = TempDir::new().unwrap();
        let signal = FileFeed::new(dir.path()).modal_signal();
        assert!(!signal.is_blocking());

        fs::write(dir.path().join(MODAL_FLAG_FILE), "").unwrap();
        assert!(signal.is_blocking());
    }
}

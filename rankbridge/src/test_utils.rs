// SPDX-License-Identifier: MIT OR Apache-2.0

use tempfile::TempDir;

pub fn setup_logging() {
    if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }
}

/// Database file which can be opened by several nodes of the same test.
///
/// The file and its directory are removed when this value is dropped, keep it alive as long as
/// the nodes using it.
pub struct TempDatabase {
    _dir: TempDir,
    url: String,
}

impl TempDatabase {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("temporary directory can be created");
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("ranks.db").display());
        Self { _dir: dir, url }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Default for TempDatabase {
    fn default() -> Self {
        Self::new()
    }
}

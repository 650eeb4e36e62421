// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Channel all processes of one network publish invalidations on.
pub const DEFAULT_CHANNEL: &str = "rank-network";

/// Seconds a cached profile stays fresh.
pub const DEFAULT_PROFILE_TTL_SECS: u64 = 600;

/// Settings of one node.
///
/// Every field has a default, partial configuration files only override what they name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    /// Name of the pub/sub channel, all processes sharing a database need to use the same one.
    pub channel: String,
    /// Time to live of cached profiles in seconds.
    pub profile_ttl: u64,
    /// Names of ranks which are excluded from normal resolution in this process.
    pub excluded_ranks: HashSet<String>,
}

impl Config {
    pub fn profile_ttl(&self) -> Duration {
        Duration::from_secs(self.profile_ttl)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".into(),
            max_connections: 16,
            channel: DEFAULT_CHANNEL.into(),
            profile_ttl: DEFAULT_PROFILE_TTL_SECS,
            excluded_ranks: HashSet::new(),
        }
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use rankbridge_bus::{MemoryTransport, Transport};
use rankbridge_store::NameResolver;
use tracing::debug;

use crate::Node;
use crate::config::Config;
use crate::node::NodeError;

pub struct NodeBuilder {
    config: Config,
    transport: Option<Arc<dyn Transport>>,
    name_resolver: Option<Arc<dyn NameResolver>>,
}

impl NodeBuilder {
    pub(crate) fn new() -> Self {
        NodeBuilder {
            config: Config::default(),
            transport: None,
            name_resolver: None,
        }
    }

    /// Replaces all settings, for example with ones read from a configuration file.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn database_url(mut self, url: &str) -> Self {
        self.config.database_url = url.to_string();
        self
    }

    pub fn max_connections(mut self, max_connections: u32) -> Self {
        self.config.max_connections = max_connections;
        self
    }

    pub fn channel(mut self, channel: &str) -> Self {
        self.config.channel = channel.to_string();
        self
    }

    /// Time after which cached profiles are loaded again, rounded up to whole seconds.
    ///
    /// Spawning fails for a zero duration.
    pub fn profile_ttl(mut self, ttl: Duration) -> Self {
        self.config.profile_ttl = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
        self
    }

    /// Excludes the rank with this name from normal resolution in this node.
    pub fn exclude_rank(mut self, name: &str) -> Self {
        self.config.excluded_ranks.insert(name.to_string());
        self
    }

    /// Pub/sub transport connecting this node with its peers.
    ///
    /// Without a transport the node only talks to itself.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn name_resolver(mut self, resolver: Arc<dyn NameResolver>) -> Self {
        self.name_resolver = Some(resolver);
        self
    }

    pub async fn spawn(self) -> Result<Node, NodeError> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => {
                debug!("no transport configured, invalidations stay within this node");
                Arc::new(MemoryTransport::new())
            }
        };

        Node::spawn_inner(self.config, transport, self.name_resolver).await
    }
}

impl Default for NodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

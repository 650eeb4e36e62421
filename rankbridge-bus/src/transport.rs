// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
#[cfg(any(test, feature = "test_utils"))]
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use thiserror::Error;
use tokio::sync::{RwLock, broadcast};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{trace, warn};

/// Number of messages a slow subscriber can fall behind before it starts missing messages.
const CHANNEL_CAPACITY: usize = 512;

/// Stream of raw payloads received on a channel.
pub type BytesStream = Pin<Box<dyn Stream<Item = Vec<u8>> + Send + 'static>>;

#[derive(Debug, Error)]
#[error("transport failed: {0}")]
pub struct TransportError(pub String);

/// Pub/sub transport delivering payloads to every active subscriber of a named channel.
///
/// Delivery is at-most-once and unordered. Implementations may or may not deliver messages back to
/// subscribers of the publishing process.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn publish(&self, channel: &str, bytes: Vec<u8>) -> Result<(), TransportError>;

    /// Subscribes to a channel, only payloads published after subscribing are received.
    async fn subscribe(&self, channel: &str) -> Result<BytesStream, TransportError>;
}

/// In-process transport, every clone shares the same set of channels.
///
/// This can be used to connect multiple nodes living in the same process, for example in tests.
#[derive(Clone, Debug, Default)]
pub struct MemoryTransport {
    channels: Arc<RwLock<HashMap<String, broadcast::Sender<Vec<u8>>>>>,
    #[cfg(any(test, feature = "test_utils"))]
    fail_publish: Arc<AtomicBool>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    async fn sender(&self, channel: &str) -> broadcast::Sender<Vec<u8>> {
        if let Some(tx) = self.channels.read().await.get(channel) {
            return tx.clone();
        }

        let mut channels = self.channels.write().await;
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Let every following publish fail.
    #[cfg(any(test, feature = "test_utils"))]
    pub fn fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn publish(&self, channel: &str, bytes: Vec<u8>) -> Result<(), TransportError> {
        #[cfg(any(test, feature = "test_utils"))]
        {
            if self.fail_publish.load(Ordering::SeqCst) {
                return Err(TransportError("injected publish failure".into()));
            }
        }

        let tx = self.sender(channel).await;
        match tx.send(bytes) {
            Ok(receivers) => trace!(channel, receivers, "published message"),
            // Nobody listening is not an error for a fire-and-forget transport.
            Err(_) => trace!(channel, "published message without subscribers"),
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<BytesStream, TransportError> {
        let rx = self.sender(channel).await.subscribe();
        let channel = channel.to_string();
        let stream = BroadcastStream::new(rx).filter_map(move |item| {
            let channel = channel.clone();
            async move {
                match item {
                    Ok(bytes) => Some(bytes),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(%channel, skipped, "subscriber lagged behind, messages were lost");
                        None
                    }
                }
            }
        });
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;

    use super::{MemoryTransport, Transport};

    #[tokio::test]
    async fn deliver_to_all_subscribers() {
        let transport = MemoryTransport::new();
        let mut first = transport.subscribe("ranks").await.unwrap();
        let mut second = transport.clone().subscribe("ranks").await.unwrap();
        let mut other = transport.subscribe("other").await.unwrap();

        transport.publish("ranks", vec![1, 2, 3]).await.unwrap();

        assert_eq!(first.next().await, Some(vec![1, 2, 3]));
        assert_eq!(second.next().await, Some(vec![1, 2, 3]));

        transport.publish("other", vec![4]).await.unwrap();
        assert_eq!(other.next().await, Some(vec![4]));
    }

    #[tokio::test]
    async fn publish_without_subscribers() {
        let transport = MemoryTransport::new();
        transport.publish("ranks", vec![1]).await.unwrap();

        // Messages published before subscribing are not received.
        let mut stream = transport.subscribe("ranks").await.unwrap();
        transport.publish("ranks", vec![2]).await.unwrap();
        assert_eq!(stream.next().await, Some(vec![2]));
    }

    #[tokio::test]
    async fn injected_publish_failure() {
        let transport = MemoryTransport::new();
        transport.fail_publish(true);
        assert!(transport.publish("ranks", vec![1]).await.is_err());
        transport.fail_publish(false);
        assert!(transport.publish("ranks", vec![1]).await.is_ok());
    }
}

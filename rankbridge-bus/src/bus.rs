// SPDX-License-Identifier: MIT OR Apache-2.0

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use futures_util::{Stream, StreamExt};
use thiserror::Error;
use tracing::{debug, warn};

use crate::envelope::{BusMessage, Envelope};
use crate::transport::{BytesStream, Transport, TransportError};

#[derive(Debug, Error)]
pub enum BusError {
    #[error("could not encode message: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("could not decode message: {0}")]
    Decode(#[source] serde_json::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Handle to the shared invalidation channel.
///
/// Cloned handles publish and subscribe on the same channel.
#[derive(Clone)]
pub struct InvalidationBus {
    transport: Arc<dyn Transport>,
    channel: String,
}

impl InvalidationBus {
    pub fn new(transport: Arc<dyn Transport>, channel: impl Into<String>) -> Self {
        Self {
            transport,
            channel: channel.into(),
        }
    }

    /// Name of the channel all envelopes are multiplexed on.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Wraps the message in an envelope and publishes it.
    ///
    /// Returning successfully does not mean any peer received it.
    pub async fn publish<M: BusMessage>(&self, message: &M) -> Result<(), BusError> {
        let bytes = Envelope::new(message)?.to_bytes()?;
        self.transport.publish(&self.channel, bytes).await?;
        debug!(channel = %self.channel, message_type = M::TYPE, "published envelope");
        Ok(())
    }

    /// Subscribes to all envelopes published on the channel from now on.
    pub async fn subscribe(&self) -> Result<BusSubscription, BusError> {
        let stream = self.transport.subscribe(&self.channel).await?;
        Ok(BusSubscription {
            channel: self.channel.clone(),
            stream,
        })
    }
}

impl std::fmt::Debug for InvalidationBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvalidationBus")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

/// Stream of envelopes received on the invalidation channel.
///
/// Payloads which are not valid envelopes are logged and skipped.
pub struct BusSubscription {
    channel: String,
    stream: BytesStream,
}

impl BusSubscription {
    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl Stream for BusSubscription {
    type Item = Envelope;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            let Some(bytes) = ready!(self.stream.poll_next_unpin(cx)) else {
                return Poll::Ready(None);
            };

            match Envelope::from_bytes(&bytes) {
                Ok(envelope) => return Poll::Ready(Some(envelope)),
                Err(err) => {
                    warn!(channel = %self.channel, "dropped malformed envelope: {err}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures_util::StreamExt;
    use uuid::Uuid;

    use crate::messages::{ProfileInvalidation, RegistryReload};
    use crate::transport::{MemoryTransport, Transport};

    use super::InvalidationBus;

    #[tokio::test]
    async fn publish_and_receive() {
        let transport = MemoryTransport::new();
        let bus_a = InvalidationBus::new(Arc::new(transport.clone()), "rank-network");
        let bus_b = InvalidationBus::new(Arc::new(transport), "rank-network");

        let mut subscription = bus_b.subscribe().await.unwrap();

        let message = ProfileInvalidation {
            player_id: Uuid::new_v4(),
        };
        bus_a.publish(&message).await.unwrap();

        let envelope = subscription.next().await.unwrap();
        assert_eq!(
            envelope.decode_body::<ProfileInvalidation>().unwrap(),
            Some(message)
        );
    }

    #[tokio::test]
    async fn skip_malformed_payloads() {
        let transport = MemoryTransport::new();
        let bus = InvalidationBus::new(Arc::new(transport.clone()), "rank-network");
        let mut subscription = bus.subscribe().await.unwrap();

        transport
            .publish("rank-network", b"{ broken".to_vec())
            .await
            .unwrap();
        transport
            .publish("rank-network", br#"{"type":"unknown"}"#.to_vec())
            .await
            .unwrap();
        bus.publish(&RegistryReload {}).await.unwrap();

        let envelope = subscription.next().await.unwrap();
        assert!(envelope.is::<RegistryReload>());
    }
}

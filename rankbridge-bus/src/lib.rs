// SPDX-License-Identifier: MIT OR Apache-2.0

//! Publish/subscribe protocol distributing cache invalidations between processes sharing one
//! rank database.
//!
//! All messages travel as an [`Envelope`] on a single named channel. An envelope carries the
//! message type, a version number and an opaque JSON body:
//!
//! ```json
//! {"type": "rank-update", "version": 1, "message": {"player-id": "..."}}
//! ```
//!
//! Receivers ignore envelopes with unknown types or versions which do not match what they were
//! compiled against.
//!
//! The underlying [`Transport`] is expected to deliver at-most-once and without ordering
//! guarantees, there are no acknowledgements or retries. Consumers need another convergence
//! mechanism (for example expiring caches) for the case of lost messages.
mod bus;
mod envelope;
mod messages;
mod transport;

pub use bus::{BusError, BusSubscription, InvalidationBus};
pub use envelope::{BusMessage, Envelope};
pub use messages::{
    IdentityInvalidation, MutationKind, PermissionMutation, ProfileInvalidation, RegistryReload,
};
pub use transport::{BytesStream, MemoryTransport, Transport, TransportError};

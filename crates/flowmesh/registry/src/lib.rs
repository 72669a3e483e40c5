//! Peer registry for the flowmesh placement subsystem.
//!
//! Maintains the live set of known peer machines: admits peers announced by
//! the external discovery protocol (after an identity probe), health-checks
//! them on a fixed interval, evicts after repeated failures, and reacts to
//! losing the local network connection. The registry is the one piece of
//! state shared between concurrent placement decisions and the background
//! health loop; readers always get a snapshot.

pub mod error;
pub mod registry;
pub mod transport;

pub use error::{RegistryError, RegistryResult};
pub use registry::{HealthRound, PeerRegistry, RegistryEvent, SelfAdvertiser, STRIKE_LIMIT};
pub use transport::{PeerTransport, TransportError, TransportResult};

#[cfg(any(test, feature = "test-utils"))]
pub use transport::testing;

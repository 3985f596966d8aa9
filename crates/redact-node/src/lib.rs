//! Quorum-gated transaction redaction
//!
//! A node set jointly holds the trapdoor of a chameleon hash: a distributed
//! setup gives every node an additive share of it, and a redaction mission
//! rewrites one committed transaction so that its recorded digest still
//! verifies against the new content. Every node of the set must take part
//! in every mission.
//!
//! The crate is organized around [`Reactor`], which owns the setup and
//! session state of one node and talks to a [`Transport`] and a
//! [`BlockStore`] supplied by the host node.
//!
//! ```ignore
//! let reactor = Reactor::spawn(config, transport, store)?;
//! reactor.serve(inbox);
//! reactor.submit_redact_task(Task::new(10, 2, "k", "v2")).await?;
//! ```

pub mod config;
pub mod error;
pub mod reactor;
pub mod registry;
pub mod session;
pub mod setup;
pub mod store;
pub mod transport;
pub mod types;
pub mod wire;

pub use config::NodeConfig;
pub use error::{Error, Result};
pub use reactor::{Reactor, Status};
pub use session::SessionState;
pub use setup::SetupPhase;
pub use store::{commit_block, BlockStore, MemoryBlockStore, TxSlot};
pub use transport::{MemoryNetwork, MemoryTransport, NetworkEvent, Transport};
pub use types::{Height, MissionName, PeerId, Task, TxIndex};

/// Group element of the ristretto255 backend
pub type Element = chameleon::RistrettoPoint;

/// Scalar of the ristretto255 backend
pub type Scalar = chameleon::Scalar;

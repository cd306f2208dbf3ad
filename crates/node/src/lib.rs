//! Storage orchestrator for the hashd content network.
//!
//! [`StorageNode`] is the top-level component: it brings the transport up,
//! discovers storage peers through relay directories, tracks them in a
//! [`hashd_peers::PeerDirectory`], and serves store/retrieve workflows with
//! explicit ordering, timeout and fallback policy. Consumers construct a
//! node instance directly and pass it by handle; there is no shared global
//! client.
//!
//! Store and retrieve attempts against multiple candidate peers are
//! strictly sequential, never concurrent. That bounds resource usage at
//! the cost of added latency and is a deliberate design choice.

#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod config;
mod error;
mod events;
mod facade;
mod node;
mod registry;

pub use config::NodeConfig;
pub use error::NodeError;
pub use events::{ConnectionState, NodeEvent};
pub use facade::NodeClient;
pub use node::StorageNode;
pub use registry::{NodeRegistry, RegistryError, StaticRegistry};

// The vocabulary types callers handle when driving a node.
pub use hashd_net_client::{MessageSigner, ProtocolError, RetrievedContent, StoreReceipt};
pub use hashd_peers::{PeerRecord, PeerState};

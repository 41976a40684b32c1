//! genwg - WireGuard relay configuration generator
//!
//! Turns a single document describing relays and the peers connecting through
//! them into a ready-to-deploy bundle: wg-quick configs for both sides,
//! udp2raw obfuscation hooks, BIND zones and a snapshot of the resolved state.
//!
//! # Pipeline
//!
//! 1. [`config::load_document`] parses YAML or TOML into an untyped tree
//! 2. [`config::validate`] checks it and collects every finding
//! 3. [`model::ModelBuilder`] resolves keys, addresses and derived settings
//! 4. [`model::check`] enforces invariants spanning several entities
//! 5. [`render::render`] and [`dump::dump`] produce the bundle in memory
//! 6. [`pipeline::write_bundle`] writes it out
//!
//! Key generation goes through the [`crypto::KeyProvider`] trait, either
//! in-process X25519 or the external `wg` tool.

pub mod config;
pub mod crypto;
pub mod dump;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod render;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{Document, DocumentFormat};
    pub use crate::crypto::{KeyPair, KeyProvider, WgTool, X25519Keys};
    pub use crate::error::{Error, Result};
    pub use crate::model::{ConsistencyPolicy, ModelBuilder, NetworkModel, Peer, Relay};
    pub use crate::render::Artifact;
}

//! genwg Configuration
//!
//! The input document describes relays (`servers`) and the peers (`clients`)
//! connecting through each of them. This module holds the typed form of that
//! document, produced by the validator and written back by the state dumper.

pub mod fields;
pub mod loader;
pub mod validate;

use std::path::Path;

use serde::Serialize;

use crate::model::Transport;

pub use loader::load_document;
pub use validate::validate;

/// Input document, in the same shape as the file on disk
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Document {
    /// Relays in declaration order
    pub servers: Vec<ServerEntry>,
}

/// A relay record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerEntry {
    /// Interface name of the relay
    pub name: String,

    /// Transport kind (`udp` or `tcp`)
    pub proto: Transport,

    /// Private key, generated when absent
    #[serde(rename = "priv", skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,

    /// Public endpoint address
    pub ip: String,

    /// WireGuard listen port
    pub port: i64,

    /// Tunnel network in `address/prefix` form
    pub net: String,

    /// Interface MTU
    pub mtu: i64,

    /// udp2raw settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub udp2raw: Option<Udp2RawEntry>,

    /// BIND settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub named: Option<NamedEntry>,

    /// Additional /32 addresses carried by the relay
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra_address: Vec<String>,

    /// Additional networks reachable through the relay
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra_allowed: Vec<String>,

    /// Peers in declaration order
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub clients: Vec<ClientEntry>,
}

/// udp2raw block of a relay
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Udp2RawEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

/// named (BIND) block of a relay
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct NamedEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub conf_dir: Option<String>,
}

/// A peer record
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ClientEntry {
    pub name: String,

    #[serde(rename = "priv", skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,

    /// Reach the relay through udp2raw
    #[serde(skip_serializing_if = "is_false")]
    pub tcp: bool,

    /// Android variant (no wg-quick hooks)
    #[serde(skip_serializing_if = "is_false")]
    pub android: bool,

    /// Forward the local BIND root zone to the relay while the tunnel is up
    #[serde(skip_serializing_if = "is_false")]
    pub bind: bool,

    /// Route the relay's extra addresses and networks
    #[serde(skip_serializing_if = "is_false")]
    pub append_extra: bool,

    /// Let wg-quick point the resolver at the relay
    #[serde(skip_serializing_if = "is_false")]
    pub wg_handled_dns: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_zone_file: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub wgquick_path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub udp2raw_path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub udp2raw_log_path: Option<String>,

    /// Networks reachable behind this peer
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra_allowed: Vec<String>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// On-disk format of an input document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Yaml,
    Toml,
}

impl DocumentFormat {
    /// Pick the format from a file extension; anything but `.toml` is YAML
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => DocumentFormat::Toml,
            _ => DocumentFormat::Yaml,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            DocumentFormat::Yaml => "yml",
            DocumentFormat::Toml => "toml",
        }
    }
}

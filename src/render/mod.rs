//! Output rendering
//!
//! Turns a resolved [`NetworkModel`] into the files of an output bundle.
//! Rendering is pure: every artifact is produced in memory and nothing
//! touches the filesystem until the whole bundle exists.

pub mod bind;
pub mod udp2raw;
pub mod wireguard;

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::model::NetworkModel;

/// Mode of files holding private keys or secrets
pub const MODE_SECRET: u32 = 0o600;

/// Mode of launch scripts
pub const MODE_SCRIPT: u32 = 0o700;

/// Mode of public files
pub const MODE_PUBLIC: u32 = 0o644;

/// Relay configs, relative to the output directory
pub const SERVER_DIR: &str = "server";

/// Peer configs and launch scripts
pub const CLIENT_DIR: &str = "client";

/// BIND include file and zones
pub const BIND_DIR: &str = "bind";

/// One file of the output bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Path relative to the output directory
    pub path: PathBuf,
    pub contents: String,
    pub mode: u32,
}

impl Artifact {
    pub fn new(path: impl Into<PathBuf>, contents: String, mode: u32) -> Self {
        Self {
            path: path.into(),
            contents,
            mode,
        }
    }
}

/// Render every artifact of the bundle, in a stable order
pub fn render(model: &NetworkModel) -> Vec<Artifact> {
    let mut artifacts = Vec::new();
    let server_dir = Path::new(SERVER_DIR);
    let client_dir = Path::new(CLIENT_DIR);
    let zone_dir = Path::new(BIND_DIR).join(bind::ZONE_DIR);

    for relay in &model.relays {
        debug!("Rendering server {} and {} client(s)", relay.name, relay.peers.len());
        artifacts.push(Artifact::new(
            server_dir.join(format!("{}.conf", relay.name)),
            wireguard::relay_config(relay),
            MODE_SECRET,
        ));

        for peer in &relay.peers {
            let stem = wireguard::peer_file_stem(relay, peer);
            artifacts.push(Artifact::new(
                client_dir.join(format!("{}.conf", stem)),
                wireguard::peer_config(relay, peer),
                MODE_SECRET,
            ));
            if let Some(script) = wireguard::android_script(relay, peer) {
                artifacts.push(Artifact::new(
                    client_dir.join(format!("{}.sh", stem)),
                    script,
                    MODE_SCRIPT,
                ));
            }
        }

        if let (Some(dns), Some(forward), Some(reverse)) = (
            &relay.dns,
            bind::forward_zone(relay),
            bind::reverse_zone(relay),
        ) {
            artifacts.push(Artifact::new(zone_dir.join(&relay.name), forward, MODE_PUBLIC));
            artifacts.push(Artifact::new(
                zone_dir.join(bind::reverse_file_name(&dns.reverse_zone)),
                reverse,
                MODE_PUBLIC,
            ));
        }
    }

    if let Some(include) = bind::named_include(model) {
        artifacts.push(Artifact::new(
            Path::new(BIND_DIR).join(bind::INCLUDE_FILE),
            include,
            MODE_PUBLIC,
        ));
    }

    artifacts
}

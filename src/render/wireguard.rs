//! wg-quick configuration files

use std::fmt::Write as _;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;

use crate::model::{Ipv4Net, Peer, Relay};
use crate::render::udp2raw;

/// Keepalive for peers reaching the relay over plain UDP
pub const KEEPALIVE_DIRECT: u16 = 25;

/// Keepalive for peers behind udp2raw; faketcp sessions tolerate longer gaps
pub const KEEPALIVE_OBFUSCATED: u16 = 120;

/// Shell snippet resolving the current default gateway
const DEFAULT_GW: &str = "`ip route list match 0 table all scope global | awk '{print $3}'`";

/// Shell snippet resolving the current default interface
const DEFAULT_DEV: &str = "`ip route list match 0 table all scope global | awk '{print $5}'`";

/// File name of a peer's configuration
pub fn peer_file_stem(relay: &Relay, peer: &Peer) -> String {
    format!("{}-{}", peer.name, relay.name)
}

/// Interface config of a relay, one `[Peer]` per peer in declaration order
pub fn relay_config(relay: &Relay) -> String {
    let mut conf = String::new();
    let _ = writeln!(conf, "# - server : {}", relay.name);
    let _ = writeln!(conf, "# - proto  : {}", relay.transport);
    let _ = writeln!(conf, "# - public : {}", relay.keys.public);
    conf.push('\n');

    conf.push_str("[Interface]\n");
    let _ = writeln!(conf, "PrivateKey = {}", relay.keys.private);
    let mut addresses = vec![format!("{}/{}", relay.address, relay.network.prefix())];
    addresses.extend(relay.extra_addresses.iter().map(|addr| format!("{}/32", addr)));
    let _ = writeln!(conf, "Address = {}", addresses.join(", "));
    let _ = writeln!(conf, "ListenPort = {}", relay.port);
    let _ = writeln!(conf, "MTU = {}", relay.mtu);

    if let Some(obfuscation) = &relay.obfuscation {
        if relay.is_obfuscated() {
            let command = udp2raw::server_command(relay, obfuscation);
            let _ = writeln!(
                conf,
                "PreUp = {}",
                udp2raw::background(&command, Path::new(udp2raw::SERVER_LOG))
            );
            conf.push_str("PostDown = pkill -15 udp2raw || true\n");
        }
    }

    for peer in &relay.peers {
        let mut allowed = vec![format!("{}/32", peer.address)];
        allowed.extend(peer.extra_allowed.iter().map(Ipv4Net::to_string));

        conf.push('\n');
        let _ = writeln!(conf, "# {}", peer.name);
        conf.push_str("[Peer]\n");
        let _ = writeln!(conf, "PublicKey = {}", peer.keys.public);
        let _ = writeln!(conf, "AllowedIPs = {}", allowed.join(", "));
    }

    conf
}

/// Interface config of a peer, with a single `[Peer]` for its relay
pub fn peer_config(relay: &Relay, peer: &Peer) -> String {
    let mut conf = String::new();
    let _ = writeln!(conf, "# - server : {}", relay.name);
    let _ = writeln!(conf, "# - client : {}", peer.name);
    let _ = writeln!(conf, "# - public : {}", peer.keys.public);
    conf.push('\n');

    conf.push_str("[Interface]\n");
    let _ = writeln!(conf, "Address = {}/32", peer.address);
    let _ = writeln!(conf, "PrivateKey = {}", peer.keys.private);
    let _ = writeln!(conf, "MTU = {}", relay.mtu);

    if let Some(root_zone_file) = &peer.root_zone_file {
        conf.push_str(&bind_hooks(relay, root_zone_file));
    } else if peer.wg_handled_dns {
        if relay.serves_dns() {
            let _ = writeln!(conf, "DNS = {}, {}", relay.address, relay.name);
        } else {
            let _ = writeln!(conf, "DNS = {}", relay.address);
        }
    }

    let through_udp2raw = peer.runs_udp2raw(relay);
    if through_udp2raw && !peer.is_restricted() {
        conf.push_str(&udp2raw_hooks(relay, peer));
    }

    conf.push_str("\n[Peer]\n");
    let _ = writeln!(conf, "PublicKey = {}", relay.keys.public);
    let endpoint = if through_udp2raw {
        udp2raw::CLIENT_LISTEN
    } else {
        SocketAddr::new(relay.endpoint, relay.port)
    };
    let _ = writeln!(conf, "Endpoint = {}", endpoint);
    let routes: Vec<String> = relay.routes_for(peer).iter().map(Ipv4Net::to_string).collect();
    let _ = writeln!(conf, "AllowedIPs = {}", routes.join(", "));
    let keepalive = if through_udp2raw {
        KEEPALIVE_OBFUSCATED
    } else {
        KEEPALIVE_DIRECT
    };
    let _ = writeln!(conf, "PersistentKeepalive = {}", keepalive);

    conf
}

/// Point the local BIND at the relay while the tunnel is up, restore root hints on teardown
fn bind_hooks(relay: &Relay, root_zone_file: &Path) -> String {
    let mut hooks = String::from("\n");
    hooks.push_str("PostUp = mkdir -p \"/tmp/bind\"\n");
    let _ = writeln!(
        hooks,
        "PostUp = echo \"zone \\\".\\\" {{ type forward; forwarders {{ {}; }}; }};\" > \"/tmp/bind/named.conf.local\"",
        relay.address
    );
    hooks.push_str("PostUp = rndc reload\n");
    hooks.push_str("PreDown = mkdir -p \"/tmp/bind\"\n");
    let _ = writeln!(
        hooks,
        "PreDown = echo \"zone \\\".\\\" {{ type hint; file \\\"{}\\\"; }};\" > \"/tmp/bind/named.conf.local\"",
        root_zone_file.display()
    );
    hooks.push_str("PreDown = rndc reload\n");
    hooks
}

/// Keep the relay reachable outside the tunnel and run udp2raw around it
fn udp2raw_hooks(relay: &Relay, peer: &Peer) -> String {
    let (Some(obfuscation), Some(log)) = (&relay.obfuscation, &peer.obfuscation_log) else {
        return String::new();
    };

    let ip = match relay.endpoint {
        IpAddr::V4(_) => "ip",
        IpAddr::V6(_) => "ip -6",
    };
    let route = format!("{} via {} dev {}", relay.endpoint, DEFAULT_GW, DEFAULT_DEV);
    let command = udp2raw::client_command(Path::new("udp2raw"), relay, obfuscation);

    let mut hooks = String::new();
    let _ = writeln!(hooks, "PreUp = {} route add {}", ip, route);
    let _ = writeln!(hooks, "PreUp = {}", udp2raw::background(&command, log));
    let _ = writeln!(hooks, "PostDown = {} route del {}", ip, route);
    hooks.push_str("PostDown = pkill -15 udp2raw || true\n");
    hooks
}

/// Launch script for Android peers, which cannot run wg-quick hooks
pub fn android_script(relay: &Relay, peer: &Peer) -> Option<String> {
    let restricted = peer.restricted.as_ref()?;

    let mut script = String::from("#!/system/bin/sh\n");
    let _ = writeln!(script, "# - server : {}", relay.name);
    let _ = writeln!(script, "# - client : {}", peer.name);
    script.push('\n');
    script.push_str("set -e\n");
    script.push_str("cd \"$(dirname \"$0\")\"\n");

    if let (Some(obfuscation), Some(binary), Some(log)) = (
        relay.obfuscation.as_ref().filter(|_| peer.runs_udp2raw(relay)),
        &restricted.udp2raw_path,
        &peer.obfuscation_log,
    ) {
        let command = udp2raw::client_command(binary, relay, obfuscation);
        let _ = writeln!(script, "{}", udp2raw::background(&command, log));
    }

    let _ = writeln!(
        script,
        "{} up \"$PWD/{}.conf\"",
        restricted.wgquick_path.display(),
        peer_file_stem(relay, peer)
    );
    Some(script)
}

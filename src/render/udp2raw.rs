//! udp2raw launch parameters
//!
//! The relay runs udp2raw in server mode in front of its WireGuard port;
//! obfuscated peers run it in client mode and point WireGuard at the local
//! end of the tunnel.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;

use crate::model::{Obfuscation, Relay};

/// Local end of the client-side udp2raw tunnel
pub const CLIENT_LISTEN: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 50001);

/// Log file of the relay-side udp2raw process
pub const SERVER_LOG: &str = "/var/log/udp2raw.log";

/// Server-mode command: listen on the public endpoint, forward to WireGuard
pub fn server_command(relay: &Relay, obfuscation: &Obfuscation) -> String {
    format!(
        "udp2raw -s -l {} -r {} -k \"{}\" -a",
        SocketAddr::new(relay.endpoint, obfuscation.port),
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), relay.port),
        obfuscation.secret
    )
}

/// Client-mode command: listen locally, forward to the relay's udp2raw port
pub fn client_command(binary: &Path, relay: &Relay, obfuscation: &Obfuscation) -> String {
    format!(
        "{} -c -l {} -r {} -k \"{}\" -a",
        binary.display(),
        CLIENT_LISTEN,
        SocketAddr::new(relay.endpoint, obfuscation.port),
        obfuscation.secret
    )
}

/// Run `command` in the background, appending its output to `log`
pub fn background(command: &str, log: &Path) -> String {
    format!("{} >\"{}\" 2>&1 &", command, log.display())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::model::{Ipv4Net, Transport};

    fn relay(endpoint: IpAddr) -> Relay {
        Relay {
            name: "wg0".into(),
            transport: Transport::Obfuscated,
            keys: KeyPair {
                private: "p".into(),
                public: "P".into(),
            },
            endpoint,
            port: 51820,
            network: Ipv4Net::parse("10.0.0.0/24").unwrap(),
            address: Ipv4Addr::new(10, 0, 0, 1),
            mtu: 1300,
            obfuscation: Some(Obfuscation {
                port: 4096,
                secret: "s3cret".into(),
            }),
            dns: None,
            extra_addresses: Vec::new(),
            extra_allowed: Vec::new(),
            peer_networks: Vec::new(),
            peers: Vec::new(),
        }
    }

    #[test]
    fn test_server_command() {
        let relay = relay("203.0.113.10".parse().unwrap());
        let obfuscation = relay.obfuscation.clone().unwrap();
        assert_eq!(
            server_command(&relay, &obfuscation),
            "udp2raw -s -l 203.0.113.10:4096 -r 127.0.0.1:51820 -k \"s3cret\" -a"
        );
    }

    #[test]
    fn test_client_command_ipv6() {
        let relay = relay("2001:db8::1".parse().unwrap());
        let obfuscation = relay.obfuscation.clone().unwrap();
        assert_eq!(
            client_command(Path::new("udp2raw"), &relay, &obfuscation),
            "udp2raw -c -l 127.0.0.1:50001 -r [2001:db8::1]:4096 -k \"s3cret\" -a"
        );
        assert_eq!(
            background("udp2raw -c", Path::new("/var/log/u.log")),
            "udp2raw -c >\"/var/log/u.log\" 2>&1 &"
        );
    }
}

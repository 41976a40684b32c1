//! Key material for relays and peers
//!
//! WireGuard keys are X25519 keys encoded as standard base64. Key generation
//! sits behind the [`KeyProvider`] trait so the model builder never cares
//! whether keys come from this process or from the external `wg` tool.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use base64::{
    engine::general_purpose::{STANDARD as BASE64, URL_SAFE_NO_PAD},
    Engine as _,
};
use rand::RngCore;
use tracing::debug;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::{Error, Result};

/// Number of random bytes behind a generated udp2raw secret
pub const SECRET_BYTES: usize = 16;

/// Source of private keys, public keys and shared secrets
pub trait KeyProvider {
    /// Produce a fresh base64 private key
    fn generate_private(&self) -> Result<String>;

    /// Derive the base64 public key matching `private`
    fn public_from_private(&self, private: &str) -> Result<String>;

    /// Produce a fresh obfuscation secret
    fn generate_secret(&self) -> Result<String> {
        let mut bytes = [0u8; SECRET_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Ok(URL_SAFE_NO_PAD.encode(bytes))
    }
}

/// A resolved private/public key pair, both base64 encoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub private: String,
    pub public: String,
}

impl KeyPair {
    /// Use `private` when supplied, otherwise ask the provider for a new key
    pub fn resolve(provider: &dyn KeyProvider, private: Option<&str>) -> Result<Self> {
        let private = match private {
            Some(key) => key.to_string(),
            None => provider.generate_private()?,
        };
        let public = provider.public_from_private(&private)?;
        Ok(Self { private, public })
    }
}

/// In-process X25519 key generation
#[derive(Debug, Default, Clone, Copy)]
pub struct X25519Keys;

impl KeyProvider for X25519Keys {
    fn generate_private(&self) -> Result<String> {
        let secret = StaticSecret::random_from_rng(rand::rngs::OsRng);
        Ok(BASE64.encode(secret.to_bytes()))
    }

    fn public_from_private(&self, private: &str) -> Result<String> {
        let secret = StaticSecret::from(decode_key(private)?);
        Ok(BASE64.encode(PublicKey::from(&secret).as_bytes()))
    }
}

/// Decode a base64 WireGuard key into its 32 raw bytes
pub fn decode_key(b64: &str) -> Result<[u8; 32]> {
    let bytes = BASE64
        .decode(b64.trim())
        .map_err(|e| Error::KeyProvider(format!("invalid key encoding: {}", e)))?;
    if bytes.len() != 32 {
        return Err(Error::KeyProvider(format!(
            "invalid key length: {} (expected 32)",
            bytes.len()
        )));
    }
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

/// Key generation through the external `wg` binary
#[derive(Debug, Clone)]
pub struct WgTool {
    binary: PathBuf,
}

impl WgTool {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn run(&self, arg: &str, input: Option<&str>) -> Result<String> {
        debug!("Running {} {}", self.binary.display(), arg);
        let mut child = Command::new(&self.binary)
            .arg(arg)
            .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::KeyProvider(format!("{}: {}", self.binary.display(), e)))?;

        if let (Some(data), Some(mut stdin)) = (input, child.stdin.take()) {
            writeln!(stdin, "{}", data).map_err(|e| Error::KeyProvider(e.to_string()))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| Error::KeyProvider(e.to_string()))?;
        if !output.status.success() {
            return Err(Error::KeyProvider(
                String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    }
}

impl Default for WgTool {
    fn default() -> Self {
        Self::new("wg")
    }
}

impl KeyProvider for WgTool {
    fn generate_private(&self) -> Result<String> {
        self.run("genkey", None)
    }

    fn public_from_private(&self, private: &str) -> Result<String> {
        self.run("pubkey", Some(private))
    }
}

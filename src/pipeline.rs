//! End-to-end generation
//!
//! load → validate → build → check → render → write. Every stage before
//! [`write_bundle`] is side-effect free apart from key generation, so a
//! failing run leaves the output directory untouched.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};
use tracing::{debug, info, warn};

use crate::config::{self, DocumentFormat};
use crate::crypto::KeyProvider;
use crate::dump;
use crate::error::{Error, Result};
use crate::model::{self, ConsistencyPolicy, ModelBuilder, NetworkModel};
use crate::render::{self, Artifact, MODE_SECRET};

/// Default output directory
pub const DEFAULT_OUTPUT_DIR: &str = "genwg_dump";

/// A resolved and checked input document
#[derive(Debug, Clone)]
pub struct Resolved {
    pub model: NetworkModel,
    /// Format of the input, reused for the snapshot
    pub format: DocumentFormat,
}

/// Load, validate, build and check the document at `path`
pub fn resolve(path: &Path, keys: &dyn KeyProvider, policy: ConsistencyPolicy) -> Result<Resolved> {
    info!("Loading {}", path.display());
    let (tree, format) = config::load_document(path)?;

    let document = config::validate(&tree)?;
    let model = ModelBuilder::new(keys).build(&document)?;
    model::check(&model, policy)?;
    Ok(Resolved { model, format })
}

/// Render the bundle and the state snapshot in memory
pub fn bundle<Tz: TimeZone>(resolved: &Resolved, at: &DateTime<Tz>) -> Result<Vec<Artifact>>
where
    Tz::Offset: std::fmt::Display,
{
    let mut artifacts = render::render(&resolved.model);

    let snapshot = dump::to_string(&dump::dump(&resolved.model), resolved.format)?;
    artifacts.push(Artifact::new(
        dump::snapshot_file_name(at, resolved.format),
        snapshot,
        MODE_SECRET,
    ));

    let mut seen = HashSet::new();
    for artifact in &artifacts {
        if !seen.insert(artifact.path.as_path()) {
            return Err(Error::consistency(
                artifact.path.display().to_string(),
                "output file would be written twice, rename a server or client",
            ));
        }
    }

    debug!("Rendered {} file(s)", artifacts.len());
    Ok(artifacts)
}

/// Write every artifact below `out_dir`
///
/// Fails with [`Error::OutputExists`] when `out_dir` already exists, unless
/// `force` is set, in which case the previous bundle is removed first.
pub fn write_bundle(out_dir: &Path, artifacts: &[Artifact], force: bool) -> Result<Vec<PathBuf>> {
    if out_dir.exists() {
        if !force {
            return Err(Error::OutputExists(out_dir.to_path_buf()));
        }
        warn!("Replacing the bundle in {}", out_dir.display());
        clear_bundle(out_dir)?;
    }

    let mut written = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        let path = out_dir.join(&artifact.path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, &artifact.contents)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(artifact.mode))?;
        }
        debug!("Wrote {}", path.display());
        written.push(path);
    }

    info!("Wrote {} file(s) to {}", written.len(), out_dir.display());
    Ok(written)
}

/// Remove whatever a previous run left in `out_dir`
///
/// Only the bundle subtrees and snapshots are touched; other files in the
/// directory are kept.
fn clear_bundle(out_dir: &Path) -> Result<()> {
    for dir in [render::SERVER_DIR, render::CLIENT_DIR, render::BIND_DIR] {
        let path = out_dir.join(dir);
        if path.is_dir() {
            debug!("Removing {}", path.display());
            std::fs::remove_dir_all(&path)?;
        }
    }

    for entry in std::fs::read_dir(out_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() && is_snapshot(&entry.file_name().to_string_lossy()) {
            debug!("Removing {}", entry.path().display());
            std::fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

fn is_snapshot(file_name: &str) -> bool {
    [DocumentFormat::Yaml, DocumentFormat::Toml].iter().any(|format| {
        file_name.ends_with(&format!("-{}.{}", dump::SNAPSHOT_SUFFIX, format.extension()))
    })
}

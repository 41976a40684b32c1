//! Input document loading from disk.

use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::config::DocumentFormat;
use crate::error::{Error, Result};

/// Read and parse the document at `path` into an untyped tree
pub fn load_document(path: &Path) -> Result<(Value, DocumentFormat)> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound(path.to_path_buf())
        } else {
            Error::Parse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        }
    })?;

    let format = DocumentFormat::from_path(path);
    debug!("Parsing {} as {:?}", path.display(), format);
    let tree = parse_document(&content, format).map_err(|reason| Error::Parse {
        path: path.to_path_buf(),
        reason,
    })?;
    Ok((tree, format))
}

/// Parse document text; the top level must be a mapping
pub fn parse_document(content: &str, format: DocumentFormat) -> std::result::Result<Value, String> {
    let tree: Value = match format {
        DocumentFormat::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string())?,
        DocumentFormat::Toml => toml::from_str(content).map_err(|e| e.to_string())?,
    };

    match tree {
        Value::Object(_) => Ok(tree),
        Value::Null => Err("document is empty".to_string()),
        _ => Err("top level must be a mapping".to_string()),
    }
}

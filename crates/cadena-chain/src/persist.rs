//! Chain-file persistence.
//!
//! The accepted chain is kept as a single canonical-v1 JSON file at a
//! configured path. Writes are atomic: the document goes to
//! `<path>.tmp` first and is then renamed over the target, so a crash
//! mid-write never leaves a truncated chain file behind.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::schema::{chain_to_json, parse_chain_value, ChainSpec};
use crate::validate::{validate_chain_spec, ValidationError};

/// Errors from reading or writing the chain file.
#[derive(Debug, Error)]
pub enum PersistError {
    /// Parent directory creation failed.
    #[error("failed to create directory '{path}': {source}")]
    CreateDir {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Writing the temp file failed.
    #[error("failed to write '{path}': {source}")]
    Write {
        /// Temp file path that could not be written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Renaming the temp file over the target failed.
    #[error("failed to replace '{path}': {source}")]
    Rename {
        /// Target path that could not be replaced.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Reading the chain file failed.
    #[error("failed to read '{path}': {source}")]
    Read {
        /// Path that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The chain file was not valid JSON.
    #[error("chain file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The chain file parsed but failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Atomically write `spec` as canonical JSON to `path`.
///
/// Creates parent directories as needed, writes `<path>.tmp`, then
/// renames it over `path`.
pub fn persist_chain(path: &Path, spec: &ChainSpec) -> Result<(), PersistError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|source| PersistError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let doc = chain_to_json(spec);
    let mut text = serde_json::to_string_pretty(&doc)?;
    text.push('\n');

    fs::write(&tmp, text).map_err(|source| PersistError::Write { path: tmp.clone(), source })?;
    fs::rename(&tmp, path).map_err(|source| PersistError::Rename {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Load, parse and validate a persisted chain file.
pub fn load_chain_file(path: &Path) -> Result<ChainSpec, PersistError> {
    let text = fs::read_to_string(path).map_err(|source| PersistError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let doc: serde_json::Value = serde_json::from_str(&text)?;
    let spec = parse_chain_value(&doc)?;
    Ok(validate_chain_spec(spec)?)
}

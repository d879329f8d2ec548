//! Neural amp model collaborator interface.
//!
//! The engine treats amp models as opaque block processors behind the
//! [`AmpModel`] trait; inference backends plug in through a
//! [`ModelLoader`]. The builder calls the loader off the audio thread,
//! prewarm included, so `process` is the only thing the realtime path
//! ever touches.
//!
//! [`NamFileLoader`] handles the `.nam` container format: it validates
//! the JSON envelope and extracts the metadata the engine consumes
//! (expected sample rate, training input level). Actual inference is a
//! backend concern; a build without one reports
//! [`ModelLoadError::UnsupportedArchitecture`] so the control client
//! sees exactly why a model cannot run on this rig.

use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

/// A model invocation failed; the calling node degrades to passthrough
/// for the block.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("amp model processing failed")]
pub struct ModelProcessError;

/// Errors from loading a model file.
#[derive(Debug, Error)]
pub enum ModelLoadError {
    /// File could not be read.
    #[error("failed to read model file '{path}': {source}")]
    Read {
        /// Path of the model file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// File was not a valid JSON container.
    #[error("model file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Container parsed but lacked a required field.
    #[error("model file missing field '{0}'")]
    MissingField(&'static str),

    /// No registered backend can run this architecture.
    #[error("unsupported model architecture '{0}'")]
    UnsupportedArchitecture(String),

    /// Backend-specific failure.
    #[error("model backend error: {0}")]
    Backend(String),
}

/// An opaque, realtime-ready amp model.
///
/// `process` runs on the audio thread and must be allocation-free and
/// lock-free; failures are reported by value, never by panic.
pub trait AmpModel: Send {
    /// Reset internal state and prewarm for the given stream shape.
    /// Called once at build time, off the audio thread.
    fn reset_and_prewarm(&mut self, sample_rate: u32, max_block_frames: usize);

    /// Run one block. `input` and `output` have equal length, at most
    /// the prewarmed maximum.
    fn process(&mut self, input: &[f32], output: &mut [f32]) -> Result<(), ModelProcessError>;

    /// Sample rate the model was trained at, when the file declares one.
    fn expected_sample_rate(&self) -> Option<f64> {
        None
    }

    /// Training input level in dBu, when the file declares one. Used to
    /// scale drive consistently across models.
    fn input_level_dbu(&self) -> Option<f32> {
        None
    }
}

impl std::fmt::Debug for dyn AmpModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmpModel").finish()
    }
}

/// Loads amp models from disk. Implementations may cache; `load` is
/// only ever called from control-plane threads.
pub trait ModelLoader: Send + Sync {
    /// Load and prepare the model at `path`.
    fn load(&self, path: &Path) -> Result<Box<dyn AmpModel>, ModelLoadError>;
}

/// Metadata extracted from a `.nam` container.
#[derive(Debug, Clone, PartialEq)]
pub struct NamFileInfo {
    /// Architecture tag ("WaveNet", "LSTM", ...).
    pub architecture: String,
    /// Declared sample rate, if any.
    pub sample_rate: Option<f64>,
    /// Declared training input level in dBu, if any.
    pub input_level_dbu: Option<f32>,
}

/// Parse the `.nam` JSON envelope without loading weights.
pub fn read_nam_info(path: &Path) -> Result<NamFileInfo, ModelLoadError> {
    let text = std::fs::read_to_string(path).map_err(|source| ModelLoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let doc: Value = serde_json::from_str(&text)?;

    let architecture = doc
        .get("architecture")
        .and_then(Value::as_str)
        .ok_or(ModelLoadError::MissingField("architecture"))?
        .to_string();

    let sample_rate = doc.get("sample_rate").and_then(Value::as_f64);

    let metadata = doc.get("metadata");
    let input_level_dbu = metadata
        .and_then(|m| m.get("input_level_dbu"))
        .and_then(Value::as_f64)
        .map(|v| v as f32);

    Ok(NamFileInfo {
        architecture,
        sample_rate,
        input_level_dbu,
    })
}

/// Default `.nam` loader.
///
/// Validates the container and surfaces its metadata; dispatching to an
/// inference backend happens here when one is linked in. Without one,
/// every architecture is reported as unsupported and the chain author
/// can disable the amp node to keep the rig running.
#[derive(Debug, Default)]
pub struct NamFileLoader;

impl NamFileLoader {
    /// Create the loader.
    pub fn new() -> Self {
        Self
    }
}

impl ModelLoader for NamFileLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn AmpModel>, ModelLoadError> {
        let info = read_nam_info(path)?;
        Err(ModelLoadError::UnsupportedArchitecture(info.architecture))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_nam(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("amp.nam");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn reads_envelope_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_nam(
            &dir,
            r#"{"version": "0.5.4", "architecture": "WaveNet",
                "sample_rate": 48000.0, "config": {}, "weights": [],
                "metadata": {"input_level_dbu": 18.5}}"#,
        );

        let info = read_nam_info(&path).unwrap();
        assert_eq!(info.architecture, "WaveNet");
        assert_eq!(info.sample_rate, Some(48000.0));
        assert_eq!(info.input_level_dbu, Some(18.5));
    }

    #[test]
    fn metadata_fields_are_optional() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_nam(&dir, r#"{"architecture": "LSTM", "weights": []}"#);

        let info = read_nam_info(&path).unwrap();
        assert_eq!(info.sample_rate, None);
        assert_eq!(info.input_level_dbu, None);
    }

    #[test]
    fn rejects_missing_architecture() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_nam(&dir, r#"{"weights": []}"#);
        assert!(matches!(
            read_nam_info(&path).unwrap_err(),
            ModelLoadError::MissingField("architecture")
        ));
    }

    #[test]
    fn rejects_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_nam(&dir, "not json at all");
        assert!(matches!(
            read_nam_info(&path).unwrap_err(),
            ModelLoadError::Json(_)
        ));
    }

    #[test]
    fn default_loader_reports_unsupported_architecture() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_nam(&dir, r#"{"architecture": "WaveNet", "weights": []}"#);
        let err = NamFileLoader::new().load(&path).unwrap_err();
        assert!(matches!(
            err,
            ModelLoadError::UnsupportedArchitecture(a) if a == "WaveNet"
        ));
    }

    #[test]
    fn missing_file_reports_read_error() {
        let err = read_nam_info(Path::new("/nonexistent/amp.nam")).unwrap_err();
        assert!(matches!(err, ModelLoadError::Read { .. }));
    }
}

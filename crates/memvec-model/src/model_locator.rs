//! Model locator for runtime path resolution.
//!
//! Embedding models are disk-based assets installed next to memvec, never
//! downloaded at runtime.
//!
//! # Search Order
//!
//! 1. **Environment override**: `$MEMVEC_MODELS_DIR`
//! 2. **User directory**: `~/.memvec/models`
//! 3. **Binary-relative**: `{exe_dir}/models`
//!
//! # Model Layout
//!
//! ```text
//! {models_dir}/
//!   embeddings/
//!     all-MiniLM-L6-v2/
//!       config.json
//!       model.safetensors
//!       tokenizer.json
//! ```

use std::env;
use std::path::{Path, PathBuf};

use crate::error::{ModelError, ModelResult};

/// Environment variable for overriding the models directory.
pub const MEMVEC_MODELS_DIR_ENV: &str = "MEMVEC_MODELS_DIR";

/// Embedding models live under this subdirectory of the models directory.
pub const EMBEDDINGS_SUBDIR: &str = "embeddings";

/// Default embedding model name (short form).
pub const DEFAULT_EMBEDDING_MODEL_NAME: &str = "all-MiniLM-L6-v2";

/// Required files for a valid model directory.
pub const REQUIRED_MODEL_FILES: &[&str] = &["config.json", "model.safetensors", "tokenizer.json"];

// ============================================================================
// ModelLocator
// ============================================================================

/// Locates model files at runtime using a defined search order.
#[derive(Debug, Clone, Default)]
pub struct ModelLocator {
    base_dir: Option<PathBuf>,
}

impl ModelLocator {
    /// Create a locator that uses the default search order.
    pub fn new() -> Self {
        Self { base_dir: None }
    }

    /// Create a locator with a fixed base directory.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    /// Resolve the base models directory.
    ///
    /// Returns the first search location that exists.
    pub fn resolve_base_dir(&self) -> ModelResult<PathBuf> {
        if let Some(ref base) = self.base_dir {
            if base.is_dir() {
                return Ok(base.clone());
            }
            return Err(ModelError::ModelsDirectoryNotFound {
                searched: vec![base.clone()],
            });
        }

        let mut searched = Vec::new();

        if let Ok(env_path) = env::var(MEMVEC_MODELS_DIR_ENV) {
            let path = PathBuf::from(&env_path);
            if path.is_dir() {
                return Ok(path);
            }
            searched.push(path);
        }

        if let Some(home) = dirs::home_dir() {
            let path = home.join(".memvec").join("models");
            if path.is_dir() {
                return Ok(path);
            }
            searched.push(path);
        }

        if let Ok(exe_path) = env::current_exe() {
            if let Some(exe_dir) = exe_path.parent() {
                let path = exe_dir.join("models");
                if path.is_dir() {
                    return Ok(path);
                }
                searched.push(path);
            }
        }

        Err(ModelError::ModelsDirectoryNotFound { searched })
    }

    /// Resolve the path to a specific embedding model.
    ///
    /// Accepts a full model ID ("sentence-transformers/all-MiniLM-L6-v2") or
    /// the short name ("all-MiniLM-L6-v2"). Tries, in order,
    /// `{base}/embeddings/{name}`, `{base}/{model_id}` and `{base}/{name}`.
    pub fn embedding_model_path(&self, model_id: &str) -> ModelResult<PathBuf> {
        let base = self.resolve_base_dir()?;
        let model_name = extract_model_name(model_id);

        let candidates = [
            base.join(EMBEDDINGS_SUBDIR).join(model_name),
            base.join(model_id),
            base.join(model_name),
        ];

        for path in &candidates {
            if is_valid_model_dir(path) {
                return Ok(path.clone());
            }
        }

        Err(ModelError::ModelNotFound {
            model_id: model_id.to_string(),
            path: candidates[0].clone(),
        })
    }

    /// Check if the default embedding model is installed.
    pub fn has_default_embedding_model(&self) -> bool {
        self.embedding_model_path(DEFAULT_EMBEDDING_MODEL_NAME)
            .map(|path| self.validate_model_dir(&path).is_ok())
            .unwrap_or(false)
    }

    /// Validate that a model directory contains all required files.
    pub fn validate_model_dir(&self, path: &Path) -> ModelResult<()> {
        if !path.exists() {
            return Err(ModelError::ModelNotFound {
                model_id: path.display().to_string(),
                path: path.to_path_buf(),
            });
        }

        let missing: Vec<&'static str> = REQUIRED_MODEL_FILES
            .iter()
            .copied()
            .filter(|file| !path.join(file).exists())
            .collect();

        if !missing.is_empty() {
            return Err(ModelError::IncompleteModelFiles {
                path: path.to_path_buf(),
                missing,
            });
        }

        Ok(())
    }
}

/// Extract the model name from a full model ID.
///
/// E.g., "sentence-transformers/all-MiniLM-L6-v2" → "all-MiniLM-L6-v2"
pub(crate) fn extract_model_name(model_id: &str) -> &str {
    model_id.rsplit('/').next().unwrap_or(model_id)
}

/// A directory counts as a model directory once it has a config.json.
fn is_valid_model_dir(path: &Path) -> bool {
    path.is_dir() && path.join("config.json").exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup_model_dir(temp: &TempDir, model_name: &str) -> PathBuf {
        let model_path = temp.path().join(EMBEDDINGS_SUBDIR).join(model_name);
        fs::create_dir_all(&model_path).unwrap();
        for file in REQUIRED_MODEL_FILES {
            fs::write(model_path.join(file), "{}").unwrap();
        }
        model_path
    }

    #[test]
    fn test_extract_model_name() {
        assert_eq!(
            extract_model_name("sentence-transformers/all-MiniLM-L6-v2"),
            "all-MiniLM-L6-v2"
        );
        assert_eq!(extract_model_name("simple-model"), "simple-model");
    }

    #[test]
    fn test_embedding_model_path_full_and_short_id() {
        let temp = TempDir::new().unwrap();
        let expected = setup_model_dir(&temp, "all-MiniLM-L6-v2");
        let locator = ModelLocator::with_base_dir(temp.path());

        let full = locator
            .embedding_model_path("sentence-transformers/all-MiniLM-L6-v2")
            .unwrap();
        assert_eq!(full, expected);

        let short = locator.embedding_model_path("all-MiniLM-L6-v2").unwrap();
        assert_eq!(short, expected);
        assert!(locator.has_default_embedding_model());
    }

    #[test]
    fn test_model_not_found() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join(EMBEDDINGS_SUBDIR)).unwrap();

        let locator = ModelLocator::with_base_dir(temp.path());
        match locator.embedding_model_path("nonexistent-model") {
            Err(ModelError::ModelNotFound { model_id, .. }) => {
                assert_eq!(model_id, "nonexistent-model")
            }
            other => panic!("expected ModelNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_reports_missing_files() {
        let temp = TempDir::new().unwrap();
        let model_path = temp.path().join("partial");
        fs::create_dir_all(&model_path).unwrap();
        fs::write(model_path.join("config.json"), "{}").unwrap();

        let locator = ModelLocator::new();
        match locator.validate_model_dir(&model_path) {
            Err(ModelError::IncompleteModelFiles { missing, .. }) => {
                assert_eq!(missing, vec!["model.safetensors", "tokenizer.json"]);
            }
            other => panic!("expected IncompleteModelFiles, got {:?}", other),
        }
    }
}

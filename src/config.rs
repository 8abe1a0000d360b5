use directories::ProjectDirs;
use std::path::{Path, PathBuf};

const DB_FILE_NAME: &str = "samples.db";
const MODEL_CACHE_SUBDIR: &str = "models";

/// Where the sample database and the embedding model cache live.
///
/// The database sits in the platform data directory. Downloaded model files go to a
/// `models` subdirectory of the platform cache directory, so clearing the cache never
/// touches analyzed libraries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleSearchDirs {
    data_dir: PathBuf,
    cache_dir: PathBuf,
}

impl SampleSearchDirs {
    /// Resolves the platform directories, falling back to the working directory when
    /// no home directory is known.
    pub fn new() -> Self {
        match ProjectDirs::from("com", "samplesearch", "samplesearch") {
            Some(dirs) => Self::with_roots(dirs.data_dir(), dirs.cache_dir()),
            None => {
                let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
                Self::with_roots(&cwd, &cwd.join(".cache"))
            }
        }
    }

    pub fn with_roots(data_dir: &Path, cache_dir: &Path) -> Self {
        SampleSearchDirs {
            data_dir: data_dir.to_path_buf(),
            cache_dir: cache_dir.to_path_buf(),
        }
    }

    pub fn default_db_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn default_db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE_NAME)
    }

    /// Directory where FastEmbed downloads model files.
    pub fn model_cache_dir(&self) -> PathBuf {
        self.cache_dir.join(MODEL_CACHE_SUBDIR)
    }

    pub fn ensure_db_dir(&self) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(self.data_dir.clone())
    }

    pub fn ensure_model_cache_dir(&self) -> std::io::Result<PathBuf> {
        let models = self.model_cache_dir();
        std::fs::create_dir_all(&models)?;
        Ok(models)
    }
}

impl Default for SampleSearchDirs {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_db_path_is_inside_db_dir() {
        let dirs = SampleSearchDirs::new();
        let db_path = dirs.default_db_path();
        assert_eq!(db_path.parent(), Some(dirs.default_db_dir()));
        assert_eq!(db_path.file_name().unwrap(), "samples.db");
    }

    #[test]
    fn test_model_cache_is_separate_from_database() {
        let temp_dir = TempDir::new().unwrap();
        let dirs = SampleSearchDirs::with_roots(
            &temp_dir.path().join("data"),
            &temp_dir.path().join("cache"),
        );

        let db_dir = dirs.ensure_db_dir().unwrap();
        let models = dirs.ensure_model_cache_dir().unwrap();
        assert!(db_dir.is_dir());
        assert!(models.is_dir());
        assert_eq!(models, temp_dir.path().join("cache").join("models"));
        assert!(!dirs.default_db_path().starts_with(&models));
    }
}

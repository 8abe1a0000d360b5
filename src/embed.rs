use crate::config::SampleSearchDirs;
use crate::error::EmbedError;
use crate::traits::EmbeddingGenerator;
use anyhow::Result;
use fastembed::{
    InitOptions, InitOptionsUserDefined, TextEmbedding, TokenizerFiles, UserDefinedEmbeddingModel,
};
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::{fs, time::Instant};

/// Local embedding service using FastEmbed models.
///
/// Text queries are embedded directly. Audio files are embedded through a textual
/// description built from the file and folder names, which places both in the same
/// vector space. A dedicated audio model (e.g. a CLAP audio tower) can replace this by
/// implementing [`EmbeddingGenerator`].
pub struct LocalEmbedder {
    model: TextEmbedding,
}

impl LocalEmbedder {
    /// Creates a new embedder with the specified model or default AllMiniLML6V2.
    /// If cache_dir is provided, uses that; otherwise the `models` subdirectory of the
    /// platform cache directory.
    pub fn new(
        model_name: Option<fastembed::EmbeddingModel>,
        cache_dir: Option<PathBuf>,
    ) -> Result<Self> {
        let model_name = model_name.unwrap_or(fastembed::EmbeddingModel::AllMiniLML6V2);

        let cache_dir = match cache_dir {
            Some(dir) => dir,
            None => SampleSearchDirs::new().ensure_model_cache_dir()?,
        };

        let init_options = InitOptions::new(model_name.clone()).with_cache_dir(cache_dir);
        let model = TextEmbedding::try_new(init_options)?;

        info!("Initialized embedding model: {:?}", model_name);

        Ok(LocalEmbedder { model })
    }

    /// Creates a new embedder from a local ONNX text model.
    ///
    /// # Arguments
    /// * `onnx_model_path` - Path to the ONNX model file
    /// * `tokenizer_dir` - Directory containing tokenizer.json, config.json,
    ///   special_tokens_map.json and tokenizer_config.json
    /// * `max_length` - Optional maximum sequence length
    pub fn new_with_local_model(
        onnx_model_path: PathBuf,
        tokenizer_dir: PathBuf,
        max_length: Option<usize>,
    ) -> Result<Self> {
        let onnx_file = fs::read(&onnx_model_path).map_err(|e| {
            anyhow::anyhow!("Failed to read ONNX model from {:?}: {}", onnx_model_path, e)
        })?;

        let read_tokenizer_file = |name: &str| {
            fs::read(tokenizer_dir.join(name))
                .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", name, e))
        };
        let tokenizer_files = TokenizerFiles {
            tokenizer_file: read_tokenizer_file("tokenizer.json")?,
            config_file: read_tokenizer_file("config.json")?,
            special_tokens_map_file: read_tokenizer_file("special_tokens_map.json")?,
            tokenizer_config_file: read_tokenizer_file("tokenizer_config.json")?,
        };

        let user_defined_model = UserDefinedEmbeddingModel::new(onnx_file, tokenizer_files);

        let mut init_options = InitOptionsUserDefined::new();
        if let Some(max_len) = max_length {
            init_options = init_options.with_max_length(max_len);
        }

        let model = TextEmbedding::try_new_from_user_defined(user_defined_model, init_options)?;

        info!(
            "Initialized local embedding model from {:?} with tokenizer from {:?}",
            onnx_model_path, tokenizer_dir
        );

        Ok(LocalEmbedder { model })
    }

    /// Creates a new embedder with the default model and default cache directory.
    pub fn new_with_default_model() -> Result<Self> {
        Self::new(None, None)
    }

    /// Creates a new embedder with the default model and custom cache directory.
    pub fn new_with_cache_dir(cache_dir: PathBuf) -> Result<Self> {
        Self::new(None, Some(cache_dir))
    }

    /// Embeds a single text string and returns a normalized vector.
    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.model.embed(vec![text], None)?;
        embeddings
            .into_iter()
            .next()
            .map(|x| normalize_l2(&x))
            .ok_or_else(|| anyhow::anyhow!("Failed to get embedding"))
    }
}

impl EmbeddingGenerator for LocalEmbedder {
    fn generate_audio_embedding(&self, path: &Path) -> Result<Vec<f32>, EmbedError> {
        check_audio_file(path)?;
        let description = describe_audio_path(path);
        debug!("Embedding {:?} as {:?}", path, description);
        self.embed_text(&description)
            .map_err(|e| EmbedError::Model(format!("{e:#}")))
    }

    fn generate_text_embedding(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.embed_text(text)
            .map_err(|e| EmbedError::Model(format!("{e:#}")))
    }
}

/// Fails with [`EmbedError::Decode`] unless `path` is a readable, non-empty file.
pub fn check_audio_file(path: &Path) -> Result<(), EmbedError> {
    let decode_error = |reason: String| EmbedError::Decode {
        path: path.to_path_buf(),
        reason,
    };
    let metadata = fs::metadata(path).map_err(|e| decode_error(e.to_string()))?;
    if !metadata.is_file() {
        return Err(decode_error("not a regular file".to_string()));
    }
    if metadata.len() == 0 {
        return Err(decode_error("file is empty".to_string()));
    }
    Ok(())
}

/// Builds a search-friendly description from a sample's file and folder names.
///
/// `Drums/Kick_808-Punchy.wav` becomes `"kick 808 punchy drums"`.
pub fn describe_audio_path(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let folder = path
        .parent()
        .and_then(|p| p.file_name())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    format!("{stem} {folder}")
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalizes an embedding vector using L2 normalization.
pub fn normalize_l2(embedding: &[f32]) -> Vec<f32> {
    let norm = (embedding.iter().map(|x| x * x).sum::<f32>()).sqrt();
    if norm < 1e-5 {
        debug!("Embedding norm {} is below 1e-5, returning original embedding", norm);
        embedding.to_vec()
    } else {
        embedding.iter().map(|x| x / norm).collect()
    }
}

type InitFn<G> = Box<dyn Fn() -> Result<G> + Send + Sync>;

/// Owned, lazily constructed embedding model.
///
/// The model is built by the init closure on first use and kept until the handle is
/// dropped. A failed initialization is reported as [`EmbedError::Model`] and attempted
/// again on the next call. The handle has a single owner; share it by reference.
pub struct ModelHandle<G> {
    model: OnceLock<G>,
    init: InitFn<G>,
}

impl<G> ModelHandle<G> {
    pub fn new(init: impl Fn() -> Result<G> + Send + Sync + 'static) -> Self {
        Self {
            model: OnceLock::new(),
            init: Box::new(init),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.model.get().is_some()
    }

    /// Returns the model, initializing it on first use.
    pub fn get(&self) -> Result<&G, EmbedError> {
        if let Some(model) = self.model.get() {
            return Ok(model);
        }
        let started = Instant::now();
        let model = (self.init)().map_err(|e| {
            EmbedError::Model(format!("failed to initialize embedding model: {e:#}"))
        })?;
        info!("Embedding model initialized in {:?}", started.elapsed());
        Ok(self.model.get_or_init(|| model))
    }
}

impl ModelHandle<LocalEmbedder> {
    /// Handle for the default FastEmbed model, cached in `cache_dir` when given.
    pub fn local(cache_dir: Option<PathBuf>) -> Self {
        Self::new(move || LocalEmbedder::new(None, cache_dir.clone()))
    }
}

impl<G: EmbeddingGenerator> EmbeddingGenerator for ModelHandle<G> {
    fn generate_audio_embedding(&self, path: &Path) -> Result<Vec<f32>, EmbedError> {
        self.get()?.generate_audio_embedding(path)
    }

    fn generate_text_embedding(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.get()?.generate_text_embedding(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ConstantGenerator;

    impl EmbeddingGenerator for ConstantGenerator {
        fn generate_audio_embedding(&self, _path: &Path) -> Result<Vec<f32>, EmbedError> {
            Ok(vec![1.0, 0.0])
        }

        fn generate_text_embedding(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
            Ok(vec![0.0, 1.0])
        }
    }

    #[test]
    fn test_normalize_l2() {
        let result = normalize_l2(&[3.0, 4.0]);
        assert!((result[0] - 0.6).abs() < 1e-6);
        assert!((result[1] - 0.8).abs() < 1e-6);

        let tiny = vec![0.0, 1e-7];
        assert_eq!(normalize_l2(&tiny), tiny);
    }

    #[test]
    fn test_describe_audio_path() {
        let path = Path::new("/library/Drums/Kick_808-Punchy.wav");
        assert_eq!(describe_audio_path(path), "kick 808 punchy drums");

        assert_eq!(describe_audio_path(Path::new("snare.flac")), "snare");
    }

    #[test]
    fn test_model_handle_initializes_once() {
        let inits = Arc::new(AtomicUsize::new(0));
        let counter = inits.clone();
        let handle = ModelHandle::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(ConstantGenerator)
        });
        assert!(!handle.is_initialized());

        handle.generate_text_embedding("pad").unwrap();
        handle.generate_audio_embedding(Path::new("a.wav")).unwrap();
        assert!(handle.is_initialized());
        assert_eq!(inits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_model_handle_reports_init_failure() {
        let handle: ModelHandle<ConstantGenerator> =
            ModelHandle::new(|| Err(anyhow::anyhow!("weights missing")));

        let result = handle.generate_text_embedding("pad");
        assert!(matches!(result, Err(EmbedError::Model(msg)) if msg.contains("weights missing")));
        assert!(!handle.is_initialized());
    }

    #[test]
    fn test_new_with_local_model_invalid_paths() {
        let onnx_path = PathBuf::from("/invalid/path/model.onnx");
        let tokenizer_dir = PathBuf::from("/invalid/path/tokenizer");

        let result = LocalEmbedder::new_with_local_model(onnx_path, tokenizer_dir, None);
        assert!(result.is_err());
    }

    #[test]
    #[ignore = "downloads the embedding model"]
    fn test_audio_and_text_share_a_space() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let sample = temp_dir.path().join("dog_bark.wav");
        fs::write(&sample, b"RIFF").unwrap();

        let embedder = LocalEmbedder::new_with_default_model().expect("Failed to create embedder");
        let audio = embedder.generate_audio_embedding(&sample).unwrap();
        let text = embedder.generate_text_embedding("dog barking").unwrap();
        assert_eq!(audio.len(), text.len());
        assert!(crate::store::cosine_distance(&audio, &text) < 1.0);
    }

    #[test]
    fn test_check_audio_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let empty = temp_dir.path().join("silence.wav");
        fs::write(&empty, b"").unwrap();
        let sample = temp_dir.path().join("clap.wav");
        fs::write(&sample, b"RIFF....WAVE").unwrap();

        assert!(check_audio_file(&sample).is_ok());
        assert!(matches!(
            check_audio_file(&empty),
            Err(EmbedError::Decode { reason, .. }) if reason == "file is empty"
        ));
        assert!(matches!(
            check_audio_file(&temp_dir.path().join("missing.wav")),
            Err(EmbedError::Decode { .. })
        ));
        assert!(check_audio_file(temp_dir.path()).is_err());
    }
}

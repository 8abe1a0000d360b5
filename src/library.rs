use crate::analysis::{AnalysisDriver, AnalysisTally};
use crate::error::{AnalysisError, SearchError, StoreResult};
use crate::store::{DirectoryRemoval, EmbeddingStore};
use crate::traits::{
    DirectoryId, DirectorySummary, EmbeddingGenerator, ProgressEvent, SearchHit, StoreStats,
};
use log::info;
use std::path::Path;
use std::sync::atomic::AtomicBool;

/// An analyzed sample library: the embedding store plus the generator used to fill
/// and query it.
pub struct SampleLibrary<G: EmbeddingGenerator> {
    store: EmbeddingStore,
    generator: G,
}

impl<G: EmbeddingGenerator> SampleLibrary<G> {
    pub fn new(store: EmbeddingStore, generator: G) -> Self {
        SampleLibrary { store, generator }
    }

    pub fn store(&self) -> &EmbeddingStore {
        &self.store
    }

    /// Analyzes `root` and reports progress after every file.
    pub fn analyze(
        &mut self,
        root: &Path,
        on_progress: impl FnMut(&ProgressEvent),
    ) -> Result<AnalysisTally, AnalysisError> {
        AnalysisDriver::new(&mut self.store, &self.generator).run(root, on_progress)
    }

    /// Like [`SampleLibrary::analyze`], stopping early once `cancel` is set.
    pub fn analyze_with_cancel(
        &mut self,
        root: &Path,
        cancel: &AtomicBool,
        on_progress: impl FnMut(&ProgressEvent),
    ) -> Result<AnalysisTally, AnalysisError> {
        AnalysisDriver::new(&mut self.store, &self.generator)
            .with_cancel_flag(cancel)
            .run(root, on_progress)
    }

    /// Finds the `limit` samples closest to a text description.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, SearchError> {
        info!("Searching for: {:?} (limit {})", query, limit);
        let embedding = self.generator.generate_text_embedding(query)?;
        Ok(self.store.search(&embedding, limit)?)
    }

    pub fn delete_directory(&mut self, directory: DirectoryId) -> StoreResult<DirectoryRemoval> {
        self.store.delete_directory(directory)
    }

    pub fn list_directories(&self) -> StoreResult<Vec<DirectorySummary>> {
        self.store.list_directories()
    }

    pub fn stats(&self) -> StoreResult<StoreStats> {
        self.store.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::ModelHandle;
    use crate::error::EmbedError;
    use std::fs;
    use tempfile::TempDir;

    /// Maps a few keywords onto axes so text and file names land near each other.
    struct KeywordGenerator;

    fn keyword_vector(text: &str) -> Vec<f32> {
        let text = text.to_lowercase();
        ["kick", "snare", "pad"]
            .iter()
            .map(|k| if text.contains(k) { 1.0 } else { 0.0 })
            .chain(std::iter::once(0.1))
            .collect()
    }

    impl EmbeddingGenerator for KeywordGenerator {
        fn generate_audio_embedding(&self, path: &Path) -> Result<Vec<f32>, EmbedError> {
            let name = path.file_name().unwrap_or_default();
            Ok(keyword_vector(&name.to_string_lossy()))
        }

        fn generate_text_embedding(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
            Ok(keyword_vector(text))
        }
    }

    #[test]
    fn test_analyze_then_search_by_text() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["Kick_01.wav", "Snare_02.wav", "Pad_Warm.ogg"] {
            fs::write(temp_dir.path().join(name), b"audio").unwrap();
        }
        let store = EmbeddingStore::open_in_memory().unwrap();
        let mut library = SampleLibrary::new(store, ModelHandle::new(|| Ok(KeywordGenerator)));

        let tally = library.analyze(temp_dir.path(), |_| {}).unwrap();
        assert_eq!(tally.processed, 3);

        let hits = library.search("punchy snare", 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].path.ends_with("Snare_02.wav"));
        assert!(hits[0].similarity > hits[1].similarity);

        let directories = library.list_directories().unwrap();
        assert_eq!(directories[0].file_count, 3);

        let removal = library.delete_directory(directories[0].id).unwrap();
        assert_eq!(removal.removed_files.len(), 3);
        assert!(library.search("snare", 5).unwrap().is_empty());
        assert!(library.list_directories().unwrap().is_empty());
    }

    #[test]
    fn test_search_surfaces_generator_errors() {
        let store = EmbeddingStore::open_in_memory().unwrap();
        let generator: ModelHandle<KeywordGenerator> =
            ModelHandle::new(|| Err(anyhow::anyhow!("no model")));
        let library = SampleLibrary::new(store, generator);

        assert!(matches!(
            library.search("kick", 3),
            Err(SearchError::Embed(EmbedError::Model(_)))
        ));
    }
}

//! Directory analysis: discover audio files, embed them one by one and upsert the
//! results into the [`EmbeddingStore`].

use crate::error::{AnalysisError, StoreError};
use crate::store::EmbeddingStore;
use crate::traits::{DirectoryId, EmbeddingGenerator, ProgressEvent};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use walkdir::WalkDir;

/// Extensions picked up by [`find_audio_files`], compared case-insensitively.
pub const AUDIO_EXTENSIONS: [&str; 5] = ["wav", "mp3", "ogg", "flac", "m4a"];

pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| AUDIO_EXTENSIONS.iter().any(|a| a.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Recursively collects audio files under `root`, depth-first and sorted by name.
///
/// Entries that cannot be read are skipped with a warning.
pub fn find_audio_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry under {:?}: {}", root, e);
                continue;
            }
        };
        if entry.file_type().is_file() && is_audio_file(entry.path()) {
            files.push(entry.into_path());
        }
    }
    debug!("Found {} audio files under {:?}", files.len(), root);
    files
}

/// A file that could not be embedded or whose embedding was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedFile {
    pub path: String,
    pub reason: String,
}

/// Final accounting of an analysis run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisTally {
    pub directory_id: DirectoryId,
    pub total_files: usize,
    pub processed: usize,
    pub failed: usize,
    pub failed_files: Vec<FailedFile>,
    pub cancelled: bool,
}

impl AnalysisTally {
    fn new(directory_id: DirectoryId, total_files: usize) -> Self {
        AnalysisTally {
            directory_id,
            total_files,
            processed: 0,
            failed: 0,
            failed_files: Vec::new(),
            cancelled: false,
        }
    }

    fn analyzed(&self) -> usize {
        self.processed + self.failed
    }
}

enum FileOutcome {
    Stored,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisState {
    Idle,
    Scanning,
    Processing { analyzed: usize, total: usize },
    Done(AnalysisTally),
    Failed(String),
}

/// Runs one analysis at a time, sequentially, against a store and a generator.
pub struct AnalysisDriver<'a, G: EmbeddingGenerator> {
    store: &'a mut EmbeddingStore,
    generator: &'a G,
    cancel: Option<&'a AtomicBool>,
    state: AnalysisState,
}

impl<'a, G: EmbeddingGenerator> AnalysisDriver<'a, G> {
    pub fn new(store: &'a mut EmbeddingStore, generator: &'a G) -> Self {
        AnalysisDriver {
            store,
            generator,
            cancel: None,
            state: AnalysisState::Idle,
        }
    }

    /// Stops scheduling further files once `flag` is set. The file in flight finishes.
    pub fn with_cancel_flag(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn state(&self) -> &AnalysisState {
        &self.state
    }

    /// Analyzes every audio file under `root`, calling `on_progress` after each file.
    ///
    /// Per-file failures (decode errors, rejected embeddings, non-UTF-8 paths) are
    /// counted in the tally and do not stop the run. A missing root or a storage
    /// error aborts it.
    pub fn run(
        &mut self,
        root: &Path,
        on_progress: impl FnMut(&ProgressEvent),
    ) -> Result<AnalysisTally, AnalysisError> {
        match self.run_inner(root, on_progress) {
            Ok(tally) => {
                self.state = AnalysisState::Done(tally.clone());
                Ok(tally)
            }
            Err(e) => {
                self.state = AnalysisState::Failed(e.to_string());
                Err(e)
            }
        }
    }

    fn run_inner(
        &mut self,
        root: &Path,
        mut on_progress: impl FnMut(&ProgressEvent),
    ) -> Result<AnalysisTally, AnalysisError> {
        let root = canonical_root(root)?;
        let root_str = root
            .to_str()
            .ok_or_else(|| AnalysisError::Input {
                path: root.clone(),
                reason: "path is not valid UTF-8".to_string(),
            })?
            .to_string();
        info!("Starting analysis of: {}", root_str);

        let directory_id = self.store.register_directory(&root_str)?;

        self.state = AnalysisState::Scanning;
        let audio_files = find_audio_files(&root);
        let total_files = audio_files.len();
        info!("Found {} audio files to process", total_files);

        let mut tally = AnalysisTally::new(directory_id, total_files);
        self.state = AnalysisState::Processing {
            analyzed: 0,
            total: total_files,
        };

        for file_path in &audio_files {
            if self.cancel.is_some_and(|flag| flag.load(Ordering::SeqCst)) {
                info!(
                    "Analysis of {} cancelled after {} of {} files",
                    root_str,
                    tally.analyzed(),
                    total_files
                );
                tally.cancelled = true;
                break;
            }

            let outcome = match file_path.to_str() {
                Some(key) => self.analyze_file(directory_id, file_path, key)?,
                None => FileOutcome::Failed("path is not valid UTF-8".to_string()),
            };
            let path_str = file_path.to_string_lossy().to_string();
            match outcome {
                FileOutcome::Stored => {
                    tally.processed += 1;
                    debug!("Analyzed: {}", path_str);
                }
                FileOutcome::Failed(reason) => {
                    warn!("Failed to analyze {}: {}", path_str, reason);
                    tally.failed += 1;
                    tally.failed_files.push(FailedFile {
                        path: path_str,
                        reason,
                    });
                }
            }

            self.state = AnalysisState::Processing {
                analyzed: tally.analyzed(),
                total: total_files,
            };
            on_progress(&ProgressEvent {
                directory_id,
                analyzed_files: tally.analyzed(),
                total_files,
            });
        }

        info!(
            "Completed analysis of {} ({} succeeded, {} failed)",
            root_str, tally.processed, tally.failed
        );
        Ok(tally)
    }

    /// Embeds one file and upserts it under `directory`, keyed by `key`.
    ///
    /// Only storage failures are returned as errors. An embedding the store rejects
    /// for its shape is a failure of this file alone.
    fn analyze_file(
        &mut self,
        directory: DirectoryId,
        file_path: &Path,
        key: &str,
    ) -> Result<FileOutcome, AnalysisError> {
        let embedding = match self.generator.generate_audio_embedding(file_path) {
            Ok(embedding) => embedding,
            Err(e) => return Ok(FileOutcome::Failed(e.to_string())),
        };
        match self.store.upsert_file(directory, key, &embedding) {
            Ok(_) => Ok(FileOutcome::Stored),
            Err(e @ (StoreError::InvalidEmbedding(_) | StoreError::DimensionMismatch { .. })) => {
                Ok(FileOutcome::Failed(e.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn canonical_root(root: &Path) -> Result<PathBuf, AnalysisError> {
    let input_error = |reason: String| AnalysisError::Input {
        path: root.to_path_buf(),
        reason,
    };
    let canonical = std::fs::canonicalize(root).map_err(|e| input_error(e.to_string()))?;
    if !canonical.is_dir() {
        return Err(input_error("not a directory".to_string()));
    }
    Ok(canonical)
}

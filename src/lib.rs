//! # Sample Search
//!
//! Local "find sounds like X" search over directories of audio samples.
//!
//! ## Features
//!
//! - Recursive analysis of sample directories (`.wav .mp3 .ogg .flac .m4a`)
//! - One embedding per file, kept in a persistent SQLite-backed store
//! - Files shared by several analyzed directories survive until the last one is removed
//! - Cosine-distance nearest-neighbor search with a `[0, 1]` display similarity
//! - Pluggable embedding generator, with a local FastEmbed model by default
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use samplesearch::{EmbeddingStore, ModelHandle, SampleLibrary, SampleSearchDirs};
//! use std::path::Path;
//!
//! # fn main() -> anyhow::Result<()> {
//! let dirs = SampleSearchDirs::new();
//! dirs.ensure_db_dir()?;
//! let store = EmbeddingStore::open(&dirs.default_db_path().to_string_lossy())?;
//!
//! // The model is loaded on first use.
//! let mut library = SampleLibrary::new(store, ModelHandle::local(None));
//!
//! let tally = library.analyze(Path::new("/path/to/samples"), |progress| {
//!     println!("{}/{}", progress.analyzed_files, progress.total_files);
//! })?;
//! println!("{} analyzed, {} failed", tally.processed, tally.failed);
//!
//! for hit in library.search("warm analog pad", 10)? {
//!     println!("{:.3} {}", hit.similarity, hit.path);
//! }
//! # Ok(())
//! # }
//! ```

pub mod traits;
pub use traits::{
    DirectoryId, DirectorySummary, EmbeddingGenerator, FileId, FileRecord, ProgressEvent,
    SearchHit, StoreStats,
};

pub mod error;
pub use error::{AnalysisError, EmbedError, SearchError, StoreError};

pub mod config;
pub use config::SampleSearchDirs;

pub mod embed;
pub use embed::{LocalEmbedder, ModelHandle};

pub mod store;
pub use store::{DirectoryRemoval, EmbeddingStore};

pub mod analysis;
pub use analysis::{AnalysisDriver, AnalysisState, AnalysisTally};

pub mod library;
pub use library::SampleLibrary;

use clap::{Parser, Subcommand};
use colored::Colorize;
use samplesearch::{DirectoryId, EmbeddingStore, ModelHandle, SampleLibrary, SampleSearchDirs};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "samplesearch")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Database file path (default: platform data directory)
    #[clap(long, global = true, help = "Path to the SQLite database file.")]
    db: Option<PathBuf>,
    /// Directory used to cache embedding model files
    #[clap(long, global = true, help = "Directory where embedding models are cached.")]
    cache_dir: Option<PathBuf>,
    #[clap(flatten)]
    verbose: clap_verbosity_flag::Verbosity,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze every audio file in a directory
    Analyze {
        /// Directory to analyze recursively
        path: PathBuf,
    },
    /// Search analyzed samples by description
    Search {
        /// Search query, e.g. "dusty vinyl kick"
        query: String,
        #[clap(
            long,
            default_value = "10",
            help = "Maximum number of search results to return."
        )]
        limit: usize,
        #[clap(
            long,
            help = "Output search results in pretty format instead of json text."
        )]
        pretty: bool,
    },
    /// List analyzed directories
    Directories {
        #[clap(long, help = "Output directories in pretty format instead of json text.")]
        pretty: bool,
    },
    /// Remove an analyzed directory and the samples only it referenced
    Delete {
        /// Directory id as shown by `directories`
        id: i64,
    },
    /// Show store statistics and check consistency
    Stats,
}

fn resolve_db_path(db: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match db {
        Some(path) => Ok(path),
        None => {
            let dirs = SampleSearchDirs::new();
            dirs.ensure_db_dir()?;
            Ok(dirs.default_db_path())
        }
    }
}

fn validate_db_presence(db_path: &Path) -> anyhow::Result<()> {
    if !db_path.exists() {
        return Err(anyhow::anyhow!(
            "Database file '{}' does not exist. Please run the 'analyze' command first.",
            db_path.display()
        ));
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(cli.verbose.log_level_filter())
        .init();

    let db_path = resolve_db_path(cli.db)?;
    if !matches!(cli.command, Commands::Analyze { .. }) {
        validate_db_presence(&db_path)?;
    }
    let store = EmbeddingStore::open(&db_path.to_string_lossy())?;
    let mut library = SampleLibrary::new(store, ModelHandle::local(cli.cache_dir));

    match cli.command {
        Commands::Analyze { path } => {
            println!(
                "Analyzing samples in: {} (database: {})",
                path.display(),
                db_path.display()
            );
            let tally = library.analyze(&path, |progress| {
                let percent = if progress.total_files == 0 {
                    100
                } else {
                    progress.analyzed_files * 100 / progress.total_files
                };
                println!(
                    "Processing file {} of {} ({}%)",
                    progress.analyzed_files, progress.total_files, percent
                );
            })?;

            if !tally.failed_files.is_empty() {
                println!("{}", "Failed files:".red());
                for failed in &tally.failed_files {
                    println!(" - {}: {}", failed.path, failed.reason);
                }
            }
            println!(
                "Analysis completed for directory {}: {} analyzed, {} failed.",
                tally.directory_id,
                tally.processed.to_string().green(),
                tally.failed.to_string().red()
            );
        }
        Commands::Search {
            query,
            limit,
            pretty,
        } => {
            let hits = library.search(&query, limit)?;

            if !pretty {
                let json_output = serde_json::json!({
                    "query": query,
                    "results_count": hits.len(),
                    "results": hits,
                });
                println!("{}", serde_json::to_string_pretty(&json_output)?);
                return Ok(());
            }

            println!("Searching for: \"{}\"", query);
            if hits.is_empty() {
                println!("No results found.");
                return Ok(());
            }
            println!("{}", "-".repeat(50));
            for (i, hit) in hits.iter().enumerate() {
                let name = Path::new(&hit.path)
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| hit.path.clone());
                println!("{}. {}", i + 1, name.bold());
                println!(
                    "   Similarity: {:.3} (distance: {:.3})",
                    hit.similarity, hit.distance
                );
                println!("   {}", hit.path.dimmed());
                if hit.similarity > 0.5 {
                    println!("   {}", "✓ Good match".green());
                } else {
                    println!("   {}", "✗ Poor match".yellow());
                }
                println!("{}", "-".repeat(50));
            }
        }
        Commands::Directories { pretty } => {
            let directories = library.list_directories()?;
            if !pretty {
                println!("{}", serde_json::to_string_pretty(&directories)?);
                return Ok(());
            }
            if directories.is_empty() {
                println!("No analyzed directories.");
            }
            for directory in &directories {
                println!(
                    "[{}] {} ({} files)",
                    directory.id.to_string().cyan(),
                    directory.path,
                    directory.file_count
                );
            }
        }
        Commands::Delete { id } => {
            let removal = library.delete_directory(DirectoryId(id))?;
            if removal.directory_existed {
                println!(
                    "Deleted directory {}: {} files detached, {} removed.",
                    id,
                    removal.detached_files,
                    removal.removed_files.len()
                );
            } else {
                println!("Directory {} does not exist, nothing to delete.", id);
            }
        }
        Commands::Stats => {
            let store = library.store();
            store.verify()?;
            let stats = store.stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }
    Ok(())
}

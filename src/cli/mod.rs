use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::{
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
};

use crate::acquisition::{AcquireEvents, NowPlaying};
use crate::classifier::ImageUpload;
use crate::config;
use crate::domain::candidate::Candidate;
use crate::domain::entity::{EntityKind, IdentifiedEntity};
use crate::fetch::{FetchError, FetchProgress};
use crate::jukebox::{Jukebox, PlaybackError};
use crate::storage::cache::AudioCache;
use crate::storage::db::i64_seconds_to_local_time;

#[derive(Parser)]
#[command(name = "snaptrack")]
#[command(version = "0.1")]
#[command(about = "Plays music of the artist or figure in a photo")]
pub struct Cli {
    /// Path to the config TOML file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Identify the subject of a photo and play their music
    Identify {
        /// Image file (jpg, jpeg, png)
        image: PathBuf,
    },
    /// Play music of a known artist or figure, without a photo
    Play {
        /// Name to search for
        name: String,
        #[arg(short, long, value_enum, default_value_t = KindArg::Artist)]
        kind: KindArg,
    },
    /// Run http server for the interactive app
    Serve,
    /// Inspect the audio cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// List cached tracks
    List,
    /// Compare cache directory with its index
    Status,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum KindArg {
    Artist,
    Figure,
    Other,
}

impl From<KindArg> for EntityKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Artist => EntityKind::Artist,
            KindArg::Figure => EntityKind::Figure,
            KindArg::Other => EntityKind::Unknown,
        }
    }
}

/// Renders acquisition progress on the terminal
struct ConsoleEvents;

impl AcquireEvents for ConsoleEvents {
    fn attempting(&mut self, candidate: &Candidate) {
        println!("Trying: {}", candidate.short_title(30));
    }

    fn progress(&mut self, _candidate: &Candidate, progress: FetchProgress) {
        match progress {
            FetchProgress::Downloading {
                fraction: Some(fraction),
            } => {
                print!("\rDownloading... {}%", (fraction * 100.0) as u32);
                let _ = io::stdout().flush();
            }
            FetchProgress::Downloading { fraction: None } => {}
            FetchProgress::Finished => println!("\rDownload complete, preparing audio..."),
        }
    }

    fn skipped(&mut self, candidate: &Candidate, _reason: &FetchError) {
        println!("Skipping unavailable video: {}", candidate.title);
    }
}

pub fn init_logger(verbosity: u8) {
    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}

/// Entrypoint for CLI
pub fn run() -> anyhow::Result<()> {
    if let Ok(path) = dotenvy::dotenv() {
        // logging is not initialized yet
        eprintln!("Loaded environment from {}", path.to_string_lossy());
    }

    let cli = Cli::parse();
    init_logger(cli.verbose);

    let config_path = cli.config.to_string_lossy();
    let cfg = config::Config::load(&config_path)?;

    match &cli.command {
        Commands::Identify { image } => {
            let mut jukebox = Jukebox::from_config(&cfg)?;
            identify(&mut jukebox, image);
            interact(&mut jukebox)?;
        }

        Commands::Play { name, kind } => {
            let mut jukebox = Jukebox::from_config(&cfg)?;
            let entity = IdentifiedEntity::new(name.clone(), EntityKind::from(*kind));
            println!("Searching for music related to {}...", entity.name);
            report(jukebox.play_entity(entity, &mut ConsoleEvents));
            interact(&mut jukebox)?;
        }

        Commands::Serve => {
            println!("Starting HTTP server...");

            let jukebox = Jukebox::from_config(&cfg).context("Failed to initialize audio cache")?;
            let http_server = crate::http::server::HttpServer::new(jukebox, cfg.http);

            println!(
                "HTTP server running at http://{}:{}",
                http_server.config.bind_addr, http_server.config.port
            );
            http_server.run();
        }

        Commands::Cache { command } => {
            let cache = AudioCache::new(&cfg.cache, &cfg.fetch.audio_format)
                .context("Failed to open audio cache")?;
            match command {
                CacheCommands::List => list_cache(&cache)?,
                CacheCommands::Status => cache_status(&cache)?,
            }
        }
    }

    Ok(())
}

fn identify(jukebox: &mut Jukebox, image: &Path) {
    let upload = match ImageUpload::from_path(image) {
        Ok(upload) => upload,
        Err(e) => {
            println!("Error: {e:#}");
            return;
        }
    };

    println!("Identifying...");
    report(jukebox.identify(&upload, &mut ConsoleEvents));
}

fn report(result: Result<NowPlaying, PlaybackError>) {
    match result {
        Ok(playing) => {
            println!("🎵 Now Playing: {}", playing.candidate.title);
            println!("  file: {}", playing.path.to_string_lossy());
            println!("  cover: {}", playing.candidate.thumbnail_url);
        }
        Err(e) if e.is_warning() => {
            println!("Sorry, {e}.");
            if let Some(url) = e.remediation() {
                println!("Try opening the search directly: {url}");
            }
        }
        Err(e) => {
            println!("Error: {e}");
            if let Some(url) = e.remediation() {
                println!("If this keeps happening, open the song directly on YouTube: {url}");
            }
        }
    }
}

/// "play another" / "new search" loop until the user quits
fn interact(jukebox: &mut Jukebox) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        match jukebox.entity() {
            Some(entity) => println!(
                "\nIdentified: {}  [a] play another  [n] new search  [q] quit",
                entity.name
            ),
            None => println!("\n[n] new search  [q] quit"),
        }
        print!("> ");
        io::stdout().flush()?;

        let Some(line) = lines.next() else {
            return Ok(());
        };
        match line?.trim() {
            "a" if jukebox.entity().is_some() => report(jukebox.play_next(&mut ConsoleEvents)),
            "n" => {
                jukebox.reset();
                print!("Image path: ");
                io::stdout().flush()?;
                let Some(path) = lines.next() else {
                    return Ok(());
                };
                identify(jukebox, Path::new(path?.trim()));
            }
            "q" => return Ok(()),
            other => println!("Unknown choice {other:?}"),
        }
    }
}

fn list_cache(cache: &AudioCache) -> anyhow::Result<()> {
    let entries = cache.list_entries()?;
    println!(
        "Cache {} contains {} tracks",
        cache.dir().to_string_lossy(),
        entries.len()
    );
    for entry in &entries {
        println!(
            "  {}  {}  (stored {})",
            entry.candidate_id,
            entry.title.as_deref().unwrap_or("<unknown title>"),
            i64_seconds_to_local_time(entry.stored_at)?
        );
        println!("    - {}", entry.path.to_string_lossy());
    }
    Ok(())
}

fn cache_status(cache: &AudioCache) -> anyhow::Result<()> {
    let status = cache.status()?;
    if status.is_clean() {
        println!("Cache index matches {}", cache.dir().to_string_lossy());
        return Ok(());
    }

    for file in &status.unindexed_files {
        println!(
            "  [NOT INDEXED]  {}, found at {} (adopted on next play)",
            file.candidate_id,
            file.path.to_string_lossy()
        );
    }
    for entry in &status.missing_files {
        println!(
            "  [MISSING]  {}, previously at {} (fetched again on next play)",
            entry.candidate_id,
            entry.path.to_string_lossy()
        );
    }
    Ok(())
}

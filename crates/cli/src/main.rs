use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};

use readbox_core::config::{
    config_path, extract_options_from_config, load_config, parse_options_from_config, AppConfig,
};
use readbox_core::dedup::{match_existing_by_digest, DedupOutcome};
use readbox_core::library::UPLOADS_DIR;
use readbox_core::prelude::*;
use uuid::Uuid;

type CliResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[derive(Parser)]
#[command(name = "readbox")]
#[command(about = "Inspect EPUB and Markdown sources: metadata, contents, chapters and assets")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show metadata and table of contents
    Inspect {
        /// Input file (.epub, .md, .markdown)
        #[arg(required = true)]
        input: String,
    },

    /// Print the text of one chapter
    Chapter {
        /// Input file
        #[arg(required = true)]
        input: String,

        /// Chapter href as listed by `inspect`
        #[arg(required = true)]
        href: String,

        /// Source id used in rewritten asset URLs
        #[arg(long)]
        source_id: Option<Uuid>,
    },

    /// Extract an embedded asset by archive path
    Asset {
        /// Input file
        #[arg(required = true)]
        input: String,

        /// Archive path of the asset
        #[arg(required = true)]
        path: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Print the content digest of a file
    Hash {
        /// Input file
        #[arg(required = true)]
        input: String,
    },

    /// Check whether a file duplicates one already in a library directory
    Dedup {
        /// Input file
        #[arg(required = true)]
        input: String,

        /// Library directory to compare against
        /// (default: the owner's uploads under the storage root)
        #[arg(long)]
        library: Option<String>,

        /// Owner the library files belong to
        #[arg(long, default_value = "local")]
        owner: String,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Initialize default config file
    Init,
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Key (dot-separated path)
        key: String,
        /// Value
        value: String,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let result = match &cli.command {
        Commands::Inspect { input } => run_inspect(input, cli.json),
        Commands::Chapter { input, href, source_id } => run_chapter(input, href, *source_id, cli.json),
        Commands::Asset { input, path, output } => run_asset(input, path, output.as_deref(), cli.json),
        Commands::Hash { input } => run_hash(input, cli.json),
        Commands::Dedup { input, library, owner } => {
            run_dedup(input, library.as_deref(), owner, cli.json)
        }
        Commands::Config { action } => run_config(action, cli.json),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Gate on the extension first, then read the whole file.
fn read_source(input: &str) -> Result<(SourceKind, Vec<u8>), Box<dyn std::error::Error + Send + Sync>> {
    let kind = SourceKind::from_filename(input)?;
    let bytes = std::fs::read(input).map_err(|e| format!("{}: {}", input, e))?;
    Ok((kind, bytes))
}

fn print_toc(toc: &[FlatTocEntry]) {
    for entry in toc {
        let href = if entry.href.is_empty() { "(whole document)" } else { entry.href.as_str() };
        println!("{}{}  [{}]", "  ".repeat(entry.depth + 1), entry.title, href);
    }
}

fn run_inspect(input: &str, json: bool) -> CliResult {
    let (kind, bytes) = read_source(input)?;
    let cfg = load_config();
    let book = parse_container(&bytes, kind, &parse_options_from_config(&cfg));
    let digest = compute_digest(&bytes);
    let toc = flatten(&book.toc);

    if json {
        let info = serde_json::json!({
            "kind": kind,
            "mime_type": kind.mime_type(),
            "digest": digest,
            "size": bytes.len(),
            "metadata": book.metadata,
            "toc": toc,
        });
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!("Format: {} ({})", kind, kind.mime_type());
        if let Some(t) = &book.metadata.title {
            println!("Title: {}", t);
        }
        if let Some(a) = &book.metadata.author {
            println!("Author: {}", a);
        }
        if let Some(m) = &book.metadata.cover_mime_type {
            println!("Cover: {}", m);
        }
        println!("Digest: {}", digest);
        println!("Contents:");
        print_toc(&toc);
    }

    Ok(())
}

fn run_chapter(input: &str, href: &str, source_id: Option<Uuid>, json: bool) -> CliResult {
    let (kind, bytes) = read_source(input)?;
    let cfg = load_config();
    let source_id = source_id.unwrap_or(Uuid::nil());
    let text = extract_chapter(&bytes, kind, href, source_id, &extract_options_from_config(&cfg))?;

    if json {
        let out = serde_json::json!({ "href": href, "text": text });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{}", text);
    }
    Ok(())
}

fn run_asset(input: &str, path: &str, output: Option<&str>, json: bool) -> CliResult {
    let (kind, bytes) = read_source(input)?;
    let cfg = load_config();
    let asset = read_asset(&bytes, kind, path, &extract_options_from_config(&cfg))?;

    match output {
        Some(out) => {
            std::fs::write(out, &asset.bytes)?;
            if !json {
                println!("Wrote {} ({}, {} bytes)", out, asset.mime_type, asset.bytes.len());
            }
        }
        None if !json => {
            std::io::stdout().write_all(&asset.bytes)?;
        }
        None => {}
    }

    if json {
        let out = serde_json::json!({
            "path": path,
            "mime_type": asset.mime_type,
            "size": asset.bytes.len(),
            "output": output,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    }
    Ok(())
}

fn run_hash(input: &str, json: bool) -> CliResult {
    let bytes = std::fs::read(input).map_err(|e| format!("{}: {}", input, e))?;
    let digest = compute_digest(&bytes);
    if json {
        let out = serde_json::json!({ "path": input, "digest": digest, "size": bytes.len() });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{}  {}", digest, input);
    }
    Ok(())
}

/// Register every supported file directly under `dir` as an unhashed
/// source, so the comparison goes through the legacy backfill path.
fn scan_library(dir: &Path, owner: &str) -> Result<MemoryRepository, Box<dyn std::error::Error + Send + Sync>> {
    let mut repo = MemoryRepository::new();
    for entry in std::fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Ok(kind) = SourceKind::from_filename(name) else {
            continue;
        };
        let file_size = entry.metadata()?.len();
        repo.insert_source(SourceRecord {
            id: Uuid::new_v4(),
            owner: owner.to_string(),
            kind,
            title: None,
            author: None,
            file_path: name.to_string(),
            file_hash: None,
            file_size,
            cover_path: None,
        })?;
    }
    Ok(repo)
}

fn run_dedup(input: &str, library: Option<&str>, owner: &str, json: bool) -> CliResult {
    let bytes = std::fs::read(input).map_err(|e| format!("{}: {}", input, e))?;
    let dir = match library {
        Some(dir) => PathBuf::from(dir),
        None => {
            let key = StorageKey::from_segments(&[UPLOADS_DIR, owner])
                .ok_or_else(|| format!("Invalid owner: {}", owner))?;
            key.segments().fold(load_config().storage_root(), |p, s| p.join(s))
        }
    };
    let storage = DirStorage::new(&dir);
    // Nothing uploaded yet under the storage root means nothing to match.
    let mut repo = if library.is_none() && !dir.exists() {
        MemoryRepository::new()
    } else {
        scan_library(&dir, owner)?
    };

    let digest = compute_digest(&bytes);
    let outcome = match_existing_by_digest(&mut repo, &storage, owner, &digest, bytes.len() as u64)?;

    let existing = match &outcome {
        DedupOutcome::Duplicate(record) => Some(record.file_path.as_str()),
        DedupOutcome::Unique => None,
    };
    if json {
        let out = serde_json::json!({
            "input": input,
            "digest": digest,
            "duplicate": existing.is_some(),
            "existing": existing,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        match existing {
            Some(path) => println!("Duplicate of {}", dir.join(path).display()),
            None => println!("Unique"),
        }
    }
    Ok(())
}

fn run_config(action: &ConfigAction, json: bool) -> CliResult {
    match action {
        ConfigAction::Init => {
            let path = config_path().ok_or("Could not determine config directory")?;
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let default_cfg = AppConfig::default();
            let toml = toml::to_string_pretty(&default_cfg)?;
            std::fs::write(&path, toml)?;
            println!("Wrote default config to {}", path.display());
        }
        ConfigAction::Show => {
            let cfg = load_config();
            if json {
                println!("{}", serde_json::to_string_pretty(&cfg)?);
            } else {
                println!("{}", toml::to_string_pretty(&cfg)?);
            }
        }
        ConfigAction::Set { key, value } => {
            let path = config_path().ok_or("Could not determine config directory")?;
            let mut cfg: AppConfig = if path.exists() {
                let s = std::fs::read_to_string(&path)?;
                toml::from_str(&s).unwrap_or_else(|_| AppConfig::default())
            } else {
                AppConfig::default()
            };

            set_config_key(&mut cfg, key, value)?;

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let toml = toml::to_string_pretty(&cfg)?;
            std::fs::write(&path, toml)?;
            if !json {
                println!("Updated {}", key);
            }
        }
    }
    Ok(())
}

fn set_config_key(cfg: &mut AppConfig, key: &str, value: &str) -> CliResult {
    let parts: Vec<&str> = key.splitn(2, '.').collect();
    match parts.as_slice() {
        ["storage", "root"] => cfg.storage.root = Some(value.to_string()),
        ["assets", sub] => match *sub {
            "route" => cfg.assets.route = value.to_string(),
            "extract_cover" => cfg.assets.extract_cover = value.parse()?,
            _ => return Err(format!("Unknown key: {}", key).into()),
        },
        ["security", sub] => match *sub {
            "max_file_size_mb" => cfg.security.max_file_size_mb = Some(value.parse()?),
            "max_compression_ratio" => cfg.security.max_compression_ratio = Some(value.parse()?),
            "max_file_count" => cfg.security.max_file_count = Some(value.parse()?),
            _ => return Err(format!("Unknown key: {}", key).into()),
        },
        _ => return Err(format!("Unknown key: {}", key).into()),
    }
    Ok(())
}

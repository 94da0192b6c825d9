//! csmtctl - Command line interface for csmt
//!
//! Operates on a single-file tree database. Keys and values given as 64-char
//! hex are used as-is; anything else is hashed with BLAKE3 first.

use anyhow::Context;
use clap::{Parser, Subcommand};
use csmt::{
    check_witness, FileTreeDb, Hash, StoreConfig, Tree, UpdateWitness, VerificationWitness,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "csmtctl")]
#[command(about = "Inspect and modify a compact sparse merkle tree database")]
#[command(version)]
struct Cli {
    /// Path to the database file
    #[arg(short, long, default_value = "tree.csmt")]
    database: PathBuf,

    /// Output format (json or text)
    #[arg(short, long, default_value = "json")]
    format: OutputFormat,

    /// Store config file (defaults to the user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new database
    Init,

    /// Set a key to a value
    Set {
        key: String,
        value: String,
        /// Also print the update witness
        #[arg(short, long)]
        witness: bool,
    },

    /// Get the value at a key
    Get { key: String },

    /// Remove a key
    Delete { key: String },

    /// Print the current root hash
    Root,

    /// Print an inclusion or exclusion proof for a key
    Prove {
        key: String,
        /// Write the proof to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check a proof file against a root
    Verify {
        /// Proof file produced by `prove`
        proof: PathBuf,
        /// Root to check against (defaults to the database root)
        #[arg(short, long)]
        root: Option<String>,
    },

    /// Print the update witness for a write without applying it
    Witness { key: String, value: String },

    /// Replay an update witness file against a root
    Apply {
        /// Witness file produced by `witness` or `set --witness`
        witness: PathBuf,
        /// Root before the update (defaults to the database root)
        #[arg(short, long)]
        root: Option<String>,
    },

    /// Delete nodes no longer reachable from the root
    Prune,

    /// Rewrite the database file without dead records
    Compact,

    /// Show tree and file statistics
    Stats,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Init => {
            FileTreeDb::create_with_config(&cli.database, config)?;
            output(
                cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "message": format!("Created database at {}", cli.database.display())
                }),
            )?;
        }

        Commands::Set {
            key,
            value,
            witness,
        } => {
            let tree = open_tree(&cli.database, config)?;
            let (key, value) = (parse_hash(&key)?, parse_hash(&value)?);
            let update = tree.update(|tx| tx.set_with_witness(&key, &value))?;
            let mut result = serde_json::json!({
                "status": "ok",
                "key": key.to_hex(),
                "root": tree.hash()?.to_hex()
            });
            if witness {
                result["witness"] = serde_json::to_value(&update)?;
            }
            output(cli.format, &result)?;
        }

        Commands::Get { key } => {
            let tree = open_tree(&cli.database, config)?;
            let key = parse_hash(&key)?;
            match tree.get(&key)? {
                Some(value) => {
                    output(
                        cli.format,
                        &serde_json::json!({
                            "key": key.to_hex(),
                            "value": value.to_hex()
                        }),
                    )?;
                }
                None => {
                    output(
                        cli.format,
                        &serde_json::json!({
                            "status": "error",
                            "message": format!("Key not found: {}", key)
                        }),
                    )?;
                    std::process::exit(1);
                }
            }
        }

        Commands::Delete { key } => {
            let tree = open_tree(&cli.database, config)?;
            let key = parse_hash(&key)?;
            tree.update(|tx| tx.delete(&key))?;
            output(
                cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "key": key.to_hex(),
                    "root": tree.hash()?.to_hex()
                }),
            )?;
        }

        Commands::Root => {
            let tree = open_tree(&cli.database, config)?;
            output(
                cli.format,
                &serde_json::json!({ "root": tree.hash()?.to_hex() }),
            )?;
        }

        Commands::Prove { key, output: path } => {
            let tree = open_tree(&cli.database, config)?;
            let key = parse_hash(&key)?;
            let proof = tree.view(|tx| tx.prove(&key))?;
            match path {
                Some(path) => {
                    std::fs::write(&path, serde_json::to_string_pretty(&proof)?)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    output(
                        cli.format,
                        &serde_json::json!({
                            "status": "ok",
                            "included": !proof.is_exclusion(),
                            "proof": path.display().to_string()
                        }),
                    )?;
                }
                None => output(cli.format, &serde_json::to_value(&proof)?)?,
            }
        }

        Commands::Verify { proof, root } => {
            let proof: VerificationWitness = read_json(&proof)?;
            let root = match root {
                Some(root) => parse_root(&root)?,
                None => open_tree(&cli.database, config)?.hash()?,
            };
            let valid = check_witness(&proof, &root);
            output(
                cli.format,
                &serde_json::json!({
                    "valid": valid,
                    "key": proof.key.to_hex(),
                    "value": proof.value.to_hex(),
                    "root": root.to_hex()
                }),
            )?;
            if !valid {
                std::process::exit(1);
            }
        }

        Commands::Witness { key, value } => {
            let tree = open_tree(&cli.database, config)?;
            let (key, value) = (parse_hash(&key)?, parse_hash(&value)?);
            let witness = tree.view(|tx| tx.generate_update_witness(&key, &value))?;
            output(cli.format, &serde_json::to_value(&witness)?)?;
        }

        Commands::Apply { witness, root } => {
            let witness: UpdateWitness = read_json(&witness)?;
            let old_root = match root {
                Some(root) => parse_root(&root)?,
                None => open_tree(&cli.database, config)?.hash()?,
            };
            let new_root = witness.apply(&old_root)?;
            output(
                cli.format,
                &serde_json::json!({
                    "old_root": old_root.to_hex(),
                    "new_root": new_root.to_hex()
                }),
            )?;
        }

        Commands::Prune => {
            let tree = open_tree(&cli.database, config)?;
            let stats = tree.prune()?;
            output(
                cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "live": stats.live,
                    "removed": stats.removed
                }),
            )?;
        }

        Commands::Compact => {
            let db = FileTreeDb::open_with_config(&cli.database, config)?;
            let before = db.log_len();
            let reclaimed = db.compact()?;
            output(
                cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "bytes_before": before,
                    "bytes_after": db.log_len(),
                    "reclaimed": reclaimed
                }),
            )?;
        }

        Commands::Stats => {
            let tree = open_tree(&cli.database, config)?;
            let stats = tree.stats()?;
            output(
                cli.format,
                &serde_json::json!({
                    "database": cli.database.display().to_string(),
                    "root": tree.hash()?.to_hex(),
                    "leaves": stats.leaves,
                    "branches": stats.branches,
                    "max_depth": stats.max_depth,
                    "stored_nodes": tree.db().node_count(),
                    "file_bytes": tree.db().log_len()
                }),
            )?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<StoreConfig> {
    let config = match path {
        Some(path) => StoreConfig::load(path)?,
        None => StoreConfig::load_default()?,
    };
    Ok(config)
}

fn open_tree(path: &Path, config: StoreConfig) -> anyhow::Result<Tree<FileTreeDb>> {
    let db = FileTreeDb::open_or_create_with_config(path, config)?;
    Ok(Tree::new(db))
}

/// 64 hex chars are taken as a raw hash, anything else is hashed
fn parse_hash(input: &str) -> anyhow::Result<Hash> {
    if input.len() == 64 && input.chars().all(|c| c.is_ascii_hexdigit()) {
        return Ok(Hash::from_hex(input)?);
    }
    Ok(Hash::digest(input.as_bytes()))
}

fn parse_root(input: &str) -> anyhow::Result<Hash> {
    Hash::from_hex(input).map_err(|_| anyhow::anyhow!("Invalid root hash: {}", input))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(serde_json::from_str(&content)?)
}

fn output(format: OutputFormat, value: &serde_json::Value) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(value)?),
        OutputFormat::Text => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}

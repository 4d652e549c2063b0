//! keyctl: operator tooling for the field encryption key.
//!
//!   generate        - create a key in an empty key slot
//!   backup          - snapshot the active key into the archive
//!   verify          - recheck every snapshot's integrity digest
//!   restore         - put an archived key back into the key slot
//!   migrate         - encrypt plaintext sensitive fields in the document store
//!
//! All settings come from the environment (see `config`). Any failure exits
//! non-zero.

mod backup;
mod commands;
mod config;
mod fsutil;
mod keygen;
mod migrate;
mod prompt;
mod telemetry;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;

use fieldcrypt::crypto::FieldCipher;
use fieldcrypt::key::KeyProvider;
use fieldcrypt::record::{EntityCatalog, RecordCodec};

use backup::KeyBackupManager;
use config::Config;

#[derive(Parser, Debug)]
#[command(
    name = "keyctl",
    version,
    about = "Manage the field encryption key and its backups"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a new key (refuses if a key already exists)
    Generate,

    /// Snapshot the active key into the backup directory
    Backup,

    /// Verify the integrity of every snapshot
    Verify,

    /// Restore a snapshot into the key slot
    ///
    /// Always asks for a typed `yes`. The current key is copied to a
    /// pre-restore file in the backup directory before it is replaced.
    Restore {
        /// Snapshot file name (default: choose interactively)
        #[arg(long, short = 's')]
        snapshot: Option<String>,
    },

    /// Encrypt plaintext sensitive fields already in the document store
    Migrate {
        /// Document store JSON file (overrides DOCUMENT_STORE_PATH)
        #[arg(long)]
        store: Option<PathBuf>,
        /// Report what would change without writing
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cfg = Config::from_env().map_err(|e| {
        eprintln!("ERROR: configuration invalid: {e:#}");
        e
    })?;
    telemetry::init_telemetry(&cfg.log_level)?;

    let manager = KeyBackupManager::new(
        cfg.key_file(),
        cfg.backup_dir(),
        cfg.key_backup_retention,
    );

    match cli.command {
        Commands::Generate => cmd_generate(&cfg),
        Commands::Backup => cmd_backup(&cfg, &manager),
        Commands::Verify => commands::verify(&manager, &mut io::stdout().lock()),
        Commands::Restore { snapshot } => cmd_restore(&cfg, &manager, snapshot),
        Commands::Migrate { store, dry_run } => cmd_migrate(&cfg, store, dry_run),
    }
}

fn warn_env_override(cfg: &Config) {
    if cfg.env_key_overrides_file() {
        warn!("ENCRYPTION_KEY is set and takes precedence over the key file; this command only affects the key file");
        eprintln!(
            "warning: ENCRYPTION_KEY is set; services will keep using it instead of {}",
            cfg.encryption_key_file
        );
    }
}

fn cmd_generate(cfg: &Config) -> Result<()> {
    let key_file = cfg.key_file();
    keygen::generate(&key_file)?;
    println!("generated new key in {}", key_file.display());
    println!("run `keyctl backup` now; a lost key makes encrypted fields unreadable");
    Ok(())
}

fn cmd_backup(cfg: &Config, manager: &KeyBackupManager) -> Result<()> {
    warn_env_override(cfg);
    let outcome = manager.backup().context("backup failed")?;
    println!("snapshot written: {}", outcome.path.display());
    for name in &outcome.pruned {
        println!("pruned: {name}");
    }
    Ok(())
}

fn cmd_restore(cfg: &Config, manager: &KeyBackupManager, snapshot: Option<String>) -> Result<()> {
    warn_env_override(cfg);
    let stdin = io::stdin();
    commands::restore(manager, snapshot, &mut stdin.lock(), &mut io::stdout().lock())
}

fn cmd_migrate(cfg: &Config, store: Option<PathBuf>, dry_run: bool) -> Result<()> {
    let store_path = store.unwrap_or_else(|| cfg.store_path());
    let catalog = EntityCatalog::load_or_builtin(cfg.catalog_path().as_deref())
        .context("failed to load entity catalog")?;

    let keys = Arc::new(KeyProvider::new(cfg.key_source()));
    keys.resolve_key()
        .context("migration needs a valid encryption key")?;
    let codec = RecordCodec::new(FieldCipher::new(keys));

    let summary = migrate::migrate(&store_path, &catalog, &codec, dry_run)
        .with_context(|| format!("migration of {} failed", store_path.display()))?;

    let verb = if dry_run { "would encrypt" } else { "encrypted" };
    println!(
        "{} records scanned, {} {} values in {} records",
        summary.records, verb, summary.values_encrypted, summary.records_changed
    );
    if summary.written {
        println!("document store updated: {}", store_path.display());
    }
    Ok(())
}

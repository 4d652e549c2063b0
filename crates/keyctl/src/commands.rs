//! Bodies of the `verify` and `restore` subcommands.
//!
//! Both take their terminal as a reader/writer pair so the exit behaviour can
//! be checked without a TTY.

use std::io::{BufRead, Write};

use anyhow::{bail, Context, Result};

use crate::backup::{KeyBackupManager, SnapshotStatus};
use crate::prompt;

/// Recheck every snapshot and print one line per snapshot.
///
/// Fails on an empty archive and when any snapshot is invalid.
pub fn verify<W: Write>(manager: &KeyBackupManager, out: &mut W) -> Result<()> {
    let report = manager.verify()?;
    if report.is_empty() {
        bail!("no snapshots in {}", manager.backup_dir().display());
    }

    for check in &report.checks {
        match &check.status {
            SnapshotStatus::Valid { created_at } => writeln!(
                out,
                "ok       {}  (created {})",
                check.file_name,
                created_at.to_rfc3339()
            )?,
            SnapshotStatus::Invalid(reason) => {
                writeln!(out, "INVALID  {}  ({reason})", check.file_name)?
            }
        }
    }

    if !report.all_valid() {
        bail!(
            "{} of {} snapshots failed verification",
            report.invalid_count(),
            report.checks.len()
        );
    }
    writeln!(out, "all {} snapshots verified", report.checks.len())?;
    Ok(())
}

/// List snapshots, select one (by name or interactively), ask for a typed
/// `yes`, then restore. The key slot is not touched unless confirmed.
pub fn restore<R: BufRead, W: Write>(
    manager: &KeyBackupManager,
    snapshot: Option<String>,
    input: &mut R,
    out: &mut W,
) -> Result<()> {
    let entries = manager.list()?;
    if entries.is_empty() {
        bail!("no snapshots in {}", manager.backup_dir().display());
    }

    writeln!(out, "snapshots (newest first):")?;
    prompt::print_snapshots(out, &entries)?;

    let file_name = match snapshot {
        Some(name) => name,
        None => prompt::choose_snapshot(input, out, &entries)?,
    };

    if !prompt::confirm_restore(input, out, &file_name)? {
        bail!("restore cancelled");
    }

    let outcome = manager
        .restore(&file_name)
        .with_context(|| format!("restore of {file_name} failed; key file unchanged"))?;
    if let Some(copy) = &outcome.pre_restore_copy {
        writeln!(out, "previous key saved to {}", copy.display())?;
    }
    writeln!(
        out,
        "restored {} into {}",
        outcome.restored_from,
        manager.key_file().display()
    )?;
    writeln!(
        out,
        "restart services that read the key file to pick up the restored key"
    )?;
    Ok(())
}

//! Interactive selection and confirmation for `restore`.
//!
//! Generic over the reader and writer so the dialogue can be driven from tests.

use std::io::{BufRead, Write};

use anyhow::{bail, Context, Result};

use crate::backup::SnapshotEntry;

/// Print `entries` numbered from 1, newest first.
pub fn print_snapshots<W: Write>(out: &mut W, entries: &[SnapshotEntry]) -> Result<()> {
    for (i, entry) in entries.iter().enumerate() {
        writeln!(out, "  [{}] {}", i + 1, entry.file_name)?;
    }
    Ok(())
}

/// Ask for a snapshot index. An empty answer or anything out of range aborts;
/// there is no default choice.
pub fn choose_snapshot<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
    entries: &[SnapshotEntry],
) -> Result<String> {
    write!(out, "Snapshot to restore [1-{}]: ", entries.len())?;
    out.flush()?;

    let mut line = String::new();
    input.read_line(&mut line).context("failed to read selection")?;
    let answer = line.trim();
    if answer.is_empty() {
        bail!("no snapshot selected");
    }
    let index: usize = answer
        .parse()
        .with_context(|| format!("{answer:?} is not a snapshot number"))?;
    match index.checked_sub(1).and_then(|i| entries.get(i)) {
        Some(entry) => Ok(entry.file_name.clone()),
        None => bail!("snapshot number {index} is out of range"),
    }
}

/// Ask the operator to type `yes` to replace the active key.
pub fn confirm_restore<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
    file_name: &str,
) -> Result<bool> {
    writeln!(out, "This replaces the active encryption key with {file_name}.")?;
    writeln!(out, "The current key will be copied aside first.")?;
    write!(out, "Type 'yes' to continue: ")?;
    out.flush()?;

    let mut line = String::new();
    input.read_line(&mut line).context("failed to read confirmation")?;
    Ok(line.trim() == "yes")
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::path::PathBuf;

    use super::*;

    fn entries() -> Vec<SnapshotEntry> {
        ["key-backup-b.json", "key-backup-a.json"]
            .into_iter()
            .map(|n| SnapshotEntry {
                file_name: n.into(),
                path: PathBuf::from(n),
            })
            .collect()
    }

    #[test]
    fn lists_with_one_based_indices() {
        let mut out = Vec::new();
        print_snapshots(&mut out, &entries()).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("[1] key-backup-b.json"));
        assert!(text.contains("[2] key-backup-a.json"));
    }

    #[test]
    fn picks_by_index() {
        let mut out = Vec::new();
        let name = choose_snapshot(&mut Cursor::new("2\n"), &mut out, &entries()).unwrap();
        assert_eq!(name, "key-backup-a.json");
    }

    #[test]
    fn rejects_empty_zero_and_out_of_range() {
        for answer in ["\n", "0\n", "3\n", "latest\n", ""] {
            let mut out = Vec::new();
            assert!(
                choose_snapshot(&mut Cursor::new(answer), &mut out, &entries()).is_err(),
                "accepted {answer:?}"
            );
        }
    }

    #[test]
    fn only_exact_yes_confirms() {
        let mut out = Vec::new();
        assert!(confirm_restore(&mut Cursor::new("yes\n"), &mut out, "k").unwrap());
        for answer in ["y\n", "YES\n", "\n", "no\n"] {
            assert!(!confirm_restore(&mut Cursor::new(answer), &mut out, "k").unwrap());
        }
    }
}

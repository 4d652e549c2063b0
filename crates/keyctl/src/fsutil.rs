//! Crash-safe file replacement for key material and the document store.
//!
//! Every write goes to a uniquely named temp file in the destination
//! directory, is fsynced, and is then renamed over the destination. A crash at
//! any point leaves either the old file or the new one, never a partial file.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Mode for files holding key material.
pub const PRIVATE_FILE_MODE: u32 = 0o600;

/// Mode for directories created to hold key material.
pub const PRIVATE_DIR_MODE: u32 = 0o700;

/// Atomically replace `path` with `contents`, creating it with `mode`.
pub fn atomic_write(path: &Path, contents: &[u8], mode: u32) -> io::Result<()> {
    let tmp_path = temp_path_for(path);

    let result = write_synced(&tmp_path, contents, mode).and_then(|()| fs::rename(&tmp_path, path));
    if let Err(e) = result {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }

    sync_parent(path);
    Ok(())
}

/// Create `dir` (and parents) if missing; new directories get [`PRIVATE_DIR_MODE`].
pub fn ensure_private_dir(dir: &Path) -> io::Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(PRIVATE_DIR_MODE);
    }
    builder.create(dir)
}

/// Permission bits of an existing file, for preserving them across a rewrite.
pub fn file_mode(path: &Path) -> io::Result<u32> {
    let meta = fs::metadata(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        Ok(meta.permissions().mode() & 0o7777)
    }
    #[cfg(not(unix))]
    {
        let _ = meta;
        Ok(PRIVATE_FILE_MODE)
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let parent = path.parent().unwrap_or(Path::new("."));
    let name = path.file_name().unwrap_or_default().to_string_lossy();
    parent.join(format!(".{name}.{}.tmp", uuid::Uuid::new_v4().simple()))
}

fn write_synced(path: &Path, contents: &[u8], mode: u32) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

// Best effort: makes the rename itself durable on filesystems that need it.
fn sync_parent(path: &Path) {
    if let Some(parent) = path.parent() {
        let dir = if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        };
        if let Ok(d) = File::open(dir) {
            let _ = d.sync_all();
        }
    }
}

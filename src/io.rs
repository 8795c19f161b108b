//! Path-based load and save for the host application.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use memmap2::Mmap;
use tracing::debug;

use crate::document::{Document, OpenOptions, SaveOptions};

/// Open a file through a read-only memory map.
pub fn open_path(path: impl AsRef<Path>, options: &OpenOptions) -> Result<Document> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let len = file
        .metadata()
        .with_context(|| format!("failed to stat {}", path.display()))?
        .len();

    let document = if len == 0 {
        // Mapping a zero-length file fails on some platforms
        Document::open(std::io::empty(), options)?
    } else {
        // SAFETY: the map is read-only and dropped before returning. Another
        // process truncating the file meanwhile is outside our control.
        let map = unsafe { Mmap::map(&file) }
            .with_context(|| format!("failed to map {}", path.display()))?;
        Document::open(&map[..], options)
            .with_context(|| format!("failed to decode {}", path.display()))?
    };

    debug!(path = %path.display(), bytes = len, "opened file");
    Ok(document)
}

/// Write `document` to `path` through a temporary file and a rename, so a
/// failed save never leaves a truncated file behind. With `backup`, an
/// existing file is first copied (reflinked where the filesystem allows) to
/// `<path>.bak`. Marks the document saved on success.
pub fn save_to(
    document: &mut Document,
    path: impl AsRef<Path>,
    options: &SaveOptions,
    backup: bool,
) -> Result<()> {
    let path = path.as_ref();
    if backup && path.exists() {
        let backup_path = with_suffix(path, ".bak");
        reflink_copy::reflink_or_copy(path, &backup_path)
            .with_context(|| format!("failed to back up {}", path.display()))?;
        debug!(backup = %backup_path.display(), "wrote backup");
    }

    let tmp = with_suffix(path, ".tmp");
    let written = write_file(document, &tmp, options).and_then(|()| {
        fs::rename(&tmp, path).with_context(|| format!("failed to replace {}", path.display()))
    });
    if written.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    written?;

    document.mark_saved();
    debug!(path = %path.display(), "saved file");
    Ok(())
}

fn write_file(document: &Document, path: &Path, options: &SaveOptions) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    document.write(&mut writer, options)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

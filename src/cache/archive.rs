//! Tar packing and unpacking for cache entries
//!
//! These functions block; callers run them on the blocking pool.
//! An empty entry set produces a zero-byte file, which unpacks to nothing.

use crate::error::{TarmacError, TarmacResult};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Component, Path, PathBuf};

/// Directory names never packed into a package entry
pub const EXCLUDED_DIRS: &[&str] = &["node_modules"];

/// Keep only paths worth caching.
///
/// Drops anything inside `node_modules` and any dot-file or dot-directory,
/// at any depth. The result is sorted.
pub fn relevant_entries(files: &[PathBuf]) -> Vec<PathBuf> {
    let mut entries: Vec<PathBuf> = files
        .iter()
        .filter(|path| {
            path.components().all(|c| match c {
                Component::Normal(name) => {
                    let name = name.to_string_lossy();
                    !name.starts_with('.') && !EXCLUDED_DIRS.contains(&name.as_ref())
                }
                Component::CurDir => true,
                _ => false,
            })
        })
        .cloned()
        .collect();
    entries.sort();
    entries.dedup();
    entries
}

/// Pack `entries` (relative to `source`) into a tar at `dest`.
///
/// Symlinks are followed so the archive holds real file content.
/// Returns the archive size in bytes.
pub fn pack_files(source: &Path, entries: &[PathBuf], dest: &Path) -> TarmacResult<u64> {
    let file = File::create(dest)
        .map_err(|e| TarmacError::io(format!("creating {}", dest.display()), e))?;

    if !entries.is_empty() {
        let mut builder = tar::Builder::new(BufWriter::new(file));
        builder.follow_symlinks(true);

        for relative in entries {
            let full = source.join(relative);
            if !full.exists() {
                continue;
            }
            builder
                .append_path_with_name(&full, relative)
                .map_err(|e| pack_error(dest, relative, e))?;
        }

        finish(builder, dest)?;
    }

    archive_size(dest)
}

/// Pack whole directories (relative to `source`) into a tar at `dest`.
///
/// Symlinks are stored as links, which keeps workspace package links in
/// `node_modules` intact. Directories that do not exist are skipped.
pub fn pack_dirs(source: &Path, dirs: &[String], dest: &Path) -> TarmacResult<u64> {
    let file = File::create(dest)
        .map_err(|e| TarmacError::io(format!("creating {}", dest.display()), e))?;

    let present: Vec<&String> = dirs.iter().filter(|d| source.join(d).is_dir()).collect();
    if !present.is_empty() {
        let mut builder = tar::Builder::new(BufWriter::new(file));
        builder.follow_symlinks(false);

        for dir in present {
            builder
                .append_dir_all(dir, source.join(dir))
                .map_err(|e| pack_error(dest, Path::new(dir), e))?;
        }

        finish(builder, dest)?;
    }

    archive_size(dest)
}

/// Unpack `archive` over `dest`, overwriting files that already exist
pub fn unpack(archive: &Path, dest: &Path) -> TarmacResult<()> {
    let file = File::open(archive)
        .map_err(|e| TarmacError::io(format!("opening {}", archive.display()), e))?;
    let len = file
        .metadata()
        .map_err(|e| TarmacError::io(format!("inspecting {}", archive.display()), e))?
        .len();

    // Empty marker: a valid entry with no files
    if len == 0 {
        return Ok(());
    }

    std::fs::create_dir_all(dest)
        .map_err(|e| TarmacError::io(format!("creating {}", dest.display()), e))?;

    let mut reader = tar::Archive::new(BufReader::new(file));
    reader.set_overwrite(true);
    reader.set_preserve_mtime(true);
    reader
        .unpack(dest)
        .map_err(|e| TarmacError::corrupt_archive(archive, e))
}

fn finish<W: Write>(builder: tar::Builder<BufWriter<W>>, dest: &Path) -> TarmacResult<()> {
    let mut writer = builder
        .into_inner()
        .map_err(|e| TarmacError::corrupt_archive(dest, format!("finalizing archive: {}", e)))?;
    writer
        .flush()
        .map_err(|e| TarmacError::io(format!("writing {}", dest.display()), e))
}

fn pack_error(dest: &Path, entry: &Path, e: std::io::Error) -> TarmacError {
    TarmacError::corrupt_archive(dest, format!("adding {}: {}", entry.display(), e))
}

fn archive_size(path: &Path) -> TarmacResult<u64> {
    std::fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| TarmacError::io(format!("inspecting {}", path.display()), e))
}

//! Size-guarded archive extraction and zip packaging.

use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::DataportError;

fn archive_error(path: &Path) -> impl FnOnce(zip::result::ZipError) -> DataportError + '_ {
    move |source| DataportError::Archive {
        path: path.to_path_buf(),
        source,
    }
}

/// Sum of the uncompressed sizes of every entry in `archive_path`.
pub fn uncompressed_size(archive_path: &Path) -> Result<u64, DataportError> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(BufReader::new(file)).map_err(archive_error(archive_path))?;

    let mut total: u64 = 0;
    for index in 0..archive.len() {
        let entry = archive.by_index(index).map_err(archive_error(archive_path))?;
        total = total.saturating_add(entry.size());
    }
    Ok(total)
}

/// Extract `archive_path` into `content_dir` unless it unpacks to `limit` bytes or more.
///
/// The size check runs before anything is written. Entries are unpacked into
/// a staging directory next to `content_dir`, which then replaces any previous
/// content in one rename.
pub fn check_and_extract(
    archive_path: &Path,
    content_dir: &Path,
    limit: u64,
) -> Result<u64, DataportError> {
    let total_size = uncompressed_size(archive_path)?;
    if total_size >= limit {
        warn!(
            archive = %archive_path.display(),
            total_size,
            limit,
            "archive exceeds export size limit"
        );
        return Err(DataportError::SizeOverflow {
            path: archive_path.to_path_buf(),
            total_size,
            limit,
        });
    }

    let parent = content_dir
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    let staging = tempfile::Builder::new()
        .prefix(".staging-")
        .tempdir_in(parent)?;
    let staged_content = staging.path().join("content");

    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(BufReader::new(file)).map_err(archive_error(archive_path))?;
    archive
        .extract(&staged_content)
        .map_err(archive_error(archive_path))?;
    // An archive with no entries still yields an (empty) content directory.
    std::fs::create_dir_all(&staged_content)?;

    if content_dir.is_dir() {
        std::fs::remove_dir_all(content_dir)?;
    } else if content_dir.exists() {
        std::fs::remove_file(content_dir)?;
    }
    std::fs::rename(&staged_content, content_dir)?;

    debug!(content = %content_dir.display(), total_size, "archive extracted");
    Ok(total_size)
}

/// Zip a file or directory into `dest`.
///
/// A file becomes a single entry named after it; a directory contributes
/// every file beneath it with paths relative to the directory.
pub fn zip_path(source: &Path, dest: &Path) -> Result<PathBuf, DataportError> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut writer = ZipWriter::new(BufWriter::new(File::create(dest)?));

    if source.is_file() {
        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| DataportError::TableWrite {
                path: source.to_path_buf(),
                message: "file name is not valid UTF-8".to_string(),
            })?;
        writer
            .start_file(name.to_string(), options)
            .map_err(archive_error(dest))?;
        io::copy(&mut File::open(source)?, &mut writer)?;
    } else {
        for entry in WalkDir::new(source).sort_by_file_name() {
            let entry = entry.map_err(|walk_err| DataportError::DirectoryWalk {
                path: source.to_path_buf(),
                source: walk_err,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry_name(source, entry.path())?;
            writer.start_file(name, options).map_err(archive_error(dest))?;
            io::copy(&mut File::open(entry.path())?, &mut writer)?;
        }
    }

    writer.finish().map_err(archive_error(dest))?;
    Ok(dest.to_path_buf())
}

fn entry_name(root: &Path, path: &Path) -> Result<String, DataportError> {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let parts = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| DataportError::TableWrite {
            path: path.to_path_buf(),
            message: "file name is not valid UTF-8".to_string(),
        })?;
    Ok(parts.join("/"))
}

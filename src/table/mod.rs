//! In-memory dataset content and its on-disk physical formats.
//!
//! A [`Table`] holds the rows of a dataset in whichever shape its physical
//! format produces. Tables loaded from disk remember where they came from so
//! an upload of unchanged cached content can reuse the file directly.
//!
//! Pure file IO lives in `io_rows` (jsonl, json, text) and `io_image_folder`.

mod io_image_folder;
mod io_rows;

use std::path::{Path, PathBuf};

use serde_json::Value;

pub use io_image_folder::{read_image_folder, write_image_folder, ImagePair};
pub use io_rows::{
    from_jsonl_str, read_json, read_jsonl, read_text, write_json, write_jsonl, write_text,
};

use crate::error::DataportError;
use crate::format::PhysicalFormat;

/// Rows of a dataset, by physical shape.
#[derive(Clone, Debug, PartialEq)]
pub enum TableData {
    /// JSON values from a jsonl or json file.
    Rows(Vec<Value>),
    /// Lines of a text file.
    Lines(Vec<String>),
    /// Images with their annotations.
    Images(Vec<ImagePair>),
}

impl TableData {
    pub fn len(&self) -> usize {
        match self {
            TableData::Rows(rows) => rows.len(),
            TableData::Lines(lines) => lines.len(),
            TableData::Images(pairs) => pairs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// File a table was loaded from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableOrigin {
    pub path: PathBuf,
    pub format: PhysicalFormat,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    pub data: TableData,
    origin: Option<TableOrigin>,
}

impl Table {
    /// A table with no backing file.
    pub fn new(data: TableData) -> Self {
        Self { data, origin: None }
    }

    pub fn rows(rows: Vec<Value>) -> Self {
        Self::new(TableData::Rows(rows))
    }

    pub fn lines(lines: Vec<String>) -> Self {
        Self::new(TableData::Lines(lines))
    }

    pub fn images(pairs: Vec<ImagePair>) -> Self {
        Self::new(TableData::Images(pairs))
    }

    /// Load `path` as `format`.
    ///
    /// Image folders are scanned for image/annotation pairs. Otherwise a
    /// regular file is parsed directly and a directory is merged from every
    /// file carrying the format's extension, in path order.
    ///
    /// A directory holding exactly one such file records that file as the
    /// table's origin, so extracted cache content stays reusable.
    pub fn load(path: &Path, format: PhysicalFormat) -> Result<Self, DataportError> {
        let (data, origin) = match format {
            PhysicalFormat::ImageFolder => {
                (TableData::Images(read_image_folder(path)?), path.to_path_buf())
            }
            _ if path.is_dir() => {
                let (data, files) = merge_dir(path, format)?;
                let origin = match files.as_slice() {
                    [single] => single.clone(),
                    _ => path.to_path_buf(),
                };
                (data, origin)
            }
            _ => (read_file(path, format)?, path.to_path_buf()),
        };

        Ok(Self {
            data,
            origin: Some(TableOrigin {
                path: origin,
                format,
            }),
        })
    }

    pub fn origin(&self) -> Option<&TableOrigin> {
        self.origin.as_ref()
    }

    /// The backing path, if it can be uploaded as-is in `format`.
    ///
    /// Zipped formats accept a backing directory; the others need a file.
    pub fn reusable_file(&self, format: PhysicalFormat) -> Option<&Path> {
        let origin = self.origin.as_ref()?;
        if origin.format != format || !origin.path.exists() {
            return None;
        }
        if format.requires_zip() || origin.path.is_file() {
            Some(origin.path.as_path())
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Write the table to `path` in `format`.
    ///
    /// Image folders are written as a directory at `path`; every other format
    /// is a single file.
    pub fn write(&self, path: &Path, format: PhysicalFormat) -> Result<(), DataportError> {
        match (&self.data, format) {
            (TableData::Rows(rows), PhysicalFormat::Jsonl) => write_jsonl(path, rows),
            (TableData::Rows(rows), PhysicalFormat::Json) => write_json(path, rows),
            (TableData::Lines(lines), PhysicalFormat::Text) => write_text(path, lines),
            (TableData::Images(pairs), PhysicalFormat::ImageFolder) => {
                write_image_folder(path, pairs)
            }
            (data, format) => Err(DataportError::TableWrite {
                path: path.to_path_buf(),
                message: format!("{} content cannot be written as {format}", data_kind(data)),
            }),
        }
    }
}

fn data_kind(data: &TableData) -> &'static str {
    match data {
        TableData::Rows(_) => "row",
        TableData::Lines(_) => "text",
        TableData::Images(_) => "image",
    }
}

fn read_file(path: &Path, format: PhysicalFormat) -> Result<TableData, DataportError> {
    match format {
        PhysicalFormat::Jsonl => Ok(TableData::Rows(read_jsonl(path)?)),
        PhysicalFormat::Json => Ok(TableData::Rows(read_json(path)?)),
        PhysicalFormat::Text => Ok(TableData::Lines(read_text(path)?)),
        PhysicalFormat::ImageFolder => Ok(TableData::Images(read_image_folder(path)?)),
    }
}

/// Merge every file of `format` under `dir`, returning the data and the files read.
fn merge_dir(
    dir: &Path,
    format: PhysicalFormat,
) -> Result<(TableData, Vec<PathBuf>), DataportError> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(dir).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|source| DataportError::DirectoryWalk {
            path: dir.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file() && has_extension(entry.path(), format.extension()) {
            files.push(entry.into_path());
        }
    }

    let data = match format {
        PhysicalFormat::Jsonl | PhysicalFormat::Json => {
            let mut rows = Vec::new();
            for file in &files {
                if format == PhysicalFormat::Jsonl {
                    rows.extend(read_jsonl(file)?);
                } else {
                    rows.extend(read_json(file)?);
                }
            }
            TableData::Rows(rows)
        }
        PhysicalFormat::Text => {
            let mut lines = Vec::new();
            for file in &files {
                lines.extend(read_text(file)?);
            }
            TableData::Lines(lines)
        }
        PhysicalFormat::ImageFolder => TableData::Images(read_image_folder(dir)?),
    };
    Ok((data, files))
}

pub(crate) fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

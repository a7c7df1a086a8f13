//! Row-oriented formats: jsonl, json and plain text.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde_json::Value;

use crate::error::DataportError;

/// Reads one JSON value per non-blank line.
///
/// # Errors
/// Fails on the first line that is not valid JSON, naming its line number.
pub fn read_jsonl(path: &Path) -> Result<Vec<Value>, DataportError> {
    let file = File::open(path)?;
    let mut rows = Vec::new();

    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let value = serde_json::from_str(&line).map_err(|source| DataportError::JsonlParse {
            path: path.to_path_buf(),
            line: index + 1,
            source,
        })?;
        rows.push(value);
    }

    Ok(rows)
}

/// Parses jsonl content from a string.
///
/// Useful for testing without file I/O.
pub fn from_jsonl_str(content: &str) -> Result<Vec<Value>, serde_json::Error> {
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(serde_json::from_str)
        .collect()
}

/// Reads a JSON document. An array yields its elements; anything else is one row.
pub fn read_json(path: &Path) -> Result<Vec<Value>, DataportError> {
    let file = File::open(path)?;
    let value: Value =
        serde_json::from_reader(BufReader::new(file)).map_err(|source| {
            DataportError::JsonParse {
                path: path.to_path_buf(),
                source,
            }
        })?;

    Ok(match value {
        Value::Array(items) => items,
        other => vec![other],
    })
}

pub fn read_text(path: &Path) -> Result<Vec<String>, DataportError> {
    let file = File::open(path)?;
    BufReader::new(file)
        .lines()
        .collect::<Result<Vec<_>, _>>()
        .map_err(DataportError::Io)
}

pub fn write_jsonl(path: &Path, rows: &[Value]) -> Result<(), DataportError> {
    let mut writer = BufWriter::new(File::create(path)?);
    for row in rows {
        serde_json::to_writer(&mut writer, row).map_err(|source| DataportError::JsonWrite {
            path: path.to_path_buf(),
            source,
        })?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_json(path: &Path, rows: &[Value]) -> Result<(), DataportError> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, rows).map_err(|source| DataportError::JsonWrite {
        path: path.to_path_buf(),
        source,
    })
}

pub fn write_text(path: &Path, lines: &[String]) -> Result<(), DataportError> {
    let mut writer = BufWriter::new(File::create(path)?);
    for line in lines {
        writeln!(writer, "{line}")?;
    }
    writer.flush()?;
    Ok(())
}

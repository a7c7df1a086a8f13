//! Logical and physical dataset formats.
//!
//! A dataset's logical format describes the shape of its rows; the physical
//! format is how those rows are laid out on disk. The mapping between the two
//! is fixed: callers can ask for it but never override it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DataportError;

/// Semantic shape of a remote dataset's rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalFormat {
    /// Prompts only.
    Prompt,
    /// Prompt with a single response.
    PromptResponse,
    /// Prompt with several responses ranked best-first.
    PromptSortedResponses,
    /// KTO preference data.
    KtoPromptChosenRejected,
    /// DPO preference pairs.
    DpoPromptChosenRejected,
    /// Free-form text corpus.
    Text,
    /// Image paired with a prompt.
    PromptImage,
    /// Image and prompt paired with a response.
    PromptImageResponse,
}

impl LogicalFormat {
    /// Every logical format, in declaration order.
    pub const ALL: [LogicalFormat; 8] = [
        LogicalFormat::Prompt,
        LogicalFormat::PromptResponse,
        LogicalFormat::PromptSortedResponses,
        LogicalFormat::KtoPromptChosenRejected,
        LogicalFormat::DpoPromptChosenRejected,
        LogicalFormat::Text,
        LogicalFormat::PromptImage,
        LogicalFormat::PromptImageResponse,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LogicalFormat::Prompt => "prompt",
            LogicalFormat::PromptResponse => "prompt-response",
            LogicalFormat::PromptSortedResponses => "prompt-sorted-responses",
            LogicalFormat::KtoPromptChosenRejected => "kto-prompt-chosen-rejected",
            LogicalFormat::DpoPromptChosenRejected => "dpo-prompt-chosen-rejected",
            LogicalFormat::Text => "text",
            LogicalFormat::PromptImage => "prompt-image",
            LogicalFormat::PromptImageResponse => "prompt-image-response",
        }
    }

    /// Physical layout this logical format is stored as.
    pub fn physical(self) -> PhysicalFormat {
        resolve(self)
    }
}

impl fmt::Display for LogicalFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogicalFormat {
    type Err = DataportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LogicalFormat::ALL
            .into_iter()
            .find(|format| format.as_str() == s)
            .ok_or_else(|| DataportError::Config {
                message: format!("unknown dataset format '{s}'"),
            })
    }
}

/// On-disk encoding of a dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PhysicalFormat {
    /// One JSON value per line.
    Jsonl,
    /// A single JSON document.
    Json,
    /// Plain text, one row per line.
    Text,
    /// Images with same-stem `.txt` annotations, shipped as a zipped folder.
    ImageFolder,
}

impl PhysicalFormat {
    /// File extension used for single-file content (without the dot).
    pub fn extension(self) -> &'static str {
        match self {
            PhysicalFormat::Jsonl => "jsonl",
            PhysicalFormat::Json => "json",
            PhysicalFormat::Text | PhysicalFormat::ImageFolder => "txt",
        }
    }

    /// Whether uploads in this format are packaged as a zip archive.
    pub fn requires_zip(self) -> bool {
        matches!(self, PhysicalFormat::Text | PhysicalFormat::ImageFolder)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PhysicalFormat::Jsonl => "jsonl",
            PhysicalFormat::Json => "json",
            PhysicalFormat::Text => "text",
            PhysicalFormat::ImageFolder => "image-folder",
        }
    }
}

impl fmt::Display for PhysicalFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolve the physical format a logical format is stored as.
pub fn resolve(logical: LogicalFormat) -> PhysicalFormat {
    match logical {
        LogicalFormat::Prompt
        | LogicalFormat::PromptResponse
        | LogicalFormat::PromptSortedResponses
        | LogicalFormat::KtoPromptChosenRejected
        | LogicalFormat::DpoPromptChosenRejected => PhysicalFormat::Jsonl,
        LogicalFormat::Text => PhysicalFormat::Text,
        LogicalFormat::PromptImage | LogicalFormat::PromptImageResponse => {
            PhysicalFormat::ImageFolder
        }
    }
}

/// Physical formats are derived from the logical format and cannot be set.
pub fn set_physical_format(
    logical: LogicalFormat,
    requested: PhysicalFormat,
) -> Result<(), DataportError> {
    Err(DataportError::UnsupportedOperation(format!(
        "physical format of a '{logical}' dataset is fixed to '{}', cannot set '{requested}'",
        resolve(logical)
    )))
}

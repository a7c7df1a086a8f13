//! Image-folder layout: every image sits next to a same-stem `.txt` annotation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

use super::has_extension;
use crate::error::DataportError;

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "webp", "gif"];
const ANNOTATION_EXTENSION: &str = "txt";

/// An image and the text annotating it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImagePair {
    pub image_path: PathBuf,
    pub annotation: String,
}

/// Scan `dir` recursively for images with annotations, ordered by image path.
///
/// Images without a same-stem annotation are skipped with a warning.
pub fn read_image_folder(dir: &Path) -> Result<Vec<ImagePair>, DataportError> {
    if !dir.is_dir() {
        return Err(DataportError::TableParse {
            path: dir.to_path_buf(),
            message: "image folder content must be a directory".to_string(),
        });
    }

    let mut images = BTreeMap::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry.map_err(|source| DataportError::DirectoryWalk {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if entry.file_type().is_file()
            && IMAGE_EXTENSIONS.iter().any(|ext| has_extension(path, ext))
        {
            images.insert(path.to_path_buf(), path.with_extension(ANNOTATION_EXTENSION));
        }
    }

    let mut pairs = Vec::with_capacity(images.len());
    for (image_path, annotation_path) in images {
        if !annotation_path.is_file() {
            warn!(image = %image_path.display(), "image has no annotation, skipping");
            continue;
        }
        let annotation = std::fs::read_to_string(&annotation_path)?;
        pairs.push(ImagePair {
            image_path,
            annotation: annotation.trim_end_matches(['\r', '\n']).to_string(),
        });
    }

    Ok(pairs)
}

/// Collect every image and its annotation into the flat folder `dir`.
///
/// # Errors
/// Fails when two images share a file name, since they would overwrite each other.
pub fn write_image_folder(dir: &Path, pairs: &[ImagePair]) -> Result<(), DataportError> {
    std::fs::create_dir_all(dir)?;

    for pair in pairs {
        let file_name = pair
            .image_path
            .file_name()
            .ok_or_else(|| DataportError::TableWrite {
                path: pair.image_path.clone(),
                message: "image path has no file name".to_string(),
            })?;
        let target = dir.join(file_name);
        if target.exists() {
            return Err(DataportError::TableWrite {
                path: target,
                message: "duplicate image file name".to_string(),
            });
        }

        std::fs::copy(&pair.image_path, &target)?;
        std::fs::write(
            target.with_extension(ANNOTATION_EXTENSION),
            &pair.annotation,
        )?;
    }

    Ok(())
}

//! Flat-file persistence: whole-file reads, pretty JSON writes, EFL discovery.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::efl::EflOutput;
use crate::models::ExamFindingList;

/// File name suffix that marks an EFL document.
pub const EFL_FILE_SUFFIX: &str = "_efl.json";

/// File I/O errors.
#[derive(Error, Debug)]
pub enum FindingsIoError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("No EFL files found in {0}")]
    NoEflFiles(PathBuf),
}

pub type IoResult<T> = Result<T, FindingsIoError>;

/// Read a whole file as UTF-8 text.
pub fn read_text(path: &Path) -> IoResult<String> {
    fs::read_to_string(path).map_err(|source| FindingsIoError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Read and deserialize a JSON file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> IoResult<T> {
    let text = read_text(path)?;
    serde_json::from_str(&text).map_err(|source| FindingsIoError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Serialize with 2-space indentation and write in one call, creating parent
/// directories as needed.
pub fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> IoResult<()> {
    let json = serde_json::to_string_pretty(value).map_err(|source| FindingsIoError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    write_text(path, &json)
}

/// Write text in one call, creating parent directories as needed.
pub fn write_text(path: &Path, contents: &str) -> IoResult<()> {
    let write_err = |source| FindingsIoError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    fs::write(path, contents).map_err(write_err)
}

/// EFL files in `dir`, sorted by file name.
///
/// The producer names files so that this order is chronological.
pub fn discover_efl_files(dir: &Path) -> IoResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(FindingsIoError::DirectoryNotFound(dir.to_path_buf()));
    }

    let entries = fs::read_dir(dir).map_err(|source| FindingsIoError::Read {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| FindingsIoError::Read {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let is_efl = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.ends_with(EFL_FILE_SUFFIX))
            .unwrap_or(false);
        if is_efl && path.is_file() {
            files.push(path);
        }
    }

    if files.is_empty() {
        return Err(FindingsIoError::NoEflFiles(dir.to_path_buf()));
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Load every EFL document in `dir`, in file-name order.
pub fn load_efl_documents(dir: &Path) -> IoResult<Vec<ExamFindingList>> {
    let files = discover_efl_files(dir)?;
    tracing::info!("Found {} EFL files", files.len());

    files
        .iter()
        .map(|path| {
            tracing::debug!("Processing: {}", path.display());
            read_json(path)
        })
        .collect()
}

/// Write each EFL document into `dir`. Returns the written paths in order.
pub fn write_efl_documents(dir: &Path, outputs: &[EflOutput]) -> IoResult<Vec<PathBuf>> {
    fs::create_dir_all(dir).map_err(|source| FindingsIoError::Write {
        path: dir.to_path_buf(),
        source,
    })?;

    outputs
        .iter()
        .map(|output| {
            let path = dir.join(&output.file_name);
            write_json_pretty(&path, &output.document)?;
            tracing::info!(
                "Created: {} ({} findings)",
                output.file_name,
                output.document.findings.len()
            );
            Ok(path)
        })
        .collect()
}

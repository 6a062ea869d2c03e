use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("files per combination must be at least 1")]
    InvalidSubsetSize,

    /// Fewer input files than the requested subset size; nothing was written.
    #[error(
        "not enough files in the input folder to create combinations (found {found}, need {required})"
    )]
    InsufficientFiles { found: usize, required: usize },

    #[error("a combination run is already in progress")]
    RunInProgress,

    #[error("input path is not a readable directory: {}", path.display())]
    InputNotDirectory { path: PathBuf },

    #[error("failed to list input directory {}: {source}", path.display())]
    ListInput {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("failed to create output directory {}: {source}", path.display())]
    CreateOutputDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("combination {combination_index}: failed to create output unit {}: {source}", path.display())]
    CreateOutputUnit {
        combination_index: u64,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A single file of a combination could not be copied.
    #[error(
        "combination {combination_index}: failed to copy {} into {}: {source}",
        file.display(),
        destination.display()
    )]
    FileCopy {
        combination_index: u64,
        file: PathBuf,
        destination: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("combination worker panicked")]
    WorkerPanicked,
}

impl EngineError {
    /// Index of the combination the error belongs to, for per-combination failures.
    pub fn combination_index(&self) -> Option<u64> {
        match self {
            Self::CreateOutputUnit {
                combination_index, ..
            }
            | Self::FileCopy {
                combination_index, ..
            } => Some(*combination_index),
            _ => None,
        }
    }
}

//! Error type for demultiplexing runs.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for demultiplexing operations.
pub type Result<T> = std::result::Result<T, DemuxError>;

#[derive(Error, Debug)]
pub enum DemuxError {
    /// The barcode reference file could not be opened or read.
    #[error("Could not load barcode table from {path:?}: {source}")]
    TableLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A barcode line is too short for the table format (strict mode only).
    #[error("Barcode line {line} in {path:?} has {found} characters, expected at least {expected}")]
    MalformedBarcode {
        path: PathBuf,
        line: usize,
        found: usize,
        expected: usize,
    },

    /// The barcode table has no entries (strict mode only).
    #[error("Barcode table {path:?} contains no barcodes")]
    EmptyTable { path: PathBuf },

    /// A FASTQ input could not be opened.
    #[error("The file to demultiplex can't be opened: {path:?}: {source}")]
    InputOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading from an already-open FASTQ input failed.
    #[error("Failed reading {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Short write or I/O failure on an output sink. Always fatal.
    #[error("Write error on {path:?} (probably end of disk): {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The output directory could not be recreated.
    #[error("Couldn't create the output directory {path:?}: {source}")]
    DirectorySetup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DemuxError {
    /// Errors after which the rest of the run can still proceed (the affected
    /// role is skipped).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, DemuxError::InputOpen { .. } | DemuxError::TableLoad { .. })
    }
}

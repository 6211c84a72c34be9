use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{DemuxError, Result};

/// Column widths of a fixed-width barcode reference file.
///
/// Each line holds `name_len` name characters, one separator byte (never
/// inspected), then `seq_len` sequence characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarcodeFormat {
    pub name_len: usize,
    pub seq_len: usize,
}

impl BarcodeFormat {
    /// NEXTflex 6nt kit layout, e.g. `BC01,AAAAAA`.
    pub const NEXTFLEX6: BarcodeFormat = BarcodeFormat { name_len: 4, seq_len: 6 };
    /// 8-character names with 17nt sequences.
    pub const LONG17: BarcodeFormat = BarcodeFormat { name_len: 8, seq_len: 17 };

    pub fn new(name_len: usize, seq_len: usize) -> Self {
        Self { name_len, seq_len }
    }

    /// Shortest line that yields a complete entry.
    pub fn min_line_len(&self) -> usize {
        self.name_len + 1 + self.seq_len
    }
}

impl Default for BarcodeFormat {
    fn default() -> Self {
        Self::NEXTFLEX6
    }
}

/// How forgiving table loading is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadMode {
    /// Short lines become truncated entries; callers may fall back to an
    /// empty table when the file is missing.
    #[default]
    Lax,
    /// Short lines and empty tables are errors.
    Strict,
}

/// A named sample barcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Barcode {
    pub name: String,
    pub sequence: Vec<u8>,
}

impl Barcode {
    pub fn new(name: impl Into<String>, sequence: impl Into<Vec<u8>>) -> Self {
        Self { name: name.into(), sequence: sequence.into() }
    }

    /// Sequence as text, for reports.
    pub fn sequence_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.sequence)
    }
}

/// Ordered, immutable list of barcodes. Insertion order fixes both the output
/// file order and the report order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BarcodeTable {
    barcodes: Vec<Barcode>,
    format: BarcodeFormat,
}

impl BarcodeTable {
    pub fn new(barcodes: Vec<Barcode>, format: BarcodeFormat) -> Self {
        Self { barcodes, format }
    }

    /// A table with no barcodes: every read routes to Undetermined.
    pub fn empty(format: BarcodeFormat) -> Self {
        Self { barcodes: Vec::new(), format }
    }

    /// Load a table from a fixed-width reference file.
    ///
    /// Fails with [`DemuxError::TableLoad`] when the file cannot be opened or
    /// read. In [`LoadMode::Lax`] lines shorter than
    /// [`BarcodeFormat::min_line_len`] produce truncated entries rather than
    /// errors.
    pub fn from_path(path: &Path, format: BarcodeFormat, mode: LoadMode) -> Result<Self> {
        let file = File::open(path).map_err(|source| DemuxError::TableLoad {
            path: path.to_path_buf(),
            source,
        })?;

        let mut barcodes = Vec::new();
        for (idx, line) in BufReader::new(file).split(b'\n').enumerate() {
            let line = line.map_err(|source| DemuxError::TableLoad {
                path: path.to_path_buf(),
                source,
            })?;

            if mode == LoadMode::Strict && line.len() < format.min_line_len() {
                return Err(DemuxError::MalformedBarcode {
                    path: path.to_path_buf(),
                    line: idx + 1,
                    found: line.len(),
                    expected: format.min_line_len(),
                });
            }
            barcodes.push(parse_barcode_line(&line, format));
        }

        if mode == LoadMode::Strict && barcodes.is_empty() {
            return Err(DemuxError::EmptyTable { path: path.to_path_buf() });
        }

        Ok(Self { barcodes, format })
    }

    pub fn barcodes(&self) -> &[Barcode] {
        &self.barcodes
    }

    pub fn format(&self) -> BarcodeFormat {
        self.format
    }

    pub fn len(&self) -> usize {
        self.barcodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.barcodes.is_empty()
    }

    /// Index of the Undetermined slot, one past the last barcode.
    pub fn undetermined_index(&self) -> usize {
        self.barcodes.len()
    }

    /// Index of the first barcode whose sequence equals `observed`.
    ///
    /// Duplicate sequences are not detected; the earliest entry wins.
    pub fn find(&self, observed: &[u8]) -> Option<usize> {
        self.barcodes.iter().position(|bc| bc.sequence == observed)
    }
}

/// Split one reference line into name and sequence, clamping both slices to
/// the line length.
fn parse_barcode_line(line: &[u8], format: BarcodeFormat) -> Barcode {
    let name_end = format.name_len.min(line.len());
    let seq_start = (format.name_len + 1).min(line.len());
    let seq_end = (format.name_len + 1 + format.seq_len).min(line.len());

    Barcode {
        name: String::from_utf8_lossy(&line[..name_end]).into_owned(),
        sequence: line[seq_start..seq_end].to_vec(),
    }
}

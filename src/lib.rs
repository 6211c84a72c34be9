pub mod barcodes;
pub mod error;
pub mod io;
pub mod processing;
pub mod report;
pub mod router;

pub use error::{DemuxError, Result};

/// Default distance from the first space of a header to the barcode, for
/// Illumina-style headers such as `@M00123:8:000:1:1:1:1 1:N:0:ACGTAC`.
pub const DEFAULT_BARCODE_OFFSET: usize = 7;

/// Extract the sample barcode from a read header.
///
/// The barcode is the `len`-byte slice starting `offset` bytes after the
/// first space. This is a positional rule, not a parse: a header with a
/// different layout yields whatever bytes sit at that position. The slice is
/// cut short if the header ends early. Returns `None` when the header has no
/// space or ends before the offset; such reads can never match a barcode.
///
/// Headers without a space are never read at some fallback position such as
/// `header[offset - 1..]`; they always land in Undetermined.
pub fn extract_barcode_from_header(header: &[u8], offset: usize, len: usize) -> Option<&[u8]> {
    let space = header.iter().position(|&b| b == b' ')?;
    let start = space + offset;
    if start > header.len() {
        return None;
    }
    let end = (start + len).min(header.len());
    Some(&header[start..end])
}

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{DemuxError, Result};

/// Which end of the sequencing run an input belongs to. Doubles as the
/// output file suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    End1,
    End2,
}

impl Role {
    pub fn suffix(&self) -> &'static str {
        match self {
            Role::End1 => "end1",
            Role::End2 => "end2",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Output file naming convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NamingScheme {
    /// `{name}.{role}.fastq` and `Undetermined.{role}.fastq`.
    #[default]
    Dotted,
    /// `{name}.{role}fastq` as written by the old single-end tool. The
    /// Undetermined file keeps the dotted form there too.
    Legacy,
}

/// Name of the catch-all bucket.
pub const UNDETERMINED: &str = "Undetermined";

/// Path of the output file for barcode `name` (or [`UNDETERMINED`]).
pub fn output_path(out_dir: &Path, name: &str, role: Role, naming: NamingScheme, compress: bool) -> PathBuf {
    let mut fname = match naming {
        NamingScheme::Legacy if name != UNDETERMINED => format!("{}.{}fastq", name, role.suffix()),
        _ => format!("{}.{}.fastq", name, role.suffix()),
    };
    if compress {
        fname.push_str(".gz");
    }
    out_dir.join(fname)
}

/// One FASTQ record as four raw lines, newline stripped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FastqRecord {
    pub header: Vec<u8>,
    pub seq: Vec<u8>,
    pub plus: Vec<u8>,
    pub qual: Vec<u8>,
}

impl FastqRecord {
    pub fn new(header: &[u8], seq: &[u8], plus: &[u8], qual: &[u8]) -> Self {
        Self { header: header.to_vec(), seq: seq.to_vec(), plus: plus.to_vec(), qual: qual.to_vec() }
    }

    /// Total bytes written by [`FastqRecord::write_to`].
    pub fn encoded_len(&self) -> usize {
        self.header.len() + self.seq.len() + self.plus.len() + self.qual.len() + 4
    }

    /// Write the four lines, each newline-terminated, in a single call so a
    /// short write is always detected.
    pub fn write_to<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<()> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        for line in [&self.header, &self.seq, &self.plus, &self.qual] {
            buf.extend_from_slice(line);
            buf.push(b'\n');
        }
        w.write_all(&buf)
    }
}

/// Pulls whole 4-line records from a line-oriented source.
///
/// Lines are split on `\n` only. A record is produced only when all four
/// lines are available; a dangling partial record at end of input is
/// discarded.
pub struct FastqLines<R> {
    inner: R,
    path: PathBuf,
    dropped_lines: usize,
}

impl<R: BufRead> FastqLines<R> {
    pub fn new(inner: R, path: impl Into<PathBuf>) -> Self {
        Self { inner, path: path.into(), dropped_lines: 0 }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of lines of a trailing partial record thrown away at EOF.
    pub fn dropped_lines(&self) -> usize {
        self.dropped_lines
    }

    /// Read the next record into `rec`, reusing its buffers.
    ///
    /// Returns `Ok(false)` at end of input.
    pub fn read_into(&mut self, rec: &mut FastqRecord) -> Result<bool> {
        let FastqRecord { header, seq, plus, qual } = rec;
        for (n, line) in [header, seq, plus, qual].into_iter().enumerate() {
            if !self.read_line(line)? {
                self.dropped_lines = n;
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn read_line(&mut self, buf: &mut Vec<u8>) -> Result<bool> {
        buf.clear();
        let n = self.inner.read_until(b'\n', buf).map_err(|source| DemuxError::Read {
            path: self.path.clone(),
            source,
        })?;
        if n == 0 {
            return Ok(false);
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
        }
        Ok(true)
    }
}

impl<R: BufRead> Iterator for FastqLines<R> {
    type Item = Result<FastqRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut rec = FastqRecord::default();
        match self.read_into(&mut rec) {
            Ok(true) => Some(Ok(rec)),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// Open a FASTQ input, transparently decompressing `.gz` files.
pub fn open_fastq(path: &Path) -> Result<FastqLines<Box<dyn BufRead>>> {
    let file = File::open(path).map_err(|source| DemuxError::InputOpen {
        path: path.to_path_buf(),
        source,
    })?;
    let reader: Box<dyn BufRead> = if path.extension().map_or(false, |e| e == "gz") {
        Box::new(BufReader::new(MultiGzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };
    Ok(FastqLines::new(reader, path))
}

/// An output FASTQ stream, plain or gzip-compressed.
///
/// The gzip variant stays concrete so that [`FastqWriter::finish`] can write
/// the deflate trailer and report a failure instead of losing it in `Drop`.
pub enum FastqWriter {
    Plain(Box<dyn Write>),
    Gzip(GzEncoder<Box<dyn Write>>),
}

impl FastqWriter {
    /// Flush everything, writing the gzip trailer if there is one.
    pub fn finish(self) -> io::Result<()> {
        match self {
            FastqWriter::Plain(mut w) => w.flush(),
            FastqWriter::Gzip(mut enc) => {
                enc.flush()?;
                let mut inner = enc.finish()?;
                inner.flush()
            }
        }
    }
}

impl Write for FastqWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            FastqWriter::Plain(w) => w.write(buf),
            FastqWriter::Gzip(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            FastqWriter::Plain(w) => w.flush(),
            FastqWriter::Gzip(w) => w.flush(),
        }
    }
}

/// Create a writer for FASTQ output, truncating any existing file. If `path`
/// ends with `.gz`, returns a gzip-wrapped writer.
pub fn create_fastq_writer(path: &Path) -> Result<FastqWriter> {
    let file = File::create(path).map_err(|source| DemuxError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    let writer: Box<dyn Write> = Box::new(BufWriter::new(file));
    if path.extension().map_or(false, |e| e == "gz") {
        Ok(FastqWriter::Gzip(GzEncoder::new(writer, Compression::default())))
    } else {
        Ok(FastqWriter::Plain(writer))
    }
}

/// Recreate `dir` empty. Anything already inside is discarded.
pub fn prepare_output_dir(dir: &Path) -> Result<()> {
    let setup_err = |source| DemuxError::DirectorySetup { path: dir.to_path_buf(), source };
    match fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(setup_err(e)),
    }
    fs::create_dir_all(dir).map_err(setup_err)
}

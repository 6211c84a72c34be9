use std::path::{Path, PathBuf};

use crate::barcodes::BarcodeTable;
use crate::error::{DemuxError, Result};
use crate::io::{create_fastq_writer, output_path, FastqRecord, FastqWriter, NamingScheme, Role, UNDETERMINED};

/// An open output file and the path it was opened at.
struct Sink {
    path: PathBuf,
    writer: FastqWriter,
}

/// Owns one output sink per barcode plus a trailing Undetermined sink for a
/// single role. Sinks are flushed and closed when the router is finished or
/// dropped.
pub struct OutputRouter<'t> {
    table: &'t BarcodeTable,
    sinks: Vec<Sink>,
}

impl<'t> OutputRouter<'t> {
    /// Open (and truncate) every output file for `role` under `out_dir`, in
    /// table order, followed by the Undetermined file.
    pub fn open(
        table: &'t BarcodeTable,
        role: Role,
        out_dir: &Path,
        naming: NamingScheme,
        compress: bool,
    ) -> Result<Self> {
        let names = table.barcodes().iter().map(|bc| bc.name.as_str()).chain(std::iter::once(UNDETERMINED));

        let mut sinks = Vec::with_capacity(table.len() + 1);
        for name in names {
            let path = output_path(out_dir, name, role, naming, compress);
            let writer = create_fastq_writer(&path)?;
            sinks.push(Sink { path, writer });
        }
        Ok(Self { table, sinks })
    }

    #[cfg(test)]
    fn from_writers(table: &'t BarcodeTable, writers: Vec<(PathBuf, FastqWriter)>) -> Self {
        assert_eq!(writers.len(), table.len() + 1, "one writer per barcode plus Undetermined");
        let sinks = writers.into_iter().map(|(path, writer)| Sink { path, writer }).collect();
        Self { table, sinks }
    }

    /// Sink index for an extracted barcode: the first exact match, or the
    /// Undetermined index when there is none.
    pub fn route(&self, barcode: &[u8]) -> usize {
        self.table.find(barcode).unwrap_or_else(|| self.undetermined())
    }

    pub fn undetermined(&self) -> usize {
        self.table.undetermined_index()
    }

    /// Append `record` to sink `index`. Any short write is fatal to the run.
    pub fn write(&mut self, index: usize, record: &FastqRecord) -> Result<()> {
        let sink = &mut self.sinks[index];
        record.write_to(&mut sink.writer).map_err(|source| DemuxError::Write {
            path: sink.path.clone(),
            source,
        })
    }

    /// Flush every sink and close them. Gzip sinks get their trailer
    /// written here, so a full disk at the very end is still reported.
    pub fn finish(self) -> Result<()> {
        for Sink { path, writer } in self.sinks {
            writer.finish().map_err(|source| DemuxError::Write { path, source })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::barcodes::{Barcode, BarcodeFormat};
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::fs;
    use std::io::{Result as IoResult, Write};
    use std::sync::{Arc, Mutex};

    /// Appends into shared memory so tests can inspect bytes after the
    /// router owns the writer.
    struct SharedWriter(Arc<Mutex<Vec<u8>>>);
    impl Write for SharedWriter {
        fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
            let mut m = self.0.lock().unwrap();
            m.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> IoResult<()> {
            Ok(())
        }
    }

    /// Accepts only a few bytes, then reports a full disk by writing nothing.
    struct FullDisk(usize);
    impl Write for FullDisk {
        fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
            let n = buf.len().min(self.0);
            self.0 -= n;
            Ok(n)
        }
        fn flush(&mut self) -> IoResult<()> {
            Ok(())
        }
    }

    /// Accepts writes until the first flush, then reports a full disk.
    struct FullAfterFlush {
        flushed: bool,
        failed_writes: Arc<Mutex<usize>>,
    }
    impl Write for FullAfterFlush {
        fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
            if self.flushed {
                *self.failed_writes.lock().unwrap() += 1;
                return Ok(0);
            }
            Ok(buf.len())
        }
        fn flush(&mut self) -> IoResult<()> {
            self.flushed = true;
            Ok(())
        }
    }

    fn plain(w: impl Write + 'static) -> FastqWriter {
        FastqWriter::Plain(Box::new(w))
    }

    fn table() -> BarcodeTable {
        BarcodeTable::new(
            vec![Barcode::new("BC01", b"AAAAAA".to_vec()), Barcode::new("BC02", b"CCCCCC".to_vec())],
            BarcodeFormat::NEXTFLEX6,
        )
    }

    #[test]
    fn test_route_first_match_or_undetermined() {
        let table = table();
        let dir = tempfile::tempdir().unwrap();
        let router = OutputRouter::open(&table, Role::End1, dir.path(), NamingScheme::Dotted, false).unwrap();
        assert_eq!(router.route(b"AAAAAA"), 0);
        assert_eq!(router.route(b"CCCCCC"), 1);
        assert_eq!(router.route(b"GGGGGG"), 2);
        assert_eq!(router.route(b"AAAAA"), 2);
    }

    #[test]
    fn test_open_creates_and_truncates_files() {
        let table = table();
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join("BC01.end2.fastq");
        fs::write(&stale, "stale contents\n").unwrap();

        let router = OutputRouter::open(&table, Role::End2, dir.path(), NamingScheme::Dotted, false).unwrap();
        router.finish().unwrap();

        assert_eq!(fs::read(&stale).unwrap(), b"");
        assert!(dir.path().join("BC02.end2.fastq").exists());
        assert!(dir.path().join("Undetermined.end2.fastq").exists());
    }

    #[test]
    fn test_write_appends_four_lines() {
        let table = table();
        let bufs: Vec<_> = (0..3).map(|_| Arc::new(Mutex::new(Vec::new()))).collect();
        let writers = bufs
            .iter()
            .enumerate()
            .map(|(i, b)| (PathBuf::from(format!("sink{i}")), plain(SharedWriter(b.clone()))))
            .collect();
        let mut router = OutputRouter::from_writers(&table, writers);

        let rec = FastqRecord::new(b"@r1 1:N:0:CCCCCC", b"ACGT", b"+", b"IIII");
        router.write(1, &rec).unwrap();
        router.write(1, &rec).unwrap();
        router.finish().unwrap();

        assert!(bufs[0].lock().unwrap().is_empty());
        assert_eq!(
            bufs[1].lock().unwrap().as_slice(),
            b"@r1 1:N:0:CCCCCC\nACGT\n+\nIIII\n@r1 1:N:0:CCCCCC\nACGT\n+\nIIII\n"
        );
    }

    #[test]
    fn test_short_write_is_fatal() {
        let table = table();
        let writers = vec![
            (PathBuf::from("BC01.end1.fastq"), plain(FullDisk(5))),
            (PathBuf::from("BC02.end1.fastq"), plain(FullDisk(0))),
            (PathBuf::from("Undetermined.end1.fastq"), plain(FullDisk(0))),
        ];
        let mut router = OutputRouter::from_writers(&table, writers);

        let rec = FastqRecord::new(b"@r1 1:N:0:AAAAAA", b"ACGT", b"+", b"IIII");
        let err = router.write(0, &rec).unwrap_err();
        match err {
            DemuxError::Write { path, source } => {
                assert_eq!(path, PathBuf::from("BC01.end1.fastq"));
                assert_eq!(source.kind(), std::io::ErrorKind::WriteZero);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_gzip_trailer_write_failure_is_reported() {
        let table = table();
        let failed_writes = Arc::new(Mutex::new(0));
        let gz = GzEncoder::new(
            Box::new(FullAfterFlush { flushed: false, failed_writes: failed_writes.clone() }) as Box<dyn Write>,
            Compression::default(),
        );
        let writers = vec![
            (PathBuf::from("BC01.end1.fastq.gz"), FastqWriter::Gzip(gz)),
            (PathBuf::from("BC02.end1.fastq.gz"), plain(SharedWriter(Arc::new(Mutex::new(Vec::new()))))),
            (PathBuf::from("Undetermined.end1.fastq.gz"), plain(SharedWriter(Arc::new(Mutex::new(Vec::new()))))),
        ];
        let mut router = OutputRouter::from_writers(&table, writers);

        let rec = FastqRecord::new(b"@r1 1:N:0:AAAAAA", b"ACGT", b"+", b"IIII");
        router.write(0, &rec).unwrap();
        let err = router.finish().unwrap_err();

        assert!(matches!(err, DemuxError::Write { ref path, .. } if path == Path::new("BC01.end1.fastq.gz")));
        assert!(*failed_writes.lock().unwrap() > 0);
    }
}

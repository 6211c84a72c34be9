use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{info, warn};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use fastq_demux::barcodes::{BarcodeFormat, BarcodeTable, LoadMode};
use fastq_demux::io::{prepare_output_dir, NamingScheme};
use fastq_demux::processing::{DemuxConfig, DemuxMode, Demultiplexer, MISMATCH_NOTE};
use fastq_demux::report::write_metrics_tsv;
use fastq_demux::DemuxError;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "FASTQ barcode demultiplexer - splits reads into one file per sample barcode"
)]
struct Args {
    /// FASTQ file to demultiplex (end1). `.gz` inputs are decompressed.
    end1: PathBuf,

    /// Optional paired FASTQ file (end2). `-` means single-end.
    end2: Option<PathBuf>,

    /// Barcode reference file: fixed-width name, one separator, fixed-width sequence
    #[arg(short, long, default_value = "barcodes.txt")]
    barcodes: PathBuf,

    /// Barcode file layout
    #[arg(short, long, value_enum, default_value_t = FormatPreset::Nextflex6)]
    format: FormatPreset,

    /// Override the barcode name width
    #[arg(long)]
    name_len: Option<usize>,

    /// Override the barcode sequence width (also the extracted length)
    #[arg(long)]
    seq_len: Option<usize>,

    /// Distance from the first space in a header to the barcode
    #[arg(long, default_value_t = fastq_demux::DEFAULT_BARCODE_OFFSET)]
    offset: usize,

    /// Output directory. Recreated empty on every run.
    #[arg(short, long, default_value = "Demultiplexed_Reads")]
    output_dir: PathBuf,

    /// Name barcode files `{name}.{end}fastq` like the old single-end tool
    #[arg(long, default_value_t = false)]
    legacy_names: bool,

    /// Gzip output files
    #[arg(long, default_value_t = false)]
    compress: bool,

    /// Fail on a missing, empty, or malformed barcode file instead of carrying on
    #[arg(long, default_value_t = false)]
    strict: bool,

    /// Demultiplex the two ends separately, without requiring them to agree
    #[arg(long, default_value_t = false)]
    independent: bool,

    /// Number of threads (only used with --independent)
    #[arg(short, long, default_value_t = 2)]
    threads: usize,

    /// Write per-barcode counts as TSV to this file
    #[arg(long)]
    metrics: Option<PathBuf>,

    /// Hide the progress spinner
    #[arg(short, long, default_value_t = false)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FormatPreset {
    /// 4-character names, 6nt sequences
    Nextflex6,
    /// 8-character names, 17nt sequences
    Long17,
}

impl Args {
    fn barcode_format(&self) -> BarcodeFormat {
        let preset = match self.format {
            FormatPreset::Nextflex6 => BarcodeFormat::NEXTFLEX6,
            FormatPreset::Long17 => BarcodeFormat::LONG17,
        };
        BarcodeFormat::new(self.name_len.unwrap_or(preset.name_len), self.seq_len.unwrap_or(preset.seq_len))
    }

    /// Second input, if one was given and isn't the `-` placeholder.
    fn end2(&self) -> Option<&Path> {
        self.end2.as_deref().filter(|p| *p != Path::new("-"))
    }

    fn mode(&self) -> DemuxMode {
        let end1 = self.end1.clone();
        match self.end2() {
            None => DemuxMode::Single { input: end1 },
            Some(end2) if self.independent => DemuxMode::Independent { end1, end2: end2.to_path_buf() },
            Some(end2) => DemuxMode::Paired { end1, end2: end2.to_path_buf() },
        }
    }
}

/// Load the barcode table. In lax mode an unreadable file is reported and the
/// run carries on with no barcodes, so every read lands in Undetermined.
fn load_table(args: &Args) -> Result<BarcodeTable> {
    let format = args.barcode_format();
    let mode = if args.strict { LoadMode::Strict } else { LoadMode::Lax };
    match BarcodeTable::from_path(&args.barcodes, format, mode) {
        Ok(table) => {
            info!("Loaded {} barcodes from {}", table.len(), args.barcodes.display());
            Ok(table)
        }
        Err(e @ DemuxError::TableLoad { .. }) if mode == LoadMode::Lax => {
            warn!("{}; continuing without barcodes, all reads will be Undetermined", e);
            Ok(BarcodeTable::empty(format))
        }
        Err(e) => Err(e.into()),
    }
}

/// CLI entry point: load barcodes, recreate the output directory, run the
/// demultiplexer, and print one count table per end.
fn main() -> Result<()> {
    // Usage errors exit 1 like every other setup failure; --help and
    // --version keep clap's own exit.
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            let _ = e.print();
            std::process::exit(1);
        }
    };

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    rayon::ThreadPoolBuilder::new()
        .num_threads(args.threads.max(1))
        .build_global()?;

    prepare_output_dir(&args.output_dir)?;
    let table = load_table(&args)?;

    let config = DemuxConfig {
        out_dir: args.output_dir.clone(),
        offset: args.offset,
        naming: if args.legacy_names { NamingScheme::Legacy } else { NamingScheme::Dotted },
        compress: args.compress,
        show_progress: !args.quiet,
    };

    let start = std::time::Instant::now();
    let outcome = Demultiplexer::new(&table, &config).run(&args.mode())?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for report in &outcome.reports {
        report.write_to(&mut out, &table)?;
    }
    if outcome.mismatch_observed {
        writeln!(out, "{}", MISMATCH_NOTE)?;
    }
    writeln!(out, "\nFiles saved in {} directory.", args.output_dir.display())?;

    if let Some(ref path) = args.metrics {
        let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        let mut w = BufWriter::new(file);
        write_metrics_tsv(&mut w, &outcome.reports, &table)?;
        w.flush()?;
    }

    info!("Elapsed: {:.3}s", start.elapsed().as_secs_f64());
    Ok(())
}

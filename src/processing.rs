use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use std::io::BufRead;
use std::path::{Path, PathBuf};

use crate::barcodes::BarcodeTable;
use crate::error::{DemuxError, Result};
use crate::extract_barcode_from_header;
use crate::io::{open_fastq, FastqLines, FastqRecord, NamingScheme, Role};
use crate::report::{RoleReport, RunCounters};
use crate::router::OutputRouter;

/// Records between two progress updates.
pub const PROGRESS_INTERVAL: u64 = 1_000_000;

/// Printed once at the end of a paired run when any pair disagreed.
pub const MISMATCH_NOTE: &str = "Note: some pair-end reads didn't share a barcode";

/// Settings shared by every role of a run.
#[derive(Debug, Clone)]
pub struct DemuxConfig {
    pub out_dir: PathBuf,
    /// Distance from the first header space to the barcode.
    pub offset: usize,
    pub naming: NamingScheme,
    /// Gzip the output files.
    pub compress: bool,
    pub show_progress: bool,
}

impl Default for DemuxConfig {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("Demultiplexed_Reads"),
            offset: crate::DEFAULT_BARCODE_OFFSET,
            naming: NamingScheme::Dotted,
            compress: false,
            show_progress: false,
        }
    }
}

/// What a run reads and how the ends relate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DemuxMode {
    /// One input, written under the `end1` suffix.
    Single { input: PathBuf },
    /// Two inputs read in lockstep; a pair is assigned only when both
    /// headers carry the same barcode.
    Paired { end1: PathBuf, end2: PathBuf },
    /// Two inputs, each demultiplexed on its own with no agreement check.
    Independent { end1: PathBuf, end2: PathBuf },
}

/// Everything a run produced, reports in role order.
#[derive(Debug, Default)]
pub struct RunOutcome {
    pub reports: Vec<RoleReport>,
    /// Set when at least one pair had disagreeing barcodes.
    pub mismatch_observed: bool,
    /// Roles whose input could not be opened.
    pub skipped: Vec<(Role, PathBuf)>,
}

/// Drives reads from the input(s) to the per-barcode outputs.
pub struct Demultiplexer<'a> {
    table: &'a BarcodeTable,
    config: &'a DemuxConfig,
    /// Spinners of concurrently running roles share one draw target.
    progress: MultiProgress,
}

impl<'a> Demultiplexer<'a> {
    pub fn new(table: &'a BarcodeTable, config: &'a DemuxConfig) -> Self {
        Self { table, config, progress: MultiProgress::new() }
    }

    /// Run every role `mode` names.
    ///
    /// An input that cannot be opened skips its role (both roles in paired
    /// mode) and is recorded in [`RunOutcome::skipped`]. Any other error, a
    /// write failure in particular, aborts the run.
    pub fn run(&self, mode: &DemuxMode) -> Result<RunOutcome> {
        let mut outcome = RunOutcome::default();
        match mode {
            DemuxMode::Single { input } => {
                let res = self.demultiplex_single(input, Role::End1);
                self.collect(&mut outcome, Role::End1, input, res)?;
            }
            DemuxMode::Paired { end1, end2 } => match self.demultiplex_paired(end1, end2) {
                Ok((r1, r2, mismatch)) => {
                    outcome.reports.push(r1);
                    outcome.reports.push(r2);
                    outcome.mismatch_observed = mismatch;
                }
                Err(e @ DemuxError::InputOpen { .. }) => {
                    warn!("{}; skipping both ends", e);
                    outcome.skipped.push((Role::End1, end1.clone()));
                    outcome.skipped.push((Role::End2, end2.clone()));
                }
                Err(e) => return Err(e),
            },
            DemuxMode::Independent { end1, end2 } => {
                // Each side owns its router and counters; only the table is shared.
                let (res1, res2) = rayon::join(
                    || self.demultiplex_single(end1, Role::End1),
                    || self.demultiplex_single(end2, Role::End2),
                );
                self.collect(&mut outcome, Role::End1, end1, res1)?;
                self.collect(&mut outcome, Role::End2, end2, res2)?;
            }
        }
        Ok(outcome)
    }

    fn collect(&self, outcome: &mut RunOutcome, role: Role, input: &Path, res: Result<RoleReport>) -> Result<()> {
        match res {
            Ok(report) => outcome.reports.push(report),
            Err(e) if e.is_recoverable() => {
                warn!("{}; skipping {}", e, role);
                outcome.skipped.push((role, input.to_path_buf()));
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Demultiplex one input on its own.
    ///
    /// The input is opened before any output file so that an unreadable
    /// input leaves no files behind for `role`.
    pub fn demultiplex_single(&self, input: &Path, role: Role) -> Result<RoleReport> {
        let mut reader = open_fastq(input)?;
        let mut router = self.open_router(role)?;
        info!("Demultiplexing {} as {}", input.display(), role);

        let progress = self.progress_bar(role);
        let (total, counters) = self.route_single(&mut reader, &mut router, &progress)?;
        progress.finish_and_clear();
        router.finish()?;

        if reader.dropped_lines() > 0 {
            debug!("Dropped {} dangling line(s) at the end of {}", reader.dropped_lines(), input.display());
        }
        Ok(RoleReport { role, input_name: input.display().to_string(), total, counters })
    }

    /// Demultiplex two inputs in lockstep. Returns the end1 and end2 reports
    /// and whether any pair disagreed on its barcode.
    pub fn demultiplex_paired(&self, end1: &Path, end2: &Path) -> Result<(RoleReport, RoleReport, bool)> {
        let mut reader1 = open_fastq(end1)?;
        let mut reader2 = open_fastq(end2)?;
        let mut router1 = self.open_router(Role::End1)?;
        let mut router2 = self.open_router(Role::End2)?;
        info!("Demultiplexing {} and {} as pairs", end1.display(), end2.display());

        let progress = self.progress_bar(Role::End1);
        let paired = self.route_paired(&mut reader1, &mut reader2, &mut router1, &mut router2, &progress)?;
        progress.finish_and_clear();
        router1.finish()?;
        router2.finish()?;

        let PairedCounts { total, counters1, counters2, mismatch_observed } = paired;
        let r1 = RoleReport { role: Role::End1, input_name: end1.display().to_string(), total, counters: counters1 };
        let r2 = RoleReport { role: Role::End2, input_name: end2.display().to_string(), total, counters: counters2 };
        Ok((r1, r2, mismatch_observed))
    }

    /// Route every complete record of `reader` through `router`. Returns the
    /// number of records processed and the per-sink counts.
    pub fn route_single<R: BufRead>(
        &self,
        reader: &mut FastqLines<R>,
        router: &mut OutputRouter<'_>,
        progress: &ProgressBar,
    ) -> Result<(u64, RunCounters)> {
        let mut counters = RunCounters::new(self.table);
        let mut total = 0u64;
        let mut rec = FastqRecord::default();

        while reader.read_into(&mut rec)? {
            let index = match self.extract(&rec) {
                Some(bc) => router.route(bc),
                None => router.undetermined(),
            };
            router.write(index, &rec)?;
            counters.increment(index);
            total += 1;
            tick(progress, total);
        }
        Ok((total, counters))
    }

    /// Route pairs of records read in lockstep. Both ends go to the same
    /// index: the matched barcode when both headers agree and the barcode is
    /// known, Undetermined otherwise.
    pub fn route_paired<R1: BufRead, R2: BufRead>(
        &self,
        reader1: &mut FastqLines<R1>,
        reader2: &mut FastqLines<R2>,
        router1: &mut OutputRouter<'_>,
        router2: &mut OutputRouter<'_>,
        progress: &ProgressBar,
    ) -> Result<PairedCounts> {
        let mut counts = PairedCounts {
            total: 0,
            counters1: RunCounters::new(self.table),
            counters2: RunCounters::new(self.table),
            mismatch_observed: false,
        };
        let undetermined = self.table.undetermined_index();
        let mut rec1 = FastqRecord::default();
        let mut rec2 = FastqRecord::default();

        while reader1.read_into(&mut rec1)? && reader2.read_into(&mut rec2)? {
            let bc1 = self.extract(&rec1);
            let bc2 = self.extract(&rec2);

            let index = if bc1 != bc2 {
                if !counts.mismatch_observed {
                    debug!("First barcode disagreement between ends at pair {}", counts.total + 1);
                }
                counts.mismatch_observed = true;
                undetermined
            } else {
                bc1.map_or(undetermined, |bc| router1.route(bc))
            };

            router1.write(index, &rec1)?;
            router2.write(index, &rec2)?;
            counts.counters1.increment(index);
            counts.counters2.increment(index);
            counts.total += 1;
            tick(progress, counts.total);
        }

        if reader1.dropped_lines() > 0 || reader2.dropped_lines() > 0 {
            debug!(
                "Stopped pairing with {} and {} dangling line(s) left",
                reader1.dropped_lines(),
                reader2.dropped_lines()
            );
        }
        Ok(counts)
    }

    fn extract<'r>(&self, rec: &'r FastqRecord) -> Option<&'r [u8]> {
        extract_barcode_from_header(&rec.header, self.config.offset, self.table.format().seq_len)
    }

    fn open_router(&self, role: Role) -> Result<OutputRouter<'a>> {
        OutputRouter::open(self.table, role, &self.config.out_dir, self.config.naming, self.config.compress)
    }

    fn progress_bar(&self, role: Role) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }
        let pb = self.progress.add(ProgressBar::new_spinner());
        pb.set_style(
            ProgressStyle::with_template("{spinner:.blue} {prefix:<6} {msg} {elapsed_precise}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_prefix(role.suffix());
        pb
    }
}

/// Counts accumulated by [`Demultiplexer::route_paired`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairedCounts {
    pub total: u64,
    pub counters1: RunCounters,
    pub counters2: RunCounters,
    pub mismatch_observed: bool,
}

fn tick(progress: &ProgressBar, total: u64) {
    if total % PROGRESS_INTERVAL == 0 {
        progress.set_message(format!("{} million reads", total / PROGRESS_INTERVAL));
        progress.tick();
    }
}

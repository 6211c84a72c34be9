use std::io::{self, Write};

use crate::barcodes::BarcodeTable;
use crate::io::{Role, UNDETERMINED};

/// Per-barcode read counts for one role, with a trailing Undetermined slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunCounters {
    counts: Vec<u64>,
}

impl RunCounters {
    /// Zeroed counters for `table`.
    pub fn new(table: &BarcodeTable) -> Self {
        Self { counts: vec![0; table.len() + 1] }
    }

    pub fn increment(&mut self, index: usize) {
        self.counts[index] += 1;
    }

    pub fn get(&self, index: usize) -> u64 {
        self.counts[index]
    }

    pub fn undetermined(&self) -> u64 {
        self.counts.last().copied().unwrap_or(0)
    }

    /// Sum over every slot, Undetermined included.
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.counts
    }
}

/// Final outcome of demultiplexing one input role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleReport {
    pub role: Role,
    pub input_name: String,
    pub total: u64,
    pub counters: RunCounters,
}

impl RoleReport {
    pub fn write_to<W: Write>(&self, out: &mut W, table: &BarcodeTable) -> io::Result<()> {
        write_report(out, &self.input_name, self.total, table, &self.counters)
    }
}

/// Print the count table for one role.
///
/// ```text
/// Reads of reads_R1.fastq demultiplexed:
/// Total: 3
/// Name Seq Nb-of-reads
/// BC01 AAAAAA 2
/// Undetermined 1
/// ```
pub fn write_report<W: Write>(
    out: &mut W,
    input_name: &str,
    total: u64,
    table: &BarcodeTable,
    counters: &RunCounters,
) -> io::Result<()> {
    writeln!(out, "Reads of {} demultiplexed:", input_name)?;
    writeln!(out, "Total: {}", total)?;
    writeln!(out, "Name Seq Nb-of-reads")?;
    for (i, bc) in table.barcodes().iter().enumerate() {
        writeln!(out, "{} {} {}", bc.name, bc.sequence_str(), counters.get(i))?;
    }
    writeln!(out, "{} {}", UNDETERMINED, counters.undetermined())
}

/// Tab-separated metrics for every reported role, in the order given.
pub fn write_metrics_tsv<W: Write>(out: &mut W, reports: &[RoleReport], table: &BarcodeTable) -> io::Result<()> {
    writeln!(out, "role\tinput\tname\tsequence\treads\tfraction")?;
    for report in reports {
        let fraction = |n: u64| if report.total > 0 { n as f64 / report.total as f64 } else { 0.0 };
        for (i, bc) in table.barcodes().iter().enumerate() {
            let n = report.counters.get(i);
            writeln!(
                out,
                "{}\t{}\t{}\t{}\t{}\t{:.4}",
                report.role,
                report.input_name,
                bc.name,
                bc.sequence_str(),
                n,
                fraction(n)
            )?;
        }
        let n = report.counters.undetermined();
        writeln!(out, "{}\t{}\t{}\t-\t{}\t{:.4}", report.role, report.input_name, UNDETERMINED, n, fraction(n))?;
    }
    Ok(())
}

// Report persistence. Each cycle owns a directory with a structured JSON
// record (authoritative, round-trips) and a CSV rendering for operators.
// Writes are whole-file replacements of append-only grown content; absence
// on read is not an error.

use std::path::{Path, PathBuf};

use crate::error::{PayoutError, Result};
use crate::recipe::{CyclePayoutSummary, PayoutRecipe};
use crate::report::PayoutReport;

pub const PAYOUTS_RECORD_FILE: &str = "payouts.json";
pub const PAYOUTS_TABLE_FILE: &str = "payouts.csv";
pub const INVALID_RECORD_FILE: &str = "invalid.json";
pub const SUMMARY_FILE: &str = "summary.json";

pub trait ReporterEngine: Send + Sync {
    fn report_payouts(&self, reports: &[PayoutReport]) -> Result<()>;
    fn report_invalid_payouts(&self, cycle: i64, recipes: &[PayoutRecipe]) -> Result<()>;
    fn report_cycle_summary(&self, summary: &CyclePayoutSummary) -> Result<()>;
    fn read_payout_reports(&self, cycle: i64) -> Result<Vec<PayoutReport>>;
}

/// Reporter writing per-cycle files under `<workdir>/reports/<cycle>/`.
pub struct FsReporter {
    reports_dir: PathBuf,
}

impl FsReporter {
    pub fn new(workdir: &Path) -> FsReporter {
        FsReporter {
            reports_dir: workdir.join("reports"),
        }
    }

    fn cycle_dir(&self, cycle: i64) -> PathBuf {
        self.reports_dir.join(cycle.to_string())
    }

    fn ensure_cycle_dir(&self, cycle: i64) -> Result<PathBuf> {
        let dir = self.cycle_dir(cycle);
        std::fs::create_dir_all(&dir)
            .map_err(|e| PayoutError::Reporting(format!("failed to create {}: {}", dir.display(), e)))?;
        Ok(dir)
    }

    fn write_json<T: serde::Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let body = serde_json::to_string_pretty(value)
            .map_err(|e| PayoutError::Reporting(e.to_string()))?;
        std::fs::write(path, body)
            .map_err(|e| PayoutError::Reporting(format!("failed to write {}: {}", path.display(), e)))
    }

    fn write_payouts_csv(&self, path: &Path, reports: &[PayoutReport]) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .map_err(|e| PayoutError::Reporting(e.to_string()))?;
        writer
            .write_record(PayoutReport::csv_headers())
            .map_err(|e| PayoutError::Reporting(e.to_string()))?;
        for report in reports {
            writer
                .write_record(report.to_csv_row())
                .map_err(|e| PayoutError::Reporting(e.to_string()))?;
        }
        writer
            .flush()
            .map_err(|e| PayoutError::Reporting(e.to_string()))
    }
}

impl ReporterEngine for FsReporter {
    fn report_payouts(&self, reports: &[PayoutReport]) -> Result<()> {
        if reports.is_empty() {
            return Ok(());
        }
        let mut cycles: Vec<i64> = reports.iter().map(|r| r.cycle).collect();
        cycles.sort_unstable();
        cycles.dedup();
        for cycle in cycles {
            let rows: Vec<PayoutReport> = reports
                .iter()
                .filter(|r| r.cycle == cycle)
                .cloned()
                .collect();
            let dir = self.ensure_cycle_dir(cycle)?;
            self.write_json(&dir.join(PAYOUTS_RECORD_FILE), &rows)?;
            self.write_payouts_csv(&dir.join(PAYOUTS_TABLE_FILE), &rows)?;
        }
        Ok(())
    }

    fn report_invalid_payouts(&self, cycle: i64, recipes: &[PayoutRecipe]) -> Result<()> {
        if recipes.is_empty() {
            return Ok(());
        }
        let dir = self.ensure_cycle_dir(cycle)?;
        self.write_json(&dir.join(INVALID_RECORD_FILE), &recipes)
    }

    fn report_cycle_summary(&self, summary: &CyclePayoutSummary) -> Result<()> {
        let dir = self.ensure_cycle_dir(summary.cycle)?;
        self.write_json(&dir.join(SUMMARY_FILE), summary)
    }

    fn read_payout_reports(&self, cycle: i64) -> Result<Vec<PayoutReport>> {
        let path = self.cycle_dir(cycle).join(PAYOUTS_RECORD_FILE);
        let body = match std::fs::read_to_string(&path) {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(PayoutError::PayoutsRead(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        serde_json::from_str(&body)
            .map_err(|e| PayoutError::PayoutsRead(format!("malformed report file: {}", e)))
    }
}

/// Reporter printing records as JSON lines instead of writing files.
pub struct StdioReporter;

impl ReporterEngine for StdioReporter {
    fn report_payouts(&self, reports: &[PayoutReport]) -> Result<()> {
        for report in reports {
            let line = serde_json::to_string(report)
                .map_err(|e| PayoutError::Reporting(e.to_string()))?;
            println!("REPORT: {}", line);
        }
        Ok(())
    }

    fn report_invalid_payouts(&self, _cycle: i64, recipes: &[PayoutRecipe]) -> Result<()> {
        for recipe in recipes {
            let line = serde_json::to_string(recipe)
                .map_err(|e| PayoutError::Reporting(e.to_string()))?;
            println!("INVALID: {}", line);
        }
        Ok(())
    }

    fn report_cycle_summary(&self, summary: &CyclePayoutSummary) -> Result<()> {
        let line =
            serde_json::to_string(summary).map_err(|e| PayoutError::Reporting(e.to_string()))?;
        println!("SUMMARY: {}", line);
        Ok(())
    }

    fn read_payout_reports(&self, _cycle: i64) -> Result<Vec<PayoutReport>> {
        Ok(Vec::new())
    }
}

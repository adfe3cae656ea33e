// ============================================================
// Layer 6 — Metric Sinks
// ============================================================
// Two MetricSink implementations.
//
// RunLogger writes under <logs_dir>/<run>/:
//
//   scalars.csv     series,step,value     one row per record_scalar
//   figures.csv     series,step,title,file
//   figures/        <series>_<step:06>.png
//
// Example scalars.csv:
//   series,step,value
//   training_loss,1,0.2314
//   training_loss,2,0.1987
//
// Files are opened in append mode on every call, and headers
// are only written when a file is first created, so a resumed
// run keeps extending the same logs.
//
// MemorySink keeps the same information in vectors.

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use crate::domain::figure::Figure;
use crate::domain::run_identity::RunIdentity;
use crate::domain::traits::MetricSink;
use crate::infra::figure::save_png;

const SCALARS_HEADER: &str = "series,step,value";
const FIGURES_HEADER: &str = "series,step,title,file";

// ─── RunLogger ────────────────────────────────────────────────────────────────
pub struct RunLogger {
    /// <logs_dir>/<run>
    dir:         PathBuf,
    scalars_csv: PathBuf,
    figures_csv: PathBuf,
    figures_dir: PathBuf,
}

impl RunLogger {
    pub fn new(logs_dir: impl Into<PathBuf>, run: &RunIdentity) -> Result<Self> {
        let dir         = logs_dir.into().join(run.as_str());
        let figures_dir = dir.join("figures");

        fs::create_dir_all(&figures_dir)
            .with_context(|| format!("Cannot create log directory '{}'", figures_dir.display()))?;

        let logger = Self {
            scalars_csv: dir.join("scalars.csv"),
            figures_csv: dir.join("figures.csv"),
            figures_dir,
            dir,
        };
        ensure_header(&logger.scalars_csv, SCALARS_HEADER)?;
        ensure_header(&logger.figures_csv, FIGURES_HEADER)?;

        tracing::debug!("Logging run metrics to '{}'", logger.dir.display());
        Ok(logger)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn scalars_csv(&self) -> &Path {
        &self.scalars_csv
    }

    pub fn figures_csv(&self) -> &Path {
        &self.figures_csv
    }
}

impl MetricSink for RunLogger {
    fn record_scalar(&mut self, series: &str, value: f64, step: usize) -> Result<()> {
        append_line(&self.scalars_csv, &format!("{},{step},{value}", field(series)))
    }

    fn record_figure(&mut self, series: &str, figure: &Figure, step: usize) -> Result<()> {
        let file = format!("{}_{step:06}.png", field(series));
        save_png(figure, &self.figures_dir.join(&file))?;

        append_line(
            &self.figures_csv,
            &format!("{},{step},{},figures/{file}", field(series), field(&figure.title)),
        )?;
        tracing::debug!("Logged figure '{}' at step {step}", figure.title);
        Ok(())
    }
}

fn ensure_header(path: &Path, header: &str) -> Result<()> {
    if !path.exists() {
        let mut f = fs::File::create(path)
            .with_context(|| format!("Cannot create '{}'", path.display()))?;
        writeln!(f, "{header}")?;
    }
    Ok(())
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut f = OpenOptions::new()
        .append(true)
        .open(path)
        .with_context(|| format!("Cannot open '{}' for append", path.display()))?;
    writeln!(f, "{line}")?;
    Ok(())
}

/// Keep free text from breaking the CSV columns.
fn field(text: &str) -> String {
    text.replace([',', '\n', '\r'], " ")
}

// ─── MemorySink ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarPoint {
    pub series: String,
    pub step:   usize,
    pub value:  f64,
}

#[derive(Debug, Clone)]
pub struct FigureEntry {
    pub series: String,
    pub step:   usize,
    pub figure: Figure,
}

#[derive(Debug, Default)]
pub struct MemorySink {
    pub scalars: Vec<ScalarPoint>,
    pub figures: Vec<FigureEntry>,
}

impl MetricSink for MemorySink {
    fn record_scalar(&mut self, series: &str, value: f64, step: usize) -> Result<()> {
        self.scalars.push(ScalarPoint { series: series.to_string(), step, value });
        Ok(())
    }

    fn record_figure(&mut self, series: &str, figure: &Figure, step: usize) -> Result<()> {
        self.figures.push(FigureEntry {
            series: series.to_string(),
            step,
            figure: figure.clone(),
        });
        Ok(())
    }
}

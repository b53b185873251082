//! CSV in and out: raw score vectors for offline ranking, and per-image
//! prediction reports.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};
use crate::ranking::RankedPrediction;

/// Reads a score vector written as comma separated floats.
///
/// Rows are concatenated in order, so both a single long row and one score
/// per line are accepted. Empty fields are skipped.
pub fn read_scores<R: Read>(reader: R) -> Result<Vec<f32>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut scores = Vec::new();
    for (row, record) in rdr.records().enumerate() {
        let record = record?;
        for (col, field) in record.iter().enumerate() {
            if field.is_empty() {
                continue;
            }
            let score = field.parse::<f32>().map_err(|e| {
                Error::invalid(format!("row {row} column {col}: {field:?} is not a number ({e})"))
            })?;
            scores.push(score);
        }
    }
    Ok(scores)
}

/// Writes ranked predictions as `image,rank,index,label,probability` rows.
pub struct ReportWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(inner: W) -> Result<Self> {
        let mut writer = csv::Writer::from_writer(inner);
        writer.write_record(["image", "rank", "index", "label", "probability"])?;
        Ok(Self { writer })
    }

    pub fn write(&mut self, image: &str, ranked: &[RankedPrediction]) -> Result<()> {
        for (rank, p) in ranked.iter().enumerate() {
            let rank = (rank + 1).to_string();
            let index = p.index.to_string();
            let probability = format!("{:.4}", p.probability);
            self.writer.write_record([
                image,
                rank.as_str(),
                index.as_str(),
                p.label.as_str(),
                probability.as_str(),
            ])?;
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<W> {
        self.writer.flush()?;
        self.writer
            .into_inner()
            .map_err(|e| Error::Io(e.into_error()))
    }
}

/// A report file that only appears at its final path once committed.
///
/// Rows go to `<path>.partial`; [`ReportFile::commit`] renames it into place.
/// Dropping an uncommitted report deletes the partial file, so a failed batch
/// leaves nothing behind.
pub struct ReportFile {
    writer: Option<ReportWriter<BufWriter<File>>>,
    partial: PathBuf,
    path: PathBuf,
}

impl ReportFile {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut name = path
            .file_name()
            .ok_or_else(|| Error::invalid(format!("{} is not a file path", path.display())))?
            .to_os_string();
        name.push(".partial");
        let partial = path.with_file_name(name);
        let writer = ReportWriter::new(BufWriter::new(File::create(&partial)?))?;
        Ok(Self {
            writer: Some(writer),
            partial,
            path,
        })
    }

    pub fn write(&mut self, image: &str, ranked: &[RankedPrediction]) -> Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.write(image, ranked),
            None => Err(Error::invalid("report already committed")),
        }
    }

    /// Flushes every row and moves the report to its final path.
    pub fn commit(mut self) -> Result<PathBuf> {
        if let Some(writer) = self.writer.take() {
            writer
                .finish()?
                .into_inner()
                .map_err(|e| Error::Io(e.into_error()))?;
        }
        fs::rename(&self.partial, &self.path)?;
        debug!(report = %self.path.display(), "report written");
        Ok(self.path.clone())
    }
}

impl Drop for ReportFile {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            drop(writer);
            if fs::remove_file(&self.partial).is_ok() {
                debug!(report = %self.partial.display(), "discarded partial report");
            }
        }
    }
}

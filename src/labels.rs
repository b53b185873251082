//! Static class-name catalog, one label per line.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};

/// Ordered class names; line `i` of the source names class `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelCatalog {
    labels: Vec<String>,
}

impl LabelCatalog {
    /// Builds a catalog from already split labels.
    pub fn new(labels: Vec<String>) -> Result<Self> {
        if labels.is_empty() {
            return Err(Error::invalid("label catalog is empty"));
        }
        Ok(Self { labels })
    }

    pub fn parse(text: &str) -> Result<Self> {
        Self::from_lines(text.lines().map(|l| Ok(l.to_owned())))
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        Self::from_lines(reader.lines().map(|l| l.map_err(Error::from)))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let catalog = Self::from_reader(BufReader::new(File::open(path)?))?;
        debug!(path = %path.display(), classes = catalog.len(), "loaded label catalog");
        Ok(catalog)
    }

    fn from_lines(lines: impl Iterator<Item = Result<String>>) -> Result<Self> {
        let mut labels = Vec::new();
        for line in lines {
            labels.push(line?.trim_end().to_owned());
        }
        // a trailing newline (or several) must not add phantom classes, but
        // interior blank lines still occupy an index
        while labels.last().is_some_and(|l| l.is_empty()) {
            labels.pop();
        }
        Self::new(labels)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Always false for a constructed catalog.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.labels
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }
}

impl AsRef<[String]> for LabelCatalog {
    fn as_ref(&self) -> &[String] {
        &self.labels
    }
}

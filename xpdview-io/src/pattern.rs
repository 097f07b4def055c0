//! Integrated 1D pattern files (`.chi`, `.gr`).
//!
//! Two layouts exist in the wild: plain two-column text, optionally with
//! `#` comments, and the fit2d `.chi` layout with four header rows. The
//! layout is resolved once per file, then the first two columns are read.

use std::fs;
use std::path::Path;

use xpdview_core::Pattern;

use crate::{Error, Result};

/// Header rows written by fit2d before the data.
pub const FIT2D_HEADER_ROWS: usize = 4;

/// Text layout of a pattern file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternFormat {
    /// Whitespace-separated columns, `#` comments and blank lines ignored.
    Plain,
    /// Four free-form header rows followed by plain columns.
    Fit2d,
}

fn is_data_line(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && !trimmed.starts_with('#')
}

fn parse_xy(line: &str) -> Option<(f64, f64)> {
    let mut fields = line.split_whitespace().map(str::parse::<f64>);
    match (fields.next(), fields.next()) {
        (Some(Ok(x)), Some(Ok(y))) => Some((x, y)),
        _ => None,
    }
}

impl PatternFormat {
    /// `Plain` if every data line holds at least two numbers, else `Fit2d`.
    #[must_use]
    pub fn detect(text: &str) -> Self {
        if text
            .lines()
            .filter(|line| is_data_line(line))
            .all(|line| parse_xy(line).is_some())
        {
            Self::Plain
        } else {
            Self::Fit2d
        }
    }

    fn skipped_rows(self) -> usize {
        match self {
            Self::Plain => 0,
            Self::Fit2d => FIT2D_HEADER_ROWS,
        }
    }
}

/// Reads the first two columns of `text` as a pattern.
///
/// # Errors
/// Returns [`Error::InvalidFormat`] naming the first line that does not
/// hold two numbers.
pub fn parse_pattern(text: &str, format: PatternFormat) -> Result<Pattern> {
    let mut x = Vec::new();
    let mut y = Vec::new();
    for (number, line) in text
        .lines()
        .enumerate()
        .skip(format.skipped_rows())
        .filter(|(_, line)| is_data_line(line))
    {
        let (xv, yv) = parse_xy(line).ok_or_else(|| {
            Error::InvalidFormat(format!(
                "line {}: expected two numeric columns, got '{}'",
                number + 1,
                line.trim()
            ))
        })?;
        x.push(xv);
        y.push(yv);
    }
    Ok(Pattern::new(x, y)?)
}

/// Loads a pattern file, detecting its layout first.
///
/// # Errors
/// Returns an I/O error if the file cannot be read, or
/// [`Error::InvalidFormat`] if it parses under neither layout.
pub fn load_pattern<P: AsRef<Path>>(path: P) -> Result<Pattern> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    let format = PatternFormat::detect(&text);
    log::debug!("reading {} as {format:?}", path.display());
    parse_pattern(&text, format).map_err(|e| match e {
        Error::InvalidFormat(msg) => Error::InvalidFormat(format!("{}: {msg}", path.display())),
        other => other,
    })
}

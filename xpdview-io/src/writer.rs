//! CSV writers for reduced representations and peak positions.

use crate::Result;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use xpdview_algorithms::{PeakPoint, ReducedSeries};
use xpdview_core::ExposureKey;

/// Writer for derived-view output.
pub struct ResultWriter<W: Write> {
    writer: BufWriter<W>,
}

impl ResultWriter<File> {
    /// Creates a new file writer.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new(file))
    }
}

impl<W: Write> ResultWriter<W> {
    /// Wraps any writer, e.g. stdout.
    pub fn new(inner: W) -> Self {
        Self {
            writer: BufWriter::new(inner),
        }
    }

    /// Writes a reduced series as `frame,key,value` rows.
    ///
    /// `keys` are the exposure keys in store order; a frame past the end
    /// of `keys` gets an empty key column.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_series_csv(&mut self, series: &ReducedSeries, keys: &[ExposureKey]) -> Result<()> {
        writeln!(self.writer, "frame,key,value")?;

        for (frame, value) in series.points() {
            let key = keys.get(frame).map_or("", ExposureKey::as_str);
            writeln!(self.writer, "{frame},{key},{value}")?;
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Writes peaks as `frame,position` rows.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_peaks_csv(&mut self, peaks: &[PeakPoint]) -> Result<()> {
        writeln!(self.writer, "frame,position")?;

        for p in peaks {
            writeln!(self.writer, "{},{}", p.frame, p.position)?;
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Flushes the writer.
    ///
    /// # Errors
    /// Returns an error if flushing fails.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;
    use xpdview_core::Roi;

    #[test]
    fn test_write_series_csv() {
        let file = NamedTempFile::new().unwrap();
        let mut writer = ResultWriter::create(file.path()).unwrap();

        let mut series = ReducedSeries::new("sum", Roi::new(0, 10, 0, 10));
        series.extend([100.0, 99.5]);
        let keys = vec![ExposureKey::new("s_000"), ExposureKey::new("s_001")];

        writer.write_series_csv(&series, &keys).unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        assert!(content.starts_with("frame,key,value\n"));
        assert!(content.contains("0,s_000,100\n"));
        assert!(content.contains("1,s_001,99.5\n"));
    }

    #[test]
    fn test_write_peaks_csv() {
        let mut buffer = Vec::new();
        {
            let mut writer = ResultWriter::new(&mut buffer);
            let peaks = vec![
                PeakPoint {
                    frame: 0,
                    position: 2.5,
                },
                PeakPoint {
                    frame: 3,
                    position: 4.25,
                },
            ];
            writer.write_peaks_csv(&peaks).unwrap();
        }
        let content = String::from_utf8(buffer).unwrap();
        assert_eq!(content, "frame,position\n0,2.5\n3,4.25\n");
    }
}

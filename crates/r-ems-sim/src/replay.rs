//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Per-device replay line storage and loaders."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::info;

use crate::device::{Device, DeviceMap};
use crate::error::{ExchangeError, Result};

/// Read-only access to the recorded lines replayed for each device.
pub trait ReplaySource: Send + Sync {
    /// Line at `index`, or `None` when out of range.
    fn line(&self, device: Device, index: usize) -> Option<&str>;

    /// Number of lines recorded for `device`.
    fn len(&self, device: Device) -> usize;

    fn is_empty(&self, device: Device) -> bool {
        self.len(device) == 0
    }
}

/// In-memory replay data, one ordered line sequence per device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayLibrary {
    lines: DeviceMap<Vec<String>>,
}

impl ReplayLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style variant of [`ReplayLibrary::insert`].
    pub fn with_lines<I, S>(mut self, device: Device, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert(device, lines);
        self
    }

    /// Replace the sequence of `device`.
    pub fn insert<I, S>(&mut self, device: Device, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lines[device] = lines.into_iter().map(Into::into).collect();
    }

    /// Load `device` from a text file, one record per non-blank line.
    pub fn load_file(&mut self, device: Device, path: &Path) -> Result<usize> {
        let contents = fs::read_to_string(path).map_err(|source| ExchangeError::ReplayIo {
            path: path.to_path_buf(),
            source,
        })?;
        let lines = parse_lines(&contents);
        let count = lines.len();
        self.lines[device] = lines;
        info!(device = %device, path = %path.display(), lines = count, "replay file loaded");
        Ok(count)
    }

    /// Load every configured file. Keys are device identifiers and are
    /// validated against the fixed device set.
    pub fn from_files(files: &IndexMap<String, PathBuf>) -> Result<Self> {
        let mut library = Self::new();
        for (raw_device, path) in files {
            let device = Device::parse(raw_device)?;
            library.load_file(device, path)?;
        }
        Ok(library)
    }

    pub fn lines(&self, device: Device) -> &[String] {
        &self.lines[device]
    }
}

impl ReplaySource for ReplayLibrary {
    fn line(&self, device: Device, index: usize) -> Option<&str> {
        self.lines[device].get(index).map(String::as_str)
    }

    fn len(&self, device: Device) -> usize {
        self.lines[device].len()
    }
}

/// Split replay text into trimmed, non-blank records.
pub fn parse_lines(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn parse_lines_skips_blank_records() {
        let lines = parse_lines("first\r\n\n   \n second \nthird");
        assert_eq!(lines, vec!["first", "second", "third"]);
    }

    #[test]
    fn loads_device_file() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "01 03 00 00 00 0A C5 CD")?;
        writeln!(file)?;
        writeln!(file, "01 03 14 00 E6 01 F4")?;
        file.flush()?;

        let mut library = ReplayLibrary::new();
        let count = library.load_file(Device::Inverter, file.path())?;
        assert_eq!(count, 2);
        assert_eq!(library.len(Device::Inverter), 2);
        assert_eq!(library.line(Device::Inverter, 1), Some("01 03 14 00 E6 01 F4"));
        assert!(library.is_empty(Device::Bms));
        Ok(())
    }

    #[test]
    fn from_files_rejects_unknown_device() {
        let mut files = IndexMap::new();
        files.insert("pump".to_owned(), PathBuf::from("pump.txt"));
        let err = ReplayLibrary::from_files(&files).unwrap_err();
        assert!(matches!(err, ExchangeError::UnknownDevice(_)));
    }

    #[test]
    fn missing_file_reports_path() {
        let mut library = ReplayLibrary::new();
        let err = library
            .load_file(Device::Sensor, Path::new("/nonexistent/sensor.txt"))
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/sensor.txt"));
    }

    #[test]
    fn line_out_of_range_is_none() {
        let library = ReplayLibrary::new().with_lines(Device::Bms, ["a", "b"]);
        assert_eq!(library.line(Device::Bms, 2), None);
        assert_eq!(library.lines(Device::Bms), ["a", "b"]);
    }
}

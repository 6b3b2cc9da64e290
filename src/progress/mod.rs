//! Persistence of the last successfully downloaded archive number.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::ProgressError;

pub type SequenceNumber = u64;

pub const DEFAULT_STATE_FILE: &str = "last_downloaded.txt";

pub trait ProgressStore {
    /// Returns the last recorded number, or `ProgressError::Missing` when
    /// nothing has been recorded yet.
    fn read(&self) -> Result<SequenceNumber, ProgressError>;

    fn write(&mut self, number: SequenceNumber) -> Result<(), ProgressError>;
}

/// Plain text file holding a single base-10 integer.
pub struct FileProgressStore {
    path: PathBuf,
}

impl FileProgressStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl ProgressStore for FileProgressStore {
    fn read(&self) -> Result<SequenceNumber, ProgressError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(ProgressError::Missing(self.path.clone()));
            }
            Err(err) => return Err(err.into()),
        };

        content
            .trim_end()
            .parse()
            .map_err(|_| ProgressError::Malformed {
                path: self.path.clone(),
                content,
            })
    }

    fn write(&mut self, number: SequenceNumber) -> Result<(), ProgressError> {
        // Rename over the old file so readers never see a partial number.
        let temp_path = self.temp_path();
        if let Err(err) = replace_with(&temp_path, &self.path, number) {
            let _ = fs::remove_file(&temp_path);
            return Err(err.into());
        }

        log::debug!("Recorded {} in {}", number, self.path.display());
        Ok(())
    }
}

fn replace_with(temp_path: &Path, path: &Path, number: SequenceNumber) -> io::Result<()> {
    let mut file = fs::File::create(temp_path)?;
    writeln!(file, "{}", number)?;
    file.sync_all()?;
    drop(file);
    fs::rename(temp_path, path)
}

#[cfg(test)]
#[derive(Default)]
pub struct MemoryProgressStore {
    pub value: Option<SequenceNumber>,
    pub writes: Vec<SequenceNumber>,
}

#[cfg(test)]
impl MemoryProgressStore {
    pub fn with_value(value: SequenceNumber) -> Self {
        Self {
            value: Some(value),
            writes: Vec::new(),
        }
    }
}

#[cfg(test)]
impl ProgressStore for MemoryProgressStore {
    fn read(&self) -> Result<SequenceNumber, ProgressError> {
        self.value
            .ok_or_else(|| ProgressError::Missing(PathBuf::from("<memory>")))
    }

    fn write(&mut self, number: SequenceNumber) -> Result<(), ProgressError> {
        self.value = Some(number);
        self.writes.push(number);
        Ok(())
    }
}

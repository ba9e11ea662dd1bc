//! Memory-mapped readers for packed event files.

use crate::packed::{PackedTable, Table};
use crate::{Error, Result};
use g4post_core::ProcessingContext;
use g4post_pipeline::InputSpec;
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};

/// A memory-mapped file reader.
///
/// Uses memmap2 to access file contents without copying the whole file
/// into memory.
pub struct MappedFileReader {
    mmap: Mmap,
    path: PathBuf,
}

impl MappedFileReader {
    /// Opens a file for memory-mapped reading.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        // SAFETY: The file is opened read-only and we assume it is not modified concurrently.
        // This is the standard safety contract for memory mapping.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            mmap,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Returns the file contents as a byte slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap[..]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Container format of a packed file, chosen by extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Container {
    Json,
    Hdf5,
}

impl Container {
    /// Container for a file extension (`json`, `hdf5`, `h5`).
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedContainer`] for other extensions.
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match extension.as_str() {
            "json" => Ok(Self::Json),
            "hdf5" | "h5" => Ok(Self::Hdf5),
            _ => Err(Error::UnsupportedContainer(extension)),
        }
    }
}

/// Reads the packed form of a table.
///
/// # Errors
/// Returns an error when the file cannot be read or is not a packed table.
pub fn read_packed(path: &Path) -> Result<PackedTable> {
    match Container::from_path(path)? {
        Container::Json => {
            let reader = MappedFileReader::open(path)?;
            if reader.is_empty() {
                return Err(Error::InvalidFormat(format!(
                    "{} is empty",
                    reader.path().display()
                )));
            }
            Ok(serde_json::from_slice(reader.as_bytes())?)
        }
        #[cfg(feature = "hdf5")]
        Container::Hdf5 => crate::hdf5::read_packed_hdf5(path),
        #[cfg(not(feature = "hdf5"))]
        Container::Hdf5 => Err(Error::UnsupportedContainer(
            "hdf5 (built without the `hdf5` feature)".to_string(),
        )),
    }
}

/// Reads and unpacks a table.
///
/// # Errors
/// See [`read_packed`].
pub fn read_table(path: &Path) -> Result<Table> {
    Table::from_packed(&read_packed(path)?)
}

/// A batch of consecutive events from one file.
#[derive(Clone, Debug)]
pub struct Batch {
    /// Index of the first event within the file.
    pub first_row: usize,
    /// Events in the whole file.
    pub total_rows: usize,
    pub table: Table,
}

impl Batch {
    /// Number of events in this batch.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.table.len()
    }

    /// Context holding this batch's variables and row window.
    #[must_use]
    pub fn into_context(self) -> ProcessingContext {
        self.table.into_context(self.first_row, self.total_rows)
    }
}

/// An input event file with its configured branches selected.
pub struct EventFile {
    path: PathBuf,
    table: Table,
}

impl EventFile {
    /// Opens `path` and maps the configured branches to context variables.
    ///
    /// # Errors
    /// Returns [`Error::MissingBranch`] for an unmapped branch, or an error
    /// when the file cannot be read.
    pub fn open(path: &Path, input: &InputSpec) -> Result<Self> {
        let source = read_table(path)?;
        let mut table = Table::new();
        for (variable, branch) in input.branches() {
            let column = source.column(branch).ok_or_else(|| Error::MissingBranch {
                path: path.to_path_buf(),
                branch: branch.to_string(),
            })?;
            table.insert(variable, column.clone())?;
        }
        log::debug!(
            "{}: {} rows, {} variables from tree `{}`",
            path.display(),
            source.len(),
            input.variables.len(),
            input.tree
        );
        Ok(Self {
            path: path.to_path_buf(),
            table,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Events in the file.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.table.len()
    }

    /// The selected variables of every event.
    #[must_use]
    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Splits the file into batches of at most `step_size` events.
    #[must_use]
    pub fn batches(self, step_size: usize) -> Batches {
        Batches {
            total_rows: self.table.len(),
            table: self.table,
            step_size: step_size.max(1),
            next_row: 0,
        }
    }
}

/// Iterator over the batches of an [`EventFile`].
pub struct Batches {
    table: Table,
    total_rows: usize,
    step_size: usize,
    next_row: usize,
}

impl Iterator for Batches {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_row >= self.total_rows {
            return None;
        }
        let first_row = self.next_row;
        let end = (first_row + self.step_size).min(self.total_rows);
        self.next_row = end;
        Some(self.table.slice_rows(first_row..end).map(|table| Batch {
            first_row,
            total_rows: self.total_rows,
            table,
        }))
    }
}

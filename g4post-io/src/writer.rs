//! Writers for packed tables.

use crate::packed::{PackedTable, Table};
use crate::reader::Container;
use crate::{Error, Result};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writes a table in the container chosen by the file extension.
///
/// # Errors
/// Returns an error when the table cannot be packed or the file written.
pub fn write_table(path: &Path, table: &Table) -> Result<()> {
    write_packed(path, &table.to_packed()?)
}

/// Writes an already packed table.
///
/// The table is written to a hidden sibling file first and renamed over
/// `path` once complete, so `path` never holds a partial table.
///
/// # Errors
/// Returns an error when the file cannot be written.
pub fn write_packed(path: &Path, packed: &PackedTable) -> Result<()> {
    let container = Container::from_path(path)?;
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let staged = tempfile::Builder::new()
        .prefix(".g4post-")
        .suffix(".partial")
        .tempfile_in(parent)?;
    match container {
        Container::Json => {
            let mut writer = BufWriter::new(staged.as_file());
            serde_json::to_writer(&mut writer, packed)?;
            writer.flush()?;
        }
        #[cfg(feature = "hdf5")]
        Container::Hdf5 => crate::hdf5::write_packed_hdf5(staged.path(), packed)?,
        #[cfg(not(feature = "hdf5"))]
        Container::Hdf5 => {
            return Err(Error::UnsupportedContainer(
                "hdf5 (built without the `hdf5` feature)".to_string(),
            ))
        }
    }
    staged.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

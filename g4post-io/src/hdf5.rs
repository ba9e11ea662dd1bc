//! HDF5 container for packed tables.
//!
//! A table lives in the group `awkward`. Each buffer is a one-dimensional
//! dataset named `<column>.offsets<k>` or `<column>.data`; booleans are
//! stored as `u8`. The group carries two attributes: `length` (rows) and
//! `form`, a JSON object mapping each column to its `dtype` and `depth`.

use crate::packed::{Buffers, PackedColumn, PackedTable};
use crate::{Error, Result};
use hdf5::types::{H5Type, VarLenUnicode};
use hdf5::{File, Group};
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

const GROUP: &str = "awkward";

#[derive(Serialize, Deserialize)]
struct FormEntry {
    dtype: String,
    depth: usize,
}

/// Writes a packed table to an HDF5 file, replacing any existing file.
///
/// # Errors
/// Returns an error if the file, group or datasets cannot be created.
pub fn write_packed_hdf5(path: &Path, packed: &PackedTable) -> Result<()> {
    let file = File::create(path)?;
    let group = file.create_group(GROUP)?;

    let mut form = BTreeMap::new();
    for (name, column) in &packed.columns {
        form.insert(
            name.clone(),
            FormEntry {
                dtype: column.dtype().name().to_string(),
                depth: column.depth(),
            },
        );
        match column {
            PackedColumn::Float64(b) => write_buffers(&group, name, &b.offsets, &b.data)?,
            PackedColumn::Int64(b) => write_buffers(&group, name, &b.offsets, &b.data)?,
            PackedColumn::Bool(b) => {
                let bytes: Vec<u8> = b.data.iter().map(|&v| u8::from(v)).collect();
                write_buffers(&group, name, &b.offsets, &bytes)?;
            }
        }
    }

    let form = to_var_len_unicode(&serde_json::to_string(&form)?)?;
    group
        .new_attr::<VarLenUnicode>()
        .create("form")?
        .write_scalar(&form)?;
    group
        .new_attr::<u64>()
        .create("length")?
        .write_scalar(&(packed.length as u64))?;
    Ok(())
}

/// Reads a packed table from an HDF5 file.
///
/// # Errors
/// Returns an error if the group, attributes or datasets are missing or
/// inconsistent.
#[allow(clippy::cast_possible_truncation)]
pub fn read_packed_hdf5(path: &Path) -> Result<PackedTable> {
    let file = File::open(path)?;
    let group = file.group(GROUP)?;

    let form: VarLenUnicode = group.attr("form")?.read_scalar()?;
    let form: BTreeMap<String, FormEntry> = serde_json::from_str(form.as_str())?;
    let length = group.attr("length")?.read_scalar::<u64>()? as usize;

    let mut columns = BTreeMap::new();
    for (name, entry) in form {
        if entry.depth == 0 {
            return Err(Error::InvalidFormat(format!("column `{name}` has depth 0")));
        }
        let offsets = (0..entry.depth - 1)
            .map(|level| {
                let raw = read_vec::<u64>(&group, &format!("{name}.offsets{level}"))?;
                Ok(raw.into_iter().map(|v| v as usize).collect())
            })
            .collect::<Result<Vec<Vec<usize>>>>()?;
        let data_name = format!("{name}.data");
        let column = match g4post_core::DType::from_name(&entry.dtype) {
            Some(g4post_core::DType::Float64) => PackedColumn::Float64(Buffers {
                depth: entry.depth,
                offsets,
                data: read_vec::<f64>(&group, &data_name)?,
            }),
            Some(g4post_core::DType::Int64) => PackedColumn::Int64(Buffers {
                depth: entry.depth,
                offsets,
                data: read_vec::<i64>(&group, &data_name)?,
            }),
            Some(g4post_core::DType::Bool) => PackedColumn::Bool(Buffers {
                depth: entry.depth,
                offsets,
                data: read_vec::<u8>(&group, &data_name)?
                    .into_iter()
                    .map(|v| v != 0)
                    .collect(),
            }),
            None => {
                return Err(Error::InvalidFormat(format!(
                    "column `{name}` has unknown dtype `{}`",
                    entry.dtype
                )))
            }
        };
        columns.insert(name, column);
    }
    Ok(PackedTable { length, columns })
}

fn write_buffers<T: H5Type>(
    group: &Group,
    name: &str,
    offsets: &[Vec<usize>],
    data: &[T],
) -> Result<()> {
    for (level, buffer) in offsets.iter().enumerate() {
        let raw: Vec<u64> = buffer.iter().map(|&v| v as u64).collect();
        write_vec(group, &format!("{name}.offsets{level}"), &raw)?;
    }
    write_vec(group, &format!("{name}.data"), data)
}

fn write_vec<T: H5Type>(group: &Group, name: &str, values: &[T]) -> Result<()> {
    let dataset = group.new_dataset::<T>().shape(values.len()).create(name)?;
    if !values.is_empty() {
        dataset.write(ArrayView1::from(values))?;
    }
    Ok(())
}

fn read_vec<T: H5Type>(group: &Group, name: &str) -> Result<Vec<T>> {
    let dataset = group.dataset(name)?;
    Ok(dataset.read_raw::<T>()?)
}

fn to_var_len_unicode(value: &str) -> Result<VarLenUnicode> {
    VarLenUnicode::from_str(value)
        .map_err(|e| Error::InvalidFormat(format!("invalid utf-8 attribute: {e}")))
}

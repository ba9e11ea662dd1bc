//! Masking of hits outside the active detector volume.
//!
//! A hit mask filters every array aligned with the hits. Grouped hits
//! (`[event][hit]`, `[event][window][hit]`, ...) additionally lose the
//! innermost groups that no longer contain any hit, and arrays with one
//! value per group (window anchors, reduced ids) are filtered the same way,
//! so all outputs keep identical shapes.

use crate::geometry::{Cylinder, GeometryTable};
use crate::group::NO_DETECTOR;
use g4post_core::{ensure_same_len, map_aligned, Error, Ragged, Result};

/// Hit mask for a cylinder acceptance region.
///
/// # Errors
/// Returns an error when the coordinate arrays are misaligned.
pub fn cylinder_mask(
    x: &Ragged<f64>,
    y: &Ragged<f64>,
    z: &Ragged<f64>,
    cylinder: &Cylinder,
) -> Result<Ragged<bool>> {
    map_aligned((x, y, z), &mut |(x, y, z): (&[f64], &[f64], &[f64])| {
        ensure_same_len("position y", x.len(), y.len())?;
        ensure_same_len("position z", x.len(), z.len())?;
        Ok(Ragged::Leaf(
            x.iter()
                .zip(y)
                .zip(z)
                .map(|((&x, &y), &z)| cylinder.contains(x, y, z))
                .collect(),
        ))
    })
}

/// Hit mask for per-volume polycone boundaries.
///
/// # Errors
/// Returns an error when the coordinate and volume arrays are misaligned.
pub fn polycone_mask(
    x: &Ragged<f64>,
    y: &Ragged<f64>,
    z: &Ragged<f64>,
    vol: &Ragged<i64>,
    table: &GeometryTable,
) -> Result<Ragged<bool>> {
    map_aligned(
        (x, y, z, vol),
        &mut |(x, y, z, vol): (&[f64], &[f64], &[f64], &[i64])| {
            ensure_same_len("position y", x.len(), y.len())?;
            ensure_same_len("position z", x.len(), z.len())?;
            ensure_same_len("volume ids", x.len(), vol.len())?;
            Ok(Ragged::Leaf(
                (0..x.len())
                    .map(|i| table.contains(vol[i], x[i], y[i], z[i]))
                    .collect(),
            ))
        },
    )
}

/// A hit mask together with the keep-mask of the groups it leaves non-empty.
#[derive(Clone, Debug, PartialEq)]
pub struct ActiveMask {
    hits: Ragged<bool>,
    groups: Option<Ragged<bool>>,
}

impl ActiveMask {
    /// Derives the group keep-mask from a hit mask.
    ///
    /// # Errors
    /// Returns an error when `hits` is a scalar.
    pub fn new(hits: Ragged<bool>) -> Result<Self> {
        let groups = if hits.depth() >= 2 {
            Some(hits.reduce(|leaf| leaf.iter().any(|&keep| keep))?)
        } else {
            None
        };
        Ok(Self { hits, groups })
    }

    #[must_use]
    pub fn hits(&self) -> &Ragged<bool> {
        &self.hits
    }

    /// Depth of the masked hit arrays.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.hits.depth()
    }

    /// Filters an array aligned with the hits and drops emptied groups.
    ///
    /// # Errors
    /// Returns an error when `values` does not have the shape of the hits.
    pub fn apply<T: Clone>(&self, values: &Ragged<T>) -> Result<Ragged<T>> {
        let filtered = values.filter(&self.hits)?;
        match &self.groups {
            Some(keep) => filtered.filter(keep),
            None => Ok(filtered),
        }
    }

    /// Filters an array holding one value per hit group.
    ///
    /// # Errors
    /// Returns an error when the hits are not grouped or `values` does not
    /// have one entry per group.
    pub fn apply_to_groups<T: Clone>(&self, values: &Ragged<T>) -> Result<Ragged<T>> {
        match &self.groups {
            Some(keep) => values.filter(keep),
            None if values.is_empty() && self.hits.is_empty() => Ok(values.clone()),
            None => Err(Error::misaligned(
                "per-group values need hits grouped at least one level deep",
            )),
        }
    }
}

/// First volume id of every innermost group, removing one level.
///
/// # Errors
/// Returns an error when `vol` is not grouped.
pub fn first_per_group(vol: &Ragged<i64>) -> Result<Ragged<i64>> {
    if vol.depth() < 2 && !vol.is_empty() {
        return Err(Error::misaligned("reduced volume ids need grouped hits"));
    }
    vol.reduce(|leaf| leaf.first().copied().unwrap_or(NO_DETECTOR))
}

//! Geometric acceptance tests for hit positions.
//!
//! Two shapes are supported: an upright cylinder around the z axis and a
//! per-volume polycone described by its (r, z) cross-section. Polycone
//! volumes are looked up by sensitive-volume id in a [`GeometryTable`].

use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Tolerance used to decide that a point lies on a polycone boundary.
const BOUNDARY_TOLERANCE: f64 = 1e-12;

/// Upright cylinder centred on the z axis.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Cylinder {
    pub radius: f64,
    pub h_top: f64,
    pub h_bottom: f64,
    /// Accept points outside the cylinder instead.
    pub inverse: bool,
}

impl Cylinder {
    /// Closed-interval containment test, negated when `inverse` is set.
    #[must_use]
    pub fn contains(&self, x: f64, y: f64, z: f64) -> bool {
        let inside = x.hypot(y) <= self.radius && self.h_bottom <= z && z <= self.h_top;
        inside != self.inverse
    }
}

/// Closed (r, z) cross-section of a rotationally symmetric volume.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Polycone {
    pub r: Vec<f64>,
    pub z: Vec<f64>,
}

impl Polycone {
    #[must_use]
    pub fn new(r: Vec<f64>, z: Vec<f64>) -> Self {
        Self { r, z }
    }

    fn edges(&self) -> impl Iterator<Item = ((f64, f64), (f64, f64))> + '_ {
        let n = self.r.len().min(self.z.len());
        (0..n).map(move |i| {
            let j = (i + 1) % n;
            ((self.r[i], self.z[i]), (self.r[j], self.z[j]))
        })
    }

    /// Even-odd test of the point `(r, z)` against the closed boundary.
    ///
    /// An edge counts as a crossing when exactly one endpoint lies strictly
    /// above `z` and `r` lies left of the crossing point, so horizontal
    /// edges never count. Points on the boundary are inside.
    #[must_use]
    pub fn contains(&self, r: f64, z: f64) -> bool {
        let mut inside = false;
        for ((r1, z1), (r2, z2)) in self.edges() {
            if on_segment(r, z, (r1, z1), (r2, z2)) {
                return true;
            }
            if (z1 > z) != (z2 > z) {
                let crossing = r1 + (z - z1) * (r2 - r1) / (z2 - z1);
                if r < crossing {
                    inside = !inside;
                }
            }
        }
        inside
    }
}

fn on_segment(r: f64, z: f64, a: (f64, f64), b: (f64, f64)) -> bool {
    let cross = (b.0 - a.0) * (z - a.1) - (b.1 - a.1) * (r - a.0);
    let scale = (b.0 - a.0).abs().max((b.1 - a.1).abs()).max(1.0);
    cross.abs() <= BOUNDARY_TOLERANCE * scale
        && r >= a.0.min(b.0) - BOUNDARY_TOLERANCE
        && r <= a.0.max(b.0) + BOUNDARY_TOLERANCE
        && z >= a.1.min(b.1) - BOUNDARY_TOLERANCE
        && z <= a.1.max(b.1) + BOUNDARY_TOLERANCE
}

/// A sensitive volume with its placement.
#[derive(Clone, Debug, PartialEq)]
pub struct Volume {
    pub name: Option<String>,
    pub center: [f64; 3],
    pub boundary: Polycone,
}

impl Volume {
    /// Tests a global position against the boundary, after moving it into
    /// the volume frame.
    #[must_use]
    pub fn contains(&self, x: f64, y: f64, z: f64) -> bool {
        let [cx, cy, cz] = self.center;
        self.boundary.contains((x - cx).hypot(y - cy), z - cz)
    }
}

/// Polycone volumes keyed by sensitive-volume id.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GeometryTable {
    volumes: HashMap<i64, Volume>,
}

impl GeometryTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: i64, volume: Volume) {
        self.volumes.insert(id, volume);
    }

    #[must_use]
    pub fn get(&self, id: i64) -> Option<&Volume> {
        self.volumes.get(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }

    /// Unknown volume ids are never inside.
    #[must_use]
    pub fn contains(&self, id: i64, x: f64, y: f64, z: f64) -> bool {
        self.get(id).is_some_and(|volume| volume.contains(x, y, z))
    }
}

impl FromIterator<(i64, Volume)> for GeometryTable {
    fn from_iter<I: IntoIterator<Item = (i64, Volume)>>(iter: I) -> Self {
        Self {
            volumes: iter.into_iter().collect(),
        }
    }
}

//! Time windowing of hits.
//!
//! Hits are first shifted by the earliest time of a reference pool, then
//! split into windows of nominal length `dT`: a window is anchored at its
//! earliest hit and the first hit later than `anchor + dT` opens the next
//! one. Every hit is assigned to the window interval `[w[j], w[j+1])` that
//! contains it and payloads are regrouped by that assignment.
//!
//! Anchors are defined on the sorted times, but [`Windows::anchors`] lists
//! them in the order the grouped windows appear (first appearance of each
//! window in hit order), so anchor `i` always labels grouped window `i`.
//! For time-ordered hits this is ascending; [`define_windows`] returns the
//! ascending sequence itself.

use g4post_core::{map_aligned, Error, Ragged, Result};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Shifts every leaf of `t` by the minimum of the matching leaf of `pool`.
///
/// # Errors
/// Returns an error when the two arrays are misaligned or when a non-empty
/// leaf of `t` has an empty pool.
pub fn subtract_min(t: &Ragged<f64>, pool: &Ragged<f64>) -> Result<Ragged<f64>> {
    map_aligned((t, pool), &mut |(t, pool): (&[f64], &[f64])| {
        if t.is_empty() {
            return Ok(Ragged::empty());
        }
        let min = pool
            .iter()
            .copied()
            .min_by(f64::total_cmp)
            .ok_or_else(|| Error::misaligned("empty time pool for a non-empty hit list"))?;
        Ok(Ragged::Leaf(t.iter().map(|v| v - min).collect()))
    })
}

/// Window anchors for one leaf of times, in ascending order.
///
/// A value equal to `anchor + dt` stays in the current window; only a
/// strictly greater value opens a new one.
#[must_use]
pub fn define_windows(times: &[f64], dt: f64) -> Vec<f64> {
    let mut sorted = times.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mut anchors: Vec<f64> = Vec::new();
    for value in sorted {
        match anchors.last() {
            Some(&anchor) if value <= anchor + dt => {}
            _ => anchors.push(value),
        }
    }
    anchors
}

/// Index of the window `[w[j], w[j+1])` containing each time.
///
/// Times at or past the last anchor map to the last window.
#[must_use]
pub fn map_to_windows(times: &[f64], anchors: &[f64]) -> Vec<usize> {
    times
        .iter()
        .map(|&t| anchors.partition_point(|&w| w <= t).saturating_sub(1))
        .collect()
}

/// Distinct keys in order of first appearance.
pub fn first_appearance<K: Copy + Eq + Hash>(keys: &[K]) -> Vec<K> {
    let mut seen = HashSet::new();
    keys.iter().copied().filter(|key| seen.insert(*key)).collect()
}

/// Buckets `values` by `keys`, one bucket per distinct key in order of
/// first appearance.
///
/// # Errors
/// Returns [`Error::LengthMismatch`] when keys and values differ in length.
pub fn group_by_first_appearance<K, V>(keys: &[K], values: &[V]) -> Result<Vec<Vec<V>>>
where
    K: Copy + Eq + Hash,
    V: Clone,
{
    g4post_core::ensure_same_len("grouping keys", keys.len(), values.len())?;

    let mut slots: HashMap<K, usize> = HashMap::new();
    let mut groups: Vec<Vec<V>> = Vec::new();
    for (key, value) in keys.iter().zip(values) {
        let slot = *slots.entry(*key).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(value.clone());
    }
    Ok(groups)
}

pub(crate) fn groups_to_ragged<V>(groups: Vec<Vec<V>>) -> Ragged<V> {
    Ragged::Branch(groups.into_iter().map(Ragged::Leaf).collect())
}

/// Window assignment of a set of hits.
#[derive(Clone, Debug, PartialEq)]
pub struct Windows {
    /// Hit times relative to the pool minimum, ungrouped.
    pub t_sub: Ragged<f64>,
    /// Window index of every hit.
    pub mapping: Ragged<usize>,
    /// Window anchors, ordered like the grouped windows.
    pub anchors: Ragged<f64>,
}

impl Windows {
    /// Assigns the hits in `t` to windows of length `dt`.
    ///
    /// # Errors
    /// Returns an error when `t` and `pool` are misaligned.
    pub fn assign(t: &Ragged<f64>, pool: &Ragged<f64>, dt: f64) -> Result<Self> {
        let t_sub = subtract_min(t, pool)?;
        let sorted_anchors = map_aligned((&t_sub,), &mut |(times,): (&[f64],)| {
            Ok(Ragged::Leaf(define_windows(times, dt)))
        })?;
        let mapping = map_aligned(
            (&t_sub, &sorted_anchors),
            &mut |(times, anchors): (&[f64], &[f64])| {
                Ok(Ragged::Leaf(map_to_windows(times, anchors)))
            },
        )?;
        let anchors = map_aligned(
            (&mapping, &sorted_anchors),
            &mut |(mapping, anchors): (&[usize], &[f64])| {
                Ok(Ragged::Leaf(
                    first_appearance(mapping)
                        .into_iter()
                        .map(|j| anchors[j])
                        .collect(),
                ))
            },
        )?;
        Ok(Self {
            t_sub,
            mapping,
            anchors,
        })
    }

    /// Regroups an array aligned with the hits into windows, adding one level.
    ///
    /// # Errors
    /// Returns an error when `values` is not aligned with the hits.
    pub fn group<V: Clone>(&self, values: &Ragged<V>) -> Result<Ragged<V>> {
        map_aligned(
            (&self.mapping, values),
            &mut |(mapping, values): (&[usize], &[V])| {
                group_by_first_appearance(mapping, values).map(groups_to_ragged)
            },
        )
    }

    /// Relative hit times grouped into windows.
    ///
    /// # Errors
    /// Propagates alignment errors.
    pub fn grouped_t_sub(&self) -> Result<Ragged<f64>> {
        self.group(&self.t_sub)
    }
}

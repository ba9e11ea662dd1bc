//! Coincidence gating between two time series.

use g4post_core::{ensure_same_len, map_aligned, Ragged, Result};

/// Open interval `(t_min, t_max)` relative to a reference time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Gate {
    pub t_min: f64,
    pub t_max: f64,
}

impl Gate {
    #[must_use]
    pub fn new(t_min: f64, t_max: f64) -> Self {
        Self { t_min, t_max }
    }

    /// Companion indices inside the gate around `reference`, in companion order.
    ///
    /// `order` must list the companion indices sorted by time.
    fn select(self, reference: f64, times: &[f64], order: &[usize]) -> Vec<usize> {
        let low = reference + self.t_min;
        let high = reference + self.t_max;
        let start = order.partition_point(|&k| times[k] <= low);
        let end = order.partition_point(|&k| times[k] < high);
        if start >= end {
            return Vec::new();
        }
        let mut hits = order[start..end].to_vec();
        hits.sort_unstable();
        hits
    }
}

/// Collects, for every reference time, the companion values whose time lies
/// strictly inside the gate. Adds one level.
///
/// # Errors
/// Returns an error when the arrays are misaligned or a companion leaf's
/// times and values differ in length.
pub fn coincidences<V: Clone>(
    reference: &Ragged<f64>,
    companion: &Ragged<f64>,
    values: &Ragged<V>,
    gate: Gate,
) -> Result<Ragged<V>> {
    map_aligned(
        (reference, companion, values),
        &mut |(reference, times, values): (&[f64], &[f64], &[V])| {
            ensure_same_len("coincidence companion", times.len(), values.len())?;
            let mut order: Vec<usize> = (0..times.len()).collect();
            order.sort_by(|&a, &b| times[a].total_cmp(&times[b]));

            Ok(Ragged::Branch(
                reference
                    .iter()
                    .map(|&r| {
                        Ragged::Leaf(
                            gate.select(r, times, &order)
                                .into_iter()
                                .map(|k| values[k].clone())
                                .collect(),
                        )
                    })
                    .collect(),
            ))
        },
    )
}

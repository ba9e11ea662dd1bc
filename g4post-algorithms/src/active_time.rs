//! Detector livetime masking.
//!
//! Simulated events are spread over the recorded runs in proportion to each
//! run's livetime: the event at relative position `p` in its file belongs to
//! the run whose cumulative livetime share starts at or before `p`. Energy
//! deposited in a channel that was switched off during that run is zeroed.

use g4post_core::{ensure_same_len, map_aligned, Error, Ragged, Result};
use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Analysis status of a channel during one run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Usability {
    On,
    Off,
    /// Anti-coincidence only; energies are kept.
    Ac,
}

impl Usability {
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "on" => Some(Self::On),
            "off" => Some(Self::Off),
            "ac" => Some(Self::Ac),
            _ => None,
        }
    }
}

/// Read-only lookup of channel names and per-run channel usability.
pub trait RunRegistry: Send + Sync {
    /// Channel name of a sensitive-volume id, if the id maps to a channel.
    fn channel_name(&self, volume_id: i64) -> Option<&str>;

    /// Usability of `channel` in the run covering `relative_position`.
    fn usability(&self, relative_position: f64, channel: &str) -> Option<Usability>;
}

/// Splits a sensitive-volume id into `(string, position)`.
#[must_use]
pub fn string_and_position(volume_id: i64) -> (i64, i64) {
    let local = volume_id % 10_000;
    let position = local % 100;
    ((local - position) / 100, position)
}

/// One recorded run.
#[derive(Clone, Debug, PartialEq)]
pub struct Run {
    pub period: String,
    pub run: String,
    pub livetime_in_s: f64,
    pub usability: HashMap<String, Usability>,
}

/// In-memory [`RunRegistry`] built from a detector map and an ordered run list.
#[derive(Clone, Debug, Default)]
pub struct RunTable {
    channels: HashMap<(i64, i64), String>,
    runs: Vec<Run>,
    starts: Vec<f64>,
}

impl RunTable {
    /// Builds the table; `detectors` yields `(name, string, position)`.
    #[must_use]
    pub fn new<I>(detectors: I, runs: Vec<Run>) -> Self
    where
        I: IntoIterator<Item = (String, i64, i64)>,
    {
        let channels = detectors
            .into_iter()
            .map(|(name, string, position)| ((string, position), name))
            .collect();

        let total: f64 = runs.iter().map(|run| run.livetime_in_s).sum();
        let mut cumulative = 0.0;
        let starts = runs
            .iter()
            .map(|run| {
                let start = if total > 0.0 { cumulative / total } else { 0.0 };
                cumulative += run.livetime_in_s;
                start
            })
            .collect();

        Self {
            channels,
            runs,
            starts,
        }
    }

    #[must_use]
    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    /// Relative livetime start of every run.
    #[must_use]
    pub fn starts(&self) -> &[f64] {
        &self.starts
    }

    /// Run covering a relative position; positions outside every interval
    /// fall back to the last run.
    #[must_use]
    pub fn run_at(&self, relative_position: f64) -> Option<&Run> {
        let next = self.starts.partition_point(|&start| start <= relative_position);
        match next {
            0 => self.runs.last(),
            n => self.runs.get(n - 1),
        }
    }
}

impl RunRegistry for RunTable {
    fn channel_name(&self, volume_id: i64) -> Option<&str> {
        self.channels
            .get(&string_and_position(volume_id))
            .map(String::as_str)
    }

    fn usability(&self, relative_position: f64, channel: &str) -> Option<Usability> {
        self.run_at(relative_position)?.usability.get(channel).copied()
    }
}

fn masked_energy(edep: f64, volume_id: i64, position: f64, registry: &dyn RunRegistry) -> f64 {
    let usability = registry
        .channel_name(volume_id)
        .and_then(|channel| registry.usability(position, channel));
    if usability == Some(Usability::Off) {
        0.0
    } else {
        edep
    }
}

/// Zeroes energies deposited in channels that were off when each event was
/// recorded.
///
/// Top-level entry `i` is event `first_row + i` of a file with `total_rows`
/// events.
///
/// # Errors
/// Returns an error when `edep` and `vol` are misaligned or `total_rows` is
/// zero while events are present.
#[allow(clippy::cast_precision_loss)]
pub fn mask_inactive(
    edep: &Ragged<f64>,
    vol: &Ragged<i64>,
    first_row: usize,
    total_rows: usize,
    registry: &dyn RunRegistry,
) -> Result<Ragged<f64>> {
    ensure_same_len("livetime events", edep.len(), vol.len())?;
    if edep.is_empty() {
        return Ok(edep.clone());
    }
    if total_rows == 0 {
        return Err(Error::misaligned("events present in a file without rows"));
    }
    let position = |i: usize| (first_row + i) as f64 / total_rows as f64;

    match (edep, vol) {
        (Ragged::Leaf(energies), Ragged::Leaf(ids)) => Ok(Ragged::Leaf(
            energies
                .iter()
                .zip(ids)
                .enumerate()
                .map(|(i, (&e, &id))| masked_energy(e, id, position(i), registry))
                .collect(),
        )),
        (Ragged::Branch(events), Ragged::Branch(ids)) => {
            let mut out = Vec::with_capacity(events.len());
            for (i, (event, event_ids)) in events.iter().zip(ids).enumerate() {
                let rel = position(i);
                out.push(map_aligned(
                    (event, event_ids),
                    &mut |(energies, ids): (&[f64], &[i64])| {
                        ensure_same_len("livetime hits", energies.len(), ids.len())?;
                        Ok(Ragged::Leaf(
                            energies
                                .iter()
                                .zip(ids)
                                .map(|(&e, &id)| masked_energy(e, id, rel, registry))
                                .collect(),
                        ))
                    },
                )?);
            }
            Ok(Ragged::Branch(out))
        }
        _ => Err(Error::misaligned(
            "energy and volume arrays differ in nesting",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> RunTable {
        let usability = |a: Usability, b: Usability| {
            HashMap::from([("V01".to_string(), a), ("V02".to_string(), b)])
        };
        RunTable::new(
            [("V01".to_string(), 1, 1), ("V02".to_string(), 2, 9)],
            vec![
                Run {
                    period: "p03".to_string(),
                    run: "r000".to_string(),
                    livetime_in_s: 100.0,
                    usability: usability(Usability::On, Usability::Off),
                },
                Run {
                    period: "p03".to_string(),
                    run: "r001".to_string(),
                    livetime_in_s: 300.0,
                    usability: usability(Usability::Off, Usability::Ac),
                },
            ],
        )
    }

    #[test]
    fn test_volume_id_split() {
        assert_eq!(string_and_position(1_010_101), (1, 1));
        assert_eq!(string_and_position(1_010_209), (2, 9));
    }

    #[test]
    fn test_run_lookup() {
        let table = registry();
        assert_eq!(table.starts(), &[0.0, 0.25]);
        assert_eq!(table.run_at(0.0).unwrap().run, "r000");
        assert_eq!(table.run_at(0.24).unwrap().run, "r000");
        assert_eq!(table.run_at(0.25).unwrap().run, "r001");
        assert_eq!(table.run_at(0.99).unwrap().run, "r001");
        assert!(RunTable::default().run_at(0.5).is_none());
    }

    #[test]
    fn test_channel_names() {
        let table = registry();
        assert_eq!(table.channel_name(1_010_101), Some("V01"));
        assert_eq!(table.channel_name(1_010_209), Some("V02"));
        assert_eq!(table.channel_name(1_010_305), None);
    }

    #[test]
    fn test_off_channels_are_zeroed() {
        let table = registry();
        // four events: the first falls into r000, the rest into r001
        let edep = Ragged::<f64>::from(vec![
            vec![vec![0.03, 0.02]],
            vec![vec![0.04, 0.01]],
            vec![vec![0.05]],
            vec![],
        ]);
        let vol = Ragged::<i64>::from(vec![
            vec![vec![1_010_101, 1_010_209]],
            vec![vec![1_010_101, 1_010_209]],
            vec![vec![1_010_305]],
            vec![],
        ]);
        let out = mask_inactive(&edep, &vol, 0, 4, &table).unwrap();
        assert_eq!(
            out,
            Ragged::<f64>::from(vec![
                vec![vec![0.03, 0.0]],
                vec![vec![0.0, 0.01]],
                vec![vec![0.05]],
                vec![],
            ])
        );
    }

    #[test]
    fn test_positions_are_file_global() {
        let table = registry();
        let edep = Ragged::<f64>::from(vec![1.0]);
        let vol = Ragged::<i64>::from(vec![1_010_101]);
        // row 0 of 4 is in r000 where V01 is on
        assert_eq!(mask_inactive(&edep, &vol, 0, 4, &table).unwrap(), edep);
        // row 2 of 4 is in r001 where V01 is off
        assert_eq!(
            mask_inactive(&edep, &vol, 2, 4, &table).unwrap(),
            Ragged::<f64>::from(vec![0.0])
        );
    }
}

//! Grouping of hits by sensitive-volume id.

use crate::window::{group_by_first_appearance, groups_to_ragged};
use g4post_core::{map_aligned, Ragged, Result};

/// Ids below zero mark hits outside any sensitive volume.
pub const NO_DETECTOR: i64 = -1;

/// True where the volume id is one of `members`.
#[must_use]
pub fn group_mask(vol: &Ragged<i64>, members: &[i64]) -> Ragged<bool> {
    vol.map(|id| members.contains(id))
}

/// Buckets `values` by volume id, one sub-list per distinct id in order of
/// first appearance. Hits with a negative id are dropped.
///
/// # Errors
/// Returns an error when `vol` and `values` are misaligned.
pub fn group_by_id<V: Clone>(vol: &Ragged<i64>, values: &Ragged<V>) -> Result<Ragged<V>> {
    map_aligned((vol, values), &mut |(ids, values): (&[i64], &[V])| {
        g4post_core::ensure_same_len("volume ids", ids.len(), values.len())?;
        let (ids, values): (Vec<i64>, Vec<V>) = ids
            .iter()
            .zip(values)
            .filter(|(id, _)| **id > NO_DETECTOR)
            .map(|(id, value)| (*id, value.clone()))
            .unzip();
        group_by_first_appearance(&ids, &values).map(groups_to_ragged)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_by_first_appearance() {
        let vol = Ragged::<i64>::from(vec![1, 2, 1, 3, 2]);
        let values = Ragged::<i64>::from(vec![10, 20, 30, 40, 50]);
        assert_eq!(
            group_by_id(&vol, &values).unwrap(),
            Ragged::<i64>::from(vec![vec![10, 30], vec![20, 50], vec![40]])
        );
    }

    #[test]
    fn test_nested_ids() {
        let vol = Ragged::<i64>::from(vec![vec![1, 2], vec![1, 3]]);
        let values = Ragged::<i64>::from(vec![vec![10, 20], vec![30, 40]]);
        assert_eq!(
            group_by_id(&vol, &values).unwrap(),
            Ragged::<i64>::from(vec![vec![vec![10], vec![20]], vec![vec![30], vec![40]]])
        );
    }

    #[test]
    fn test_negative_ids_are_dropped() {
        let vol = Ragged::<i64>::from(vec![-1, 7, -1, 7]);
        let values = Ragged::<f64>::from(vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(
            group_by_id(&vol, &values).unwrap(),
            Ragged::<f64>::from(vec![vec![2.0, 4.0]])
        );
    }

    #[test]
    fn test_group_mask() {
        let vol = Ragged::<i64>::from(vec![vec![1, 2], vec![3]]);
        assert_eq!(
            group_mask(&vol, &[2, 3]),
            Ragged::<bool>::from(vec![vec![false, true], vec![true]])
        );
    }

    #[test]
    fn test_misaligned_values() {
        let vol = Ragged::<i64>::from(vec![1, 2]);
        let values = Ragged::<i64>::from(vec![1]);
        assert!(group_by_id(&vol, &values).is_err());
    }
}

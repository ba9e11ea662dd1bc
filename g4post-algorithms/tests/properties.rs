//! Property-based checks of the windowing, grouping, masking and gating rules.

use g4post_algorithms::window::{define_windows, map_to_windows};
use g4post_algorithms::{coincidences, group_by_id, r90_of_group, ActiveMask, Gate, Windows};
use g4post_core::Ragged;
use proptest::prelude::*;

fn times() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(0.0f64..1000.0, 0..40)
}

fn sorted_counts<T: Clone + PartialOrd>(mut values: Vec<T>) -> Vec<T> {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    values
}

proptest! {
    #[test]
    fn anchors_are_spaced_by_more_than_dt(values in times(), dt in 0.1f64..50.0) {
        let anchors = define_windows(&values, dt);
        for pair in anchors.windows(2) {
            prop_assert!(pair[1] > pair[0] + dt);
        }
        prop_assert_eq!(anchors.is_empty(), values.is_empty());
    }

    #[test]
    fn every_hit_lies_in_its_window(values in times(), dt in 0.1f64..50.0) {
        let anchors = define_windows(&values, dt);
        let mapping = map_to_windows(&values, &anchors);
        for (t, j) in values.iter().zip(&mapping) {
            prop_assert!(anchors[*j] <= *t);
            if let Some(next) = anchors.get(j + 1) {
                prop_assert!(*t < *next);
            }
        }
    }

    #[test]
    fn windowing_keeps_every_hit(values in times(), dt in 0.1f64..50.0) {
        let t = Ragged::Leaf(values.clone());
        let windows = Windows::assign(&t, &t, dt).unwrap();
        let grouped = windows.grouped_t_sub().unwrap();
        prop_assert_eq!(grouped.count(), values.len());
        prop_assert_eq!(grouped.len(), windows.anchors.len());
    }

    #[test]
    fn grouping_is_a_permutation(
        pairs in prop::collection::vec((-2i64..6, 0i64..1000), 0..40)
    ) {
        let (ids, values): (Vec<i64>, Vec<i64>) = pairs.iter().copied().unzip();
        let grouped = group_by_id(&Ragged::Leaf(ids.clone()), &Ragged::Leaf(values.clone())).unwrap();
        let kept: Vec<i64> = pairs.iter().filter(|(id, _)| *id >= 0).map(|(_, v)| *v).collect();
        prop_assert_eq!(sorted_counts(grouped.flatten()), sorted_counts(kept));

        let id_groups = group_by_id(&Ragged::Leaf(ids.clone()), &Ragged::Leaf(ids)).unwrap();
        if let Ragged::Branch(groups) = id_groups {
            for group in groups {
                let members = group.flatten();
                prop_assert!(members.iter().all(|id| *id == members[0]));
            }
        }
    }

    #[test]
    fn masked_arrays_stay_aligned(
        events in prop::collection::vec(prop::collection::vec((any::<bool>(), 0.0f64..10.0), 0..6), 0..10)
    ) {
        let mask = Ragged::Branch(
            events.iter().map(|e| Ragged::Leaf(e.iter().map(|(keep, _)| *keep).collect())).collect(),
        );
        let energy = Ragged::Branch(
            events.iter().map(|e| Ragged::Leaf(e.iter().map(|(_, v)| *v).collect())).collect(),
        );
        let active = ActiveMask::new(mask).unwrap();
        let masked_energy = active.apply(&energy).unwrap();
        let masked_index = active.apply(&energy.map(|v| v.to_bits())).unwrap();

        prop_assert_eq!(masked_energy.len(), masked_index.len());
        if let (Ragged::Branch(a), Ragged::Branch(b)) = (&masked_energy, &masked_index) {
            for (a, b) in a.iter().zip(b) {
                prop_assert!(!a.is_empty());
                prop_assert_eq!(a.len(), b.len());
            }
        }
    }

    #[test]
    fn coincidences_respect_open_gate(
        reference in prop::collection::vec(0.0f64..100.0, 0..10),
        companion in prop::collection::vec(0.0f64..100.0, 0..20),
        t_min in -5.0f64..0.0,
        t_max in 0.0f64..5.0,
    ) {
        let out = coincidences(
            &Ragged::Leaf(reference.clone()),
            &Ragged::Leaf(companion.clone()),
            &Ragged::Leaf(companion.clone()),
            Gate::new(t_min, t_max),
        )
        .unwrap();
        prop_assert_eq!(out.len(), reference.len());
        if let Ragged::Branch(rows) = out {
            for (r, row) in reference.iter().zip(rows) {
                let expected: Vec<f64> = companion
                    .iter()
                    .copied()
                    .filter(|c| *c > r + t_min && *c < r + t_max)
                    .collect();
                prop_assert_eq!(row.flatten(), expected);
            }
        }
    }

    #[test]
    fn r90_ignores_hit_order(
        hits in prop::collection::vec((0.1f64..10.0, -5.0f64..5.0, -5.0f64..5.0), 1..12)
    ) {
        let edep: Vec<f64> = hits.iter().map(|h| h.0).collect();
        let x: Vec<f64> = hits.iter().map(|h| h.1).collect();
        let y: Vec<f64> = hits.iter().map(|h| h.2).collect();
        let z = vec![0.0; hits.len()];
        let forward = r90_of_group(&edep, &x, &y, &z);

        let rev = |v: &[f64]| v.iter().rev().copied().collect::<Vec<_>>();
        let backward = r90_of_group(&rev(&edep), &rev(&x), &rev(&y), &z);
        prop_assert!((forward - backward).abs() < 1e-9);
        prop_assert!(forward >= 0.0);
    }
}

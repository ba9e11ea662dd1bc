//! R90: radius around the energy-weighted centroid that contains 90 % of
//! a hit group's deposited energy.

use g4post_core::{ensure_same_len, map_aligned, Ragged, Result};

/// Fraction of the total energy the radius has to enclose.
pub const CONTAINED_FRACTION: f64 = 0.9;

/// R90 of a single hit group.
///
/// Returns 0 for an empty group and for a group without deposited energy.
#[must_use]
pub fn r90_of_group(edep: &[f64], x: &[f64], y: &[f64], z: &[f64]) -> f64 {
    let total: f64 = edep.iter().sum();
    if edep.is_empty() || total == 0.0 {
        return 0.0;
    }

    let weighted = |pos: &[f64]| edep.iter().zip(pos).map(|(e, p)| e * p).sum::<f64>() / total;
    let centroid = [weighted(x), weighted(y), weighted(z)];

    let mut hits: Vec<(f64, f64)> = (0..edep.len())
        .map(|i| {
            let dx = x[i] - centroid[0];
            let dy = y[i] - centroid[1];
            let dz = z[i] - centroid[2];
            ((dx * dx + dy * dy + dz * dz).sqrt(), edep[i])
        })
        .collect();
    hits.sort_by(|a, b| a.0.total_cmp(&b.0));

    let threshold = CONTAINED_FRACTION * total;
    let mut cumulative = 0.0;
    for &(distance, energy) in &hits {
        cumulative += energy;
        if cumulative >= threshold {
            return distance;
        }
    }
    // only reachable through rounding or negative deposits; take the first hit like argmax would
    hits[0].0
}

/// R90 of every innermost group, removing one level.
///
/// # Errors
/// Returns an error when the four arrays are misaligned.
pub fn r90(
    edep: &Ragged<f64>,
    x: &Ragged<f64>,
    y: &Ragged<f64>,
    z: &Ragged<f64>,
) -> Result<Ragged<f64>> {
    map_aligned(
        (edep, x, y, z),
        &mut |(edep, x, y, z): (&[f64], &[f64], &[f64], &[f64])| {
            ensure_same_len("r90 position x", edep.len(), x.len())?;
            ensure_same_len("r90 position y", edep.len(), y.len())?;
            ensure_same_len("r90 position z", edep.len(), z.len())?;
            Ok(Ragged::Scalar(r90_of_group(edep, x, y, z)))
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_two_hit_group() {
        let edep = Ragged::<f64>::from(vec![vec![90.0, 10.0]]);
        let x = Ragged::<f64>::from(vec![vec![1.0, 2.0]]);
        let out = r90(&edep, &x, &x, &x).unwrap();
        let Ragged::Leaf(values) = out else {
            panic!("expected one value per group");
        };
        // centroid at 1.1 on every axis, the 90 keV hit sits 0.1 * sqrt(3) away
        assert_relative_eq!(values[0], 0.1 * 3.0_f64.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(values[0], 0.173, epsilon = 1e-3);
    }

    #[test]
    fn test_empty_and_zero_energy_groups() {
        assert_eq!(r90_of_group(&[], &[], &[], &[]), 0.0);
        assert_eq!(r90_of_group(&[0.0, 0.0], &[1.0, 5.0], &[0.0, 0.0], &[0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_single_hit() {
        assert_eq!(r90_of_group(&[5.0], &[3.0], &[4.0], &[0.0]), 0.0);
    }

    #[test]
    fn test_nested_groups() {
        let edep = Ragged::<f64>::from(vec![vec![vec![1.0]], vec![]]);
        let pos = Ragged::<f64>::from(vec![vec![vec![2.0]], vec![]]);
        let out = r90(&edep, &pos, &pos, &pos).unwrap();
        assert_eq!(out, Ragged::<f64>::from(vec![vec![0.0], vec![]]));
    }

    #[test]
    fn test_misaligned_positions() {
        let edep = Ragged::<f64>::from(vec![vec![1.0, 2.0]]);
        let short = Ragged::<f64>::from(vec![vec![1.0]]);
        assert!(r90(&edep, &short, &short, &short).is_err());
    }
}

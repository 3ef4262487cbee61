//! Brute-force Hamming matching with a mutual-nearest (cross) check.

use crate::orb::{hamming, Descriptor};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureMatch {
    pub template_idx: usize,
    pub captured_idx: usize,
    pub distance: u32,
}

fn nearest(query: &Descriptor, train: &[Descriptor]) -> Option<(usize, u32)> {
    train
        .iter()
        .enumerate()
        .map(|(i, d)| (i, hamming(query, d)))
        .min_by_key(|&(i, d)| (d, i))
}

/// Pairs that are each other's nearest neighbour, sorted by distance.
pub fn match_mutual(template: &[Descriptor], captured: &[Descriptor]) -> Vec<FeatureMatch> {
    if template.is_empty() || captured.is_empty() {
        return Vec::new();
    }
    let forward: Vec<Option<(usize, u32)>> =
        template.par_iter().map(|d| nearest(d, captured)).collect();
    let backward: Vec<Option<(usize, u32)>> =
        captured.par_iter().map(|d| nearest(d, template)).collect();

    let mut out: Vec<FeatureMatch> = forward
        .iter()
        .enumerate()
        .filter_map(|(ti, f)| {
            let (ci, distance) = (*f)?;
            let (back, _) = backward[ci]?;
            (back == ti).then_some(FeatureMatch {
                template_idx: ti,
                captured_idx: ci,
                distance,
            })
        })
        .collect();
    out.sort_by_key(|m| (m.distance, m.template_idx));
    out
}

/// Keep the best `max(4, floor(n * fraction))` matches of a sorted list.
pub fn retain_best(matches: &mut Vec<FeatureMatch>, fraction: f32) {
    let keep = ((matches.len() as f32 * fraction.clamp(0.0, 1.0)) as usize).max(4);
    matches.truncate(keep);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(seed: u64) -> Descriptor {
        let mut s = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
        let mut d = [0u64; 4];
        for w in &mut d {
            s ^= s << 13;
            s ^= s >> 7;
            s ^= s << 17;
            *w = s;
        }
        d
    }

    #[test]
    fn mutual_matches_recover_permutation() {
        let template: Vec<Descriptor> = (1..=6).map(desc).collect();
        let captured: Vec<Descriptor> = [4u64, 2, 6, 1, 5, 3].iter().map(|&s| desc(s)).collect();
        let m = match_mutual(&template, &captured);
        assert_eq!(m.len(), 6);
        for fm in &m {
            assert_eq!(fm.distance, 0);
            assert_eq!(template[fm.template_idx], captured[fm.captured_idx]);
        }
    }

    #[test]
    fn non_mutual_pairs_are_dropped() {
        let a = desc(1);
        let mut near_a = a;
        near_a[0] ^= 0b111;
        // both captured descriptors prefer template 0, only one can win
        let template = vec![a, desc(99)];
        let captured = vec![near_a, a];
        let m = match_mutual(&template, &captured);
        assert!(m.iter().all(|fm| fm.template_idx != 0 || fm.captured_idx == 1));
    }

    #[test]
    fn retain_best_keeps_at_least_four() {
        let mut m: Vec<FeatureMatch> = (0..10)
            .map(|i| FeatureMatch {
                template_idx: i,
                captured_idx: i,
                distance: i as u32,
            })
            .collect();
        retain_best(&mut m, 0.2);
        assert_eq!(m.len(), 4);
        let mut m2 = m.clone();
        retain_best(&mut m2, 0.0);
        assert_eq!(m2.len(), 4);
    }
}

//! Per-slot presentation metadata.
//!
//! When a study pseudo-randomizes its question order, every slot gets
//! a permutation of the question numbers; every question with a
//! randomized scale gets a per-slot permutation of its scale-value
//! numbers. Both are stored comma-joined so presentation order is
//! recoverable from a stored slot without re-running the randomizer.
//!
//! Permutations are drawn from the pool of all orderings, tiled to the
//! slot count and shuffled, so the pool is used evenly. Beyond a small
//! factorial bound the pool would not fit in memory and the generator
//! falls back to independent shuffles per slot.

use rand::seq::SliceRandom;
use rand::Rng;

/// Largest `n` for which all `n!` permutations are materialized.
const PERMUTATION_POOL_MAX: usize = 6;

fn all_permutations(n: usize) -> Vec<Vec<usize>> {
    let mut result = Vec::new();
    let mut current: Vec<usize> = (0..n).collect();
    permute(&mut current, 0, &mut result);
    result
}

fn permute(values: &mut Vec<usize>, start: usize, out: &mut Vec<Vec<usize>>) {
    if start == values.len() {
        out.push(values.clone());
        return;
    }
    for i in start..values.len() {
        values.swap(start, i);
        permute(values, start + 1, out);
        values.swap(start, i);
    }
}

/// Draw `count` permutations of `{0..n-1}`, one per slot.
pub fn draw_permutations<R: Rng + ?Sized>(
    n: usize,
    count: usize,
    rng: &mut R,
) -> Vec<Vec<usize>> {
    if n == 0 || count == 0 {
        return vec![Vec::new(); count];
    }
    if n <= PERMUTATION_POOL_MAX {
        let pool = all_permutations(n);
        let per_permutation = count.div_ceil(pool.len());
        let mut tiled: Vec<Vec<usize>> = Vec::with_capacity(per_permutation * pool.len());
        for _ in 0..per_permutation {
            tiled.extend(pool.iter().cloned());
        }
        tiled.shuffle(rng);
        tiled.truncate(count);
        tiled
    } else {
        (0..count)
            .map(|_| {
                let mut permutation: Vec<usize> = (0..n).collect();
                permutation.shuffle(rng);
                permutation
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn is_permutation(values: &[usize], n: usize) -> bool {
        let mut sorted = values.to_vec();
        sorted.sort_unstable();
        sorted == (0..n).collect::<Vec<_>>()
    }

    #[test]
    fn pool_has_factorial_size() {
        assert_eq!(all_permutations(3).len(), 6);
        assert_eq!(all_permutations(1), vec![vec![0]]);
    }

    #[test]
    fn drawn_values_are_permutations() {
        let mut rng = StdRng::seed_from_u64(11);
        for permutation in draw_permutations(4, 50, &mut rng) {
            assert!(is_permutation(&permutation, 4));
        }
    }

    #[test]
    fn pool_is_used_evenly() {
        // 12 slots over 3! = 6 permutations: each appears exactly twice.
        let mut rng = StdRng::seed_from_u64(5);
        let drawn = draw_permutations(3, 12, &mut rng);
        for permutation in all_permutations(3) {
            assert_eq!(drawn.iter().filter(|p| **p == permutation).count(), 2);
        }
    }

    #[test]
    fn large_n_falls_back_to_plain_shuffles() {
        let mut rng = StdRng::seed_from_u64(9);
        for permutation in draw_permutations(9, 4, &mut rng) {
            assert!(is_permutation(&permutation, 9));
        }
    }

    #[test]
    fn zero_questions() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(draw_permutations(0, 3, &mut rng), vec![Vec::<usize>::new(); 3]);
    }
}

/// Number of r-subsets of an n-element set, or `None` when it overflows u128.
pub fn binomial(n: usize, r: usize) -> Option<u128> {
    if r > n {
        return Some(0);
    }
    let r = r.min(n - r);
    let mut result: u128 = 1;
    for step in 0..r {
        // result * (n - step) is always divisible by (step + 1) at this point.
        result = result.checked_mul((n - step) as u128)? / (step as u128 + 1);
    }
    Some(result)
}

/// Saturating variant of [`binomial`] for display and progress totals.
pub fn combination_count(n: usize, r: usize) -> u128 {
    binomial(n, r).unwrap_or(u128::MAX)
}

/// Lexicographic r-combinations of the indices `0..n`.
///
/// Each step advances the rightmost index that can still grow and resets every
/// index to its right to the smallest valid value, so tuples come out as
/// `[0, 1, 2]`, `[0, 1, 3]`, ..., `[n - 3, n - 2, n - 1]`.
#[derive(Debug, Clone)]
pub struct CombinationIndices {
    n: usize,
    indices: Vec<usize>,
    started: bool,
    done: bool,
}

impl CombinationIndices {
    pub fn new(n: usize, r: usize) -> Self {
        Self {
            n,
            indices: (0..r).collect(),
            started: false,
            done: r > n,
        }
    }

    fn advance(&mut self) -> bool {
        let r = self.indices.len();
        let Some(pivot) = (0..r).rev().find(|&i| self.indices[i] < self.n - r + i) else {
            return false;
        };
        self.indices[pivot] += 1;
        for i in pivot + 1..r {
            self.indices[i] = self.indices[i - 1] + 1;
        }
        true
    }
}

impl Iterator for CombinationIndices {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.started && !self.advance() {
            self.done = true;
            return None;
        }
        self.started = true;
        Some(self.indices.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::{binomial, combination_count, CombinationIndices};

    #[test]
    fn binomial_matches_known_values() {
        assert_eq!(binomial(3, 2), Some(3));
        assert_eq!(binomial(5, 0), Some(1));
        assert_eq!(binomial(5, 5), Some(1));
        assert_eq!(binomial(10, 3), Some(120));
        assert_eq!(binomial(52, 5), Some(2_598_960));
        assert_eq!(binomial(2, 3), Some(0));
    }

    #[test]
    fn binomial_overflow_saturates_count() {
        assert_eq!(binomial(1_000, 500), None);
        assert_eq!(combination_count(1_000, 500), u128::MAX);
    }

    #[test]
    fn indices_follow_lexicographic_order() {
        let tuples: Vec<Vec<usize>> = CombinationIndices::new(4, 2).collect();
        assert_eq!(
            tuples,
            vec![
                vec![0, 1],
                vec![0, 2],
                vec![0, 3],
                vec![1, 2],
                vec![1, 3],
                vec![2, 3],
            ]
        );
    }

    #[test]
    fn indices_cover_every_subset_once() {
        for n in 0..8 {
            for r in 1..=n {
                let tuples: Vec<Vec<usize>> = CombinationIndices::new(n, r).collect();
                let distinct: HashSet<Vec<usize>> = tuples.iter().cloned().collect();
                assert_eq!(tuples.len() as u128, combination_count(n, r), "n={n} r={r}");
                assert_eq!(distinct.len(), tuples.len());
                assert!(tuples
                    .iter()
                    .all(|tuple| tuple.windows(2).all(|pair| pair[0] < pair[1])));
            }
        }
    }

    #[test]
    fn edge_sizes() {
        assert_eq!(CombinationIndices::new(2, 3).count(), 0);
        assert_eq!(
            CombinationIndices::new(3, 0).collect::<Vec<_>>(),
            vec![Vec::<usize>::new()]
        );
        assert_eq!(
            CombinationIndices::new(3, 3).collect::<Vec<_>>(),
            vec![vec![0, 1, 2]]
        );
    }
}

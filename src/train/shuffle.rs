use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{Error, Result};

/// Reorders `left` and `right` with one shared random permutation, so pairs
/// `(left[i], right[i])` stay together.
pub fn shuffle_lockstep<A, B, R: Rng + ?Sized>(left: &mut [A], right: &mut [B], rng: &mut R) -> Result<()> {
    if left.len() != right.len() {
        return Err(Error::LengthMismatch {
            context: "lockstep shuffle",
            expected: left.len(),
            actual: right.len(),
        });
    }
    let mut order: Vec<usize> = (0..left.len()).collect();
    order.shuffle(rng);
    apply_permutation(left, &order);
    apply_permutation(right, &order);
    Ok(())
}

/// Moves `items[order[i]]` to position `i`.
fn apply_permutation<A>(items: &mut [A], order: &[usize]) {
    let mut placed = vec![false; items.len()];
    for start in 0..items.len() {
        if placed[start] {
            continue;
        }
        // walk the cycle through `start`
        let mut current = start;
        loop {
            placed[current] = true;
            let next = order[current];
            if next == start {
                break;
            }
            items.swap(current, next);
            current = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_pairs_stay_together() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut xs: Vec<u32> = (0..50).collect();
        let mut ys: Vec<u32> = (0..50).map(|x| x * 10).collect();
        shuffle_lockstep(&mut xs, &mut ys, &mut rng).unwrap();
        assert_ne!(xs, (0..50).collect::<Vec<_>>());
        for (x, y) in xs.iter().zip(&ys) {
            assert_eq!(x * 10, *y);
        }
        let mut sorted = xs.clone();
        sorted.sort();
        assert_eq!(sorted, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_apply_permutation() {
        let mut items = vec!['a', 'b', 'c', 'd'];
        apply_permutation(&mut items, &[2, 0, 3, 1]);
        assert_eq!(items, vec!['c', 'a', 'd', 'b']);
    }

    #[test]
    fn test_length_mismatch() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(shuffle_lockstep(&mut [1, 2], &mut [1], &mut rng).is_err());
    }
}

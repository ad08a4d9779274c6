use rand::Rng;
use serde::{Deserialize, Serialize};

/// Return a uniformly shuffled copy of `items`. The input is untouched.
pub fn fisher_yates_shuffle<T: Clone, R: Rng + ?Sized>(items: &[T], rng: &mut R) -> Vec<T> {
    let mut out = items.to_vec();
    for i in (1..out.len()).rev() {
        let j = rng.gen_range(0..=i);
        out.swap(i, j);
    }
    out
}

/// Items handed to one target by a shuffle-assign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub target: String,
    pub items: Vec<String>,
}

/// Shuffle both lists, then deal items round-robin over the shuffled targets.
///
/// Item `i` of the shuffled items goes to target `i % targets.len()`, so
/// counts differ by at most one between targets. Assignments are returned in
/// shuffled target order; every target is present even when it received
/// nothing.
pub fn shuffle_assign<R: Rng + ?Sized>(
    items: &[String],
    targets: &[String],
    rng: &mut R,
) -> Vec<Assignment> {
    let items = fisher_yates_shuffle(items, rng);
    let targets = fisher_yates_shuffle(targets, rng);
    if targets.is_empty() {
        return vec![];
    }

    let mut assignments: Vec<Assignment> = targets
        .into_iter()
        .map(|target| Assignment {
            target,
            items: vec![],
        })
        .collect();
    let count = assignments.len();
    for (i, item) in items.into_iter().enumerate() {
        assignments[i % count].items.push(item);
    }
    assignments
}

/// Flag key written for one target.
pub fn flag_key(prefix: &str, target: &str) -> String {
    format!("{}_{}", prefix, target)
}

/// The `(key, value)` flags a finished assignment writes.
pub fn assignment_flags(prefix: &str, assignments: &[Assignment]) -> Vec<(String, String)> {
    assignments
        .iter()
        .filter(|a| !a.target.trim().is_empty())
        .map(|a| (flag_key(prefix, &a.target), a.items.join(", ")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn sorted<T: Ord + Clone>(v: &[T]) -> Vec<T> {
        let mut v = v.to_vec();
        v.sort();
        v
    }

    #[test]
    fn test_shuffle_preserves_multiset() {
        let mut rng = StdRng::seed_from_u64(1);
        for input in [vec![], vec![7], vec![1, 2], vec![3, 1, 4, 1, 5, 9, 2, 6, 5, 3]] {
            let out = fisher_yates_shuffle(&input, &mut rng);
            assert_eq!(out.len(), input.len());
            assert_eq!(sorted(&out), sorted(&input));
        }
    }

    #[test]
    fn test_shuffle_does_not_mutate_input() {
        let input = vec![1, 2, 3, 4, 5];
        let mut rng = StdRng::seed_from_u64(2);
        let _ = fisher_yates_shuffle(&input, &mut rng);
        assert_eq!(input, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_shuffle_deterministic_with_seed() {
        let input: Vec<u32> = (0..20).collect();
        let a = fisher_yates_shuffle(&input, &mut StdRng::seed_from_u64(42));
        let b = fisher_yates_shuffle(&input, &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_shuffle_reaches_every_position() {
        // Each element should land in the first slot at some point.
        let input = vec!['a', 'b', 'c'];
        let mut rng = StdRng::seed_from_u64(3);
        let mut firsts = std::collections::HashSet::new();
        for _ in 0..200 {
            firsts.insert(fisher_yates_shuffle(&input, &mut rng)[0]);
        }
        assert_eq!(firsts.len(), 3);
    }

    #[test]
    fn test_round_robin_spread() {
        let items = strings(&["a", "b", "c", "d", "e"]);
        let targets = strings(&["x", "y"]);
        let mut rng = StdRng::seed_from_u64(9);
        let result = shuffle_assign(&items, &targets, &mut rng);

        assert_eq!(result.len(), 2);
        let mut sizes: Vec<_> = result.iter().map(|a| a.items.len()).collect();
        sizes.sort();
        assert_eq!(sizes, vec![2, 3]);

        let all: Vec<String> = result.iter().flat_map(|a| a.items.clone()).collect();
        assert_eq!(sorted(&all), items);
    }

    #[test]
    fn test_more_targets_than_items() {
        let items = strings(&["knife"]);
        let targets = strings(&["alice", "bob", "carol"]);
        let result = shuffle_assign(&items, &targets, &mut StdRng::seed_from_u64(5));
        assert_eq!(result.len(), 3);
        assert_eq!(result.iter().filter(|a| a.items.is_empty()).count(), 2);
    }

    #[test]
    fn test_assignment_flags() {
        let assignments = vec![
            Assignment {
                target: "alice".into(),
                items: strings(&["knife", "rope"]),
            },
            Assignment {
                target: "bob".into(),
                items: vec![],
            },
        ];
        let flags = assignment_flags("item", &assignments);
        assert_eq!(
            flags,
            vec![
                ("item_alice".to_string(), "knife, rope".to_string()),
                ("item_bob".to_string(), String::new()),
            ]
        );
    }
}

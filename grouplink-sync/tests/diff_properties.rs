//! Property tests for the membership diff and the step cursor.

use std::collections::BTreeSet;

use grouplink_sync::diff::{diff, PairMap};
use grouplink_sync::StepCursor;
use proptest::prelude::*;

/// Source ids 0..40 map to target id + 1000 when `linked` contains them.
fn mapping(linked: &BTreeSet<u32>) -> PairMap<u32, u32> {
    PairMap::new(linked.iter().map(|s| (*s, s + 1000)))
}

proptest! {
    #[test]
    fn never_removes_members_without_source_identity(
        source in proptest::collection::vec(0u32..40, 0..30),
        target in proptest::collection::vec(990u32..1040, 0..30),
        linked in proptest::collection::btree_set(0u32..40, 0..40),
    ) {
        let mut map = mapping(&linked);
        let out = diff(&source, &target, &mut map).unwrap();
        for (origin, member) in &out.to_remove {
            prop_assert!(linked.contains(origin));
            prop_assert_eq!(*member, origin + 1000);
            prop_assert!(!source.contains(origin));
        }
        for member in &out.orphaned {
            prop_assert!(*member < 1000 || !linked.contains(&(member - 1000)));
        }
    }

    #[test]
    fn applying_diff_converges_mapped_sets(
        source in proptest::collection::vec(0u32..40, 0..30),
        target in proptest::collection::vec(1000u32..1040, 0..30),
        linked in proptest::collection::btree_set(0u32..40, 0..40),
    ) {
        let mut map = mapping(&linked);
        let out = diff(&source, &target, &mut map).unwrap();

        let mut after: BTreeSet<u32> = target.iter().copied().collect();
        after.extend(out.to_add.iter().map(|(_, t)| *t));
        for (_, t) in &out.to_remove {
            after.remove(t);
        }

        let mapped_after: BTreeSet<u32> = after
            .iter()
            .filter(|t| linked.contains(&(*t - 1000)))
            .copied()
            .collect();
        let expected: BTreeSet<u32> = source
            .iter()
            .filter(|s| linked.contains(s))
            .map(|s| s + 1000)
            .collect();
        prop_assert_eq!(mapped_after, expected);

        let mut again = mapping(&linked);
        let second = diff(&source, &after.iter().copied().collect::<Vec<_>>(), &mut again).unwrap();
        prop_assert!(second.is_converged());
    }

    #[test]
    fn cursor_moves_by_exactly_step_size(step in 0u64..50, calls in 0usize..40) {
        let mut cursor = StepCursor::new(step);
        let mut previous = cursor.get();
        for _ in 0..calls {
            cursor.next();
            prop_assert_eq!(cursor.get(), previous + step);
            previous = cursor.get();
        }
    }
}

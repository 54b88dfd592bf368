//! Set difference between one group's members on two sides.
//!
//! The engine compares *identities*, not raw ids: a source member only counts
//! as present on the target side when it maps to a target member through an
//! [`IdentityMap`]. Target members with no inverse mapping are never removed.

use std::collections::{HashMap, HashSet};
use std::convert::Infallible;
use std::hash::Hash;

/// Bidirectional member mapping between a source and a target side.
pub trait IdentityMap<S, T> {
    type Error;

    fn forward(&mut self, source: S) -> Result<Option<T>, Self::Error>;

    fn inverse(&mut self, target: T) -> Result<Option<S>, Self::Error>;
}

/// Result of comparing source members against target members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipDiff<S, T> {
    /// Mapped source members missing on the target side.
    pub to_add: Vec<(S, T)>,
    /// Mapped source members already on the target side.
    pub present: Vec<(S, T)>,
    /// Target members whose source counterpart left the source group.
    pub to_remove: Vec<(S, T)>,
    /// Source members with no target identity.
    pub unmapped: Vec<S>,
    /// Target members with no source identity; preserved.
    pub orphaned: Vec<T>,
}

impl<S, T> Default for MembershipDiff<S, T> {
    fn default() -> Self {
        Self {
            to_add: vec![],
            present: vec![],
            to_remove: vec![],
            unmapped: vec![],
            orphaned: vec![],
        }
    }
}

impl<S, T> MembershipDiff<S, T> {
    /// Nothing to add and nothing to remove.
    pub fn is_converged(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Additive half of a diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Additions<S, T> {
    pub to_add: Vec<(S, T)>,
    pub present: Vec<(S, T)>,
    pub unmapped: Vec<S>,
}

/// Subtractive half of a diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removals<S, T> {
    pub to_remove: Vec<(S, T)>,
    pub orphaned: Vec<T>,
}

/// Map every source member forward and split by presence in `target`.
pub fn additions<S, T, M>(
    source: &[S],
    target: &[T],
    map: &mut M,
) -> Result<Additions<S, T>, M::Error>
where
    S: Copy + Eq + Hash,
    T: Copy + Eq + Hash,
    M: IdentityMap<S, T>,
{
    let target_set: HashSet<T> = target.iter().copied().collect();
    let mut out = Additions {
        to_add: vec![],
        present: vec![],
        unmapped: vec![],
    };
    for member in dedup(source) {
        match map.forward(member)? {
            Some(mapped) if target_set.contains(&mapped) => out.present.push((member, mapped)),
            Some(mapped) => out.to_add.push((member, mapped)),
            None => out.unmapped.push(member),
        }
    }
    Ok(out)
}

/// Map every target member back and collect those whose source left.
pub fn removals<S, T, M>(
    source: &[S],
    target: &[T],
    map: &mut M,
) -> Result<Removals<S, T>, M::Error>
where
    S: Copy + Eq + Hash,
    T: Copy + Eq + Hash,
    M: IdentityMap<S, T>,
{
    let source_set: HashSet<S> = source.iter().copied().collect();
    let mut out = Removals {
        to_remove: vec![],
        orphaned: vec![],
    };
    for member in dedup(target) {
        match map.inverse(member)? {
            Some(origin) if source_set.contains(&origin) => {}
            Some(origin) => out.to_remove.push((origin, member)),
            None => out.orphaned.push(member),
        }
    }
    Ok(out)
}

/// Both halves in one pass over each side.
pub fn diff<S, T, M>(
    source: &[S],
    target: &[T],
    map: &mut M,
) -> Result<MembershipDiff<S, T>, M::Error>
where
    S: Copy + Eq + Hash,
    T: Copy + Eq + Hash,
    M: IdentityMap<S, T>,
{
    let Additions {
        to_add,
        present,
        unmapped,
    } = additions(source, target, map)?;
    let Removals {
        to_remove,
        orphaned,
    } = removals(source, target, map)?;
    Ok(MembershipDiff {
        to_add,
        present,
        to_remove,
        unmapped,
        orphaned,
    })
}

fn dedup<X: Copy + Eq + Hash>(items: &[X]) -> impl Iterator<Item = X> + '_ {
    let mut seen = HashSet::new();
    items.iter().copied().filter(move |x| seen.insert(*x))
}

/// A fixed one-to-one mapping, built from `(source, target)` pairs.
#[derive(Debug, Clone, Default)]
pub struct PairMap<S, T> {
    forward: HashMap<S, T>,
    inverse: HashMap<T, S>,
}

impl<S, T> PairMap<S, T>
where
    S: Copy + Eq + Hash,
    T: Copy + Eq + Hash,
{
    pub fn new(pairs: impl IntoIterator<Item = (S, T)>) -> Self {
        let mut map = Self {
            forward: HashMap::new(),
            inverse: HashMap::new(),
        };
        for (s, t) in pairs {
            map.forward.insert(s, t);
            map.inverse.insert(t, s);
        }
        map
    }
}

impl<S, T> IdentityMap<S, T> for PairMap<S, T>
where
    S: Copy + Eq + Hash,
    T: Copy + Eq + Hash,
{
    type Error = Infallible;

    fn forward(&mut self, source: S) -> Result<Option<T>, Infallible> {
        Ok(self.forward.get(&source).copied())
    }

    fn inverse(&mut self, target: T) -> Result<Option<S>, Infallible> {
        Ok(self.inverse.get(&target).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(pairs: &[(u32, u32)]) -> PairMap<u32, u32> {
        PairMap::new(pairs.iter().copied())
    }

    #[test]
    fn splits_source_into_add_present_unmapped() {
        let mut map = identity(&[(1, 101), (2, 102), (3, 103)]);
        let out = additions(&[1, 2, 3, 4], &[102], &mut map).unwrap();
        assert_eq!(out.to_add, vec![(1, 101), (3, 103)]);
        assert_eq!(out.present, vec![(2, 102)]);
        assert_eq!(out.unmapped, vec![4]);
    }

    #[test]
    fn removes_only_members_with_known_origin() {
        let mut map = identity(&[(1, 101), (2, 102)]);
        let out = removals(&[1], &[101, 102, 999], &mut map).unwrap();
        assert_eq!(out.to_remove, vec![(2, 102)]);
        assert_eq!(out.orphaned, vec![999]);
    }

    #[test]
    fn duplicates_are_ignored_and_order_kept() {
        let mut map = identity(&[(3, 13), (1, 11), (2, 12)]);
        let out = additions(&[3, 1, 3, 2, 1], &[], &mut map).unwrap();
        let added: Vec<u32> = out.to_add.iter().map(|(s, _)| *s).collect();
        assert_eq!(added, vec![3, 1, 2]);
    }

    #[test]
    fn equal_sets_converge() {
        let mut map = identity(&[(1, 11), (2, 12)]);
        let out = diff(&[2, 1], &[11, 12], &mut map).unwrap();
        assert!(out.is_converged());
        assert_eq!(out.present.len(), 2);
    }

    #[test]
    fn empty_source_removes_every_mapped_target() {
        let mut map = identity(&[(1, 11), (2, 12)]);
        let out = diff(&[], &[11, 12, 77], &mut map).unwrap();
        assert_eq!(out.to_remove, vec![(1, 11), (2, 12)]);
        assert_eq!(out.orphaned, vec![77]);
        assert!(out.to_add.is_empty());
    }

    #[test]
    fn map_errors_propagate() {
        struct Broken;
        impl IdentityMap<u32, u32> for Broken {
            type Error = &'static str;
            fn forward(&mut self, _: u32) -> Result<Option<u32>, Self::Error> {
                Err("offline")
            }
            fn inverse(&mut self, _: u32) -> Result<Option<u32>, Self::Error> {
                Err("offline")
            }
        }
        assert_eq!(additions(&[1], &[], &mut Broken), Err("offline"));
        assert_eq!(removals::<u32, u32, _>(&[], &[], &mut Broken).map(|r| r.orphaned), Ok(vec![]));
    }
}

//! Archetype filtering by tag and component-type constraints.
//!
//! A [`QueryFilter`] holds four tag constraint sets and four component
//! constraint sets (`all`, `any`, `without_all`, `without_any`). The same
//! match algorithm is applied to an archetype's tag set and its
//! component-type set; an archetype matches only if both agree.
//!
//! The `any`/`all` interaction is deliberately asymmetric: when `any` is
//! non-empty and none of its members are present, a non-empty `all` set
//! acts as a fallback acceptance path. Query results depend on this
//! precedence, so it is pinned by tests and must not be "simplified".
//!
//! By default `without_any_tags` contains the built-in
//! [`Disabled`](crate::engine::registry::Disabled) tag, so disabled
//! entities never match; [`QueryFilter::with_disabled`] opts back in.

use crate::engine::bitset::Bitset;
use crate::engine::types::{ComponentTypes, Tags, DISABLED_TAG};

/// Tag and component-type constraints applied to archetypes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueryFilter {
    all_tags: Bitset,
    all_tags_count: usize,
    any_tags: Bitset,
    any_tags_count: usize,
    without_all_tags: Bitset,
    without_all_tags_count: usize,
    without_any_tags: Bitset,

    all_components: Bitset,
    all_components_count: usize,
    any_components: Bitset,
    any_components_count: usize,
    without_all_components: Bitset,
    without_all_components_count: usize,
    without_any_components: Bitset,
}

impl Default for QueryFilter {
    fn default() -> Self {
        let mut without_any_tags = Bitset::new();
        without_any_tags.set(DISABLED_TAG as usize);
        Self {
            all_tags: Bitset::new(),
            all_tags_count: 0,
            any_tags: Bitset::new(),
            any_tags_count: 0,
            without_all_tags: Bitset::new(),
            without_all_tags_count: 0,
            without_any_tags,
            all_components: Bitset::new(),
            all_components_count: 0,
            any_components: Bitset::new(),
            any_components_count: 0,
            without_all_components: Bitset::new(),
            without_all_components_count: 0,
            without_any_components: Bitset::new(),
        }
    }
}

/// Shared constraint algorithm, applied to tag and component sets alike.
///
/// Order matters: `any` is checked before `all` and a failing `any` can be
/// rescued by a non-empty `all` set.
fn matches(
    value: &Bitset,
    all: &Bitset,
    all_count: usize,
    any: &Bitset,
    any_count: usize,
    without_all: &Bitset,
    without_all_count: usize,
    without_any: &Bitset,
) -> bool {
    if any_count > 0 {
        if !value.has_any(any) {
            if all_count == 0 {
                return false;
            }
            if !value.has_all(all) {
                return false;
            }
        }
    } else if !value.has_all(all) {
        return false;
    }
    if value.has_any(without_any) {
        return false;
    }
    if without_all_count > 0 && value.has_all(without_all) {
        return false;
    }
    true
}

impl QueryFilter {
    /// Creates a filter with no constraints beyond the default exclusion
    /// of disabled entities.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires every tag in `tags` to be present.
    pub fn all_tags(&mut self, tags: &Tags) {
        self.all_tags.union_with(tags.bits());
        self.all_tags_count = self.all_tags.count();
    }

    /// Requires at least one tag in `tags` to be present (subject to the
    /// `all` fallback).
    pub fn any_tags(&mut self, tags: &Tags) {
        self.any_tags.union_with(tags.bits());
        self.any_tags_count = self.any_tags.count();
    }

    /// Rejects archetypes carrying every tag in `tags`.
    pub fn without_all_tags(&mut self, tags: &Tags) {
        self.without_all_tags.union_with(tags.bits());
        self.without_all_tags_count = self.without_all_tags.count();
    }

    /// Rejects archetypes carrying any tag in `tags`.
    pub fn without_any_tags(&mut self, tags: &Tags) {
        self.without_any_tags.union_with(tags.bits());
    }

    /// Requires every component type in `types` to be present.
    pub fn all_components(&mut self, types: &ComponentTypes) {
        self.all_components.union_with(types.bits());
        self.all_components_count = self.all_components.count();
    }

    /// Requires at least one component type in `types` to be present
    /// (subject to the `all` fallback).
    pub fn any_components(&mut self, types: &ComponentTypes) {
        self.any_components.union_with(types.bits());
        self.any_components_count = self.any_components.count();
    }

    /// Rejects archetypes storing every component type in `types`.
    pub fn without_all_components(&mut self, types: &ComponentTypes) {
        self.without_all_components.union_with(types.bits());
        self.without_all_components_count = self.without_all_components.count();
    }

    /// Rejects archetypes storing any component type in `types`.
    pub fn without_any_components(&mut self, types: &ComponentTypes) {
        self.without_any_components.union_with(types.bits());
    }

    /// Lets disabled entities match again.
    pub fn with_disabled(&mut self) {
        self.without_any_tags.clear(DISABLED_TAG as usize);
    }

    /// Applies the tag constraints to an archetype's tag set.
    pub fn is_tags_match(&self, tags: &Tags) -> bool {
        matches(
            tags.bits(),
            &self.all_tags,
            self.all_tags_count,
            &self.any_tags,
            self.any_tags_count,
            &self.without_all_tags,
            self.without_all_tags_count,
            &self.without_any_tags,
        )
    }

    /// Applies the component constraints to an archetype's component-type
    /// set.
    pub fn is_components_match(&self, types: &ComponentTypes) -> bool {
        matches(
            types.bits(),
            &self.all_components,
            self.all_components_count,
            &self.any_components,
            self.any_components_count,
            &self.without_all_components,
            self.without_all_components_count,
            &self.without_any_components,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags_of(indices: &[u16]) -> Tags {
        let mut tags = Tags::new();
        for &index in indices {
            tags.add(index);
        }
        tags
    }

    // Tag index 0 is reserved for Disabled; tests use 1 and up.

    #[test]
    fn empty_filter_matches_enabled_only() {
        let filter = QueryFilter::new();
        assert!(filter.is_tags_match(&tags_of(&[])));
        assert!(filter.is_tags_match(&tags_of(&[5])));
        assert!(!filter.is_tags_match(&tags_of(&[0])));
        assert!(!filter.is_tags_match(&tags_of(&[0, 5])));
    }

    #[test]
    fn with_disabled_opts_back_in() {
        let mut filter = QueryFilter::new();
        filter.with_disabled();
        assert!(filter.is_tags_match(&tags_of(&[0])));
        assert!(filter.is_tags_match(&tags_of(&[])));
    }

    #[test]
    fn all_requires_every_member() {
        let mut filter = QueryFilter::new();
        filter.all_tags(&tags_of(&[1, 2]));
        assert!(filter.is_tags_match(&tags_of(&[1, 2])));
        assert!(filter.is_tags_match(&tags_of(&[1, 2, 3])));
        assert!(!filter.is_tags_match(&tags_of(&[1])));
        assert!(!filter.is_tags_match(&tags_of(&[])));
    }

    #[test]
    fn any_requires_one_member() {
        let mut filter = QueryFilter::new();
        filter.any_tags(&tags_of(&[1, 2]));
        assert!(filter.is_tags_match(&tags_of(&[1])));
        assert!(filter.is_tags_match(&tags_of(&[2, 7])));
        assert!(!filter.is_tags_match(&tags_of(&[7])));
    }

    #[test]
    fn failing_any_falls_back_to_all() {
        let mut filter = QueryFilter::new();
        filter.any_tags(&tags_of(&[1]));
        filter.all_tags(&tags_of(&[2, 3]));
        // `any` satisfied: passes regardless of `all`.
        assert!(filter.is_tags_match(&tags_of(&[1])));
        // `any` fails but the full `all` set rescues the match.
        assert!(filter.is_tags_match(&tags_of(&[2, 3])));
        // Neither path satisfied.
        assert!(!filter.is_tags_match(&tags_of(&[2])));
        assert!(!filter.is_tags_match(&tags_of(&[4])));
    }

    #[test]
    fn without_any_rejects_on_single_member() {
        let mut filter = QueryFilter::new();
        filter.without_any_tags(&tags_of(&[1, 2]));
        assert!(!filter.is_tags_match(&tags_of(&[1])));
        assert!(!filter.is_tags_match(&tags_of(&[2, 9])));
        assert!(filter.is_tags_match(&tags_of(&[9])));
    }

    #[test]
    fn without_all_rejects_only_full_set() {
        let mut filter = QueryFilter::new();
        filter.without_all_tags(&tags_of(&[1, 2]));
        assert!(!filter.is_tags_match(&tags_of(&[1, 2])));
        assert!(!filter.is_tags_match(&tags_of(&[1, 2, 3])));
        assert!(filter.is_tags_match(&tags_of(&[1])));
        assert!(filter.is_tags_match(&tags_of(&[])));
    }

    #[test]
    fn component_constraints_use_the_same_algebra() {
        let mut filter = QueryFilter::new();
        let mut required = ComponentTypes::new();
        required.add(4);
        filter.all_components(&required);
        let mut present = ComponentTypes::new();
        present.add(4);
        present.add(9);
        assert!(filter.is_components_match(&present));
        present.remove(4);
        assert!(!filter.is_components_match(&present));
        // Component index 0 carries no disabled semantics.
        let mut zero = ComponentTypes::new();
        zero.add(0);
        zero.add(4);
        assert!(filter.is_components_match(&zero));
    }
}

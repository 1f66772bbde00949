/// Pure functions for allow/deny list evaluation (Discord-agnostic)
use serde::{Deserialize, Serialize};

/// An id list that either allows only its members (whitelist mode) or denies them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeList<T> {
    pub ids: Vec<T>,
    pub whitelist: bool,
}

impl<T> Default for ScopeList<T> {
    fn default() -> Self {
        Self {
            ids: Vec::new(),
            whitelist: false,
        }
    }
}

impl<T: PartialEq> ScopeList<T> {
    pub fn new(ids: Vec<T>, whitelist: bool) -> Self {
        Self { ids, whitelist }
    }

    /// Evaluate a single id against the list
    pub fn allows(&self, id: &T) -> bool {
        if self.ids.contains(id) {
            self.whitelist
        } else {
            !self.whitelist
        }
    }

    /// Evaluate a set of ids (e.g. a member's roles); one hit decides
    pub fn allows_any(&self, ids: &[T]) -> bool {
        if self.ids.is_empty() {
            return !self.whitelist;
        }
        if has_any(ids, &self.ids) {
            self.whitelist
        } else {
            !self.whitelist
        }
    }
}

/// Check if any of `have` appears in `list`
pub fn has_any<T: PartialEq>(have: &[T], list: &[T]) -> bool {
    have.iter().any(|item| list.contains(item))
}

/// Group-level policy: an ignore list always vetoes, a non-empty whitelist must be hit
pub fn passes_group_lists<T: PartialEq>(have: &[T], ignore: &[T], whitelist: &[T]) -> bool {
    if has_any(have, ignore) {
        return false;
    }
    whitelist.is_empty() || has_any(have, whitelist)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deny_mode() {
        let list = ScopeList::new(vec![1u64, 2], false);
        assert!(!list.allows(&1));
        assert!(list.allows(&3));
    }

    #[test]
    fn test_whitelist_mode() {
        let list = ScopeList::new(vec![1u64, 2], true);
        assert!(list.allows(&2));
        assert!(!list.allows(&3));
    }

    #[test]
    fn test_empty_lists() {
        let deny: ScopeList<u64> = ScopeList::new(vec![], false);
        let allow: ScopeList<u64> = ScopeList::new(vec![], true);

        assert!(deny.allows_any(&[]));
        assert!(deny.allows_any(&[5]));
        assert!(!allow.allows_any(&[5]));
        assert!(!allow.allows(&5));
    }

    #[test]
    fn test_allows_any() {
        let list = ScopeList::new(vec![10u64, 20], true);
        assert!(list.allows_any(&[1, 20]));
        assert!(!list.allows_any(&[1, 2]));
        assert!(!list.allows_any(&[]));

        let deny = ScopeList::new(vec![10u64], false);
        assert!(!deny.allows_any(&[10, 11]));
        assert!(deny.allows_any(&[11]));
    }

    #[test]
    fn test_group_lists() {
        assert!(passes_group_lists::<u64>(&[1], &[], &[]));
        assert!(!passes_group_lists(&[1, 2], &[2], &[]));
        assert!(!passes_group_lists(&[1], &[], &[3]));
        assert!(passes_group_lists(&[1, 3], &[], &[3]));
        assert!(!passes_group_lists(&[3], &[3], &[3]));
    }
}

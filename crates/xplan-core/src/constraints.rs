//! The live set of selectable platforms.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::config::PlatformProvider;
use crate::id::PlatformId;
use crate::platform::PlatformRegistry;

/// Platforms that may be chosen, derived from the registry and the
/// whitelist/blacklist of a configuration snapshot.
///
/// A platform is selectable iff it is registered, not blacklisted, and either
/// the whitelist is empty or it contains the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConstraintSet {
    registered: BTreeSet<PlatformId>,
    whitelist: BTreeSet<PlatformId>,
    blacklist: BTreeSet<PlatformId>,
    selectable: BTreeSet<PlatformId>,
}

impl ConstraintSet {
    pub fn new(provider: &PlatformProvider, registry: &PlatformRegistry) -> Self {
        let registered: BTreeSet<PlatformId> = registry.ids().cloned().collect();
        let whitelist = provider.whitelist().clone();
        let blacklist = provider.blacklist().clone();
        let selectable = registered
            .iter()
            .filter(|p| !blacklist.contains(*p))
            .filter(|p| whitelist.is_empty() || whitelist.contains(*p))
            .cloned()
            .collect();
        Self {
            registered,
            whitelist,
            blacklist,
            selectable,
        }
    }

    /// Every registered platform selectable.
    pub fn unrestricted(registry: &PlatformRegistry) -> Self {
        Self::new(&PlatformProvider::default(), registry)
    }

    pub fn is_selectable(&self, p: &PlatformId) -> bool {
        self.selectable.contains(p)
    }

    pub fn selectable(&self) -> &BTreeSet<PlatformId> {
        &self.selectable
    }

    /// Why `p` is not selectable, or `None` if it is.
    pub fn rejection_reason(&self, p: &PlatformId) -> Option<&'static str> {
        if !self.registered.contains(p) {
            Some("not registered")
        } else if self.blacklist.contains(p) {
            Some("blacklisted")
        } else if !self.whitelist.is_empty() && !self.whitelist.contains(p) {
            Some("not whitelisted")
        } else {
            None
        }
    }

    /// Narrow the selectable set to `{p}` (or to nothing if `p` is not
    /// currently selectable). Used for loop bodies pinned to one platform.
    pub fn restrict_to(&self, p: &PlatformId) -> Self {
        let mut out = self.clone();
        out.selectable.retain(|q| q == p);
        out.whitelist = std::iter::once(p.clone()).collect();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Platform;

    fn registry() -> PlatformRegistry {
        let mut r = PlatformRegistry::new();
        r.register(Platform::new("a", "A"));
        r.register(Platform::new("b", "B"));
        r
    }

    #[test]
    fn blacklist_dominates_whitelist() {
        let mut p = PlatformProvider::default();
        p.add_to_whitelist("a");
        p.add_to_blacklist("a");
        let c = ConstraintSet::new(&p, &registry());
        assert!(!c.is_selectable(&"a".into()));
        assert!(!c.is_selectable(&"b".into()));
        assert_eq!(c.rejection_reason(&"a".into()), Some("blacklisted"));
        assert_eq!(c.rejection_reason(&"b".into()), Some("not whitelisted"));
    }

    #[test]
    fn restrict_to_never_widens() {
        let mut p = PlatformProvider::default();
        p.add_to_blacklist("b");
        let c = ConstraintSet::new(&p, &registry());
        assert!(c.restrict_to(&"b".into()).selectable().is_empty());
        let only_a = c.restrict_to(&"a".into());
        assert_eq!(only_a.selectable().len(), 1);
        assert!(only_a.is_selectable(&"a".into()));
    }
}

//! Presence registry - live member list for one room channel
//!
//! The registry never talks to the transport itself. The session feeds it
//! the transport's snapshot/add/remove notifications and reads the result.

use tracing::debug;

use crate::models::Member;

/// A membership notification from the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceChange {
    /// Full member list delivered on subscription success
    Snapshot(Vec<Member>),
    Added(Member),
    Removed { id: String },
}

/// Members currently subscribed to a room channel, in join order
#[derive(Debug, Default, Clone)]
pub struct PresenceRegistry {
    members: Vec<Member>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a notification. Returns true if the member list changed.
    pub fn apply(&mut self, change: PresenceChange) -> bool {
        match change {
            PresenceChange::Snapshot(members) => {
                self.replace_all(members);
                true
            }
            PresenceChange::Added(member) => self.add(member),
            PresenceChange::Removed { id } => self.remove(&id).is_some(),
        }
    }

    /// Replace the local set wholesale from a snapshot
    pub fn replace_all(&mut self, members: Vec<Member>) {
        self.members.clear();
        for member in members {
            self.add(member);
        }
    }

    /// Add a member unless its id is already known
    pub fn add(&mut self, member: Member) -> bool {
        if self.contains(&member.id) {
            debug!(member_id = %member.id, "Ignoring duplicate member add");
            return false;
        }
        self.members.push(member);
        true
    }

    /// Remove a member by id; unknown ids are a no-op
    pub fn remove(&mut self, id: &str) -> Option<Member> {
        let idx = self.members.iter().position(|m| m.id == id)?;
        Some(self.members.remove(idx))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.iter().any(|m| m.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.id == id)
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Forget everyone, used when the channel is released
    pub fn clear(&mut self) {
        self.members.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(id: &str, name: &str) -> Member {
        Member::new(id, name)
    }

    #[test]
    fn test_snapshot_replaces_wholesale() {
        let mut registry = PresenceRegistry::new();
        registry.add(member("stale", "Old"));

        registry.apply(PresenceChange::Snapshot(vec![
            member("a", "Ada"),
            member("b", "Bo"),
        ]));

        assert_eq!(registry.len(), 2);
        assert!(!registry.contains("stale"));
        assert_eq!(registry.members()[0].name, "Ada");
    }

    #[test]
    fn test_snapshot_drops_duplicate_ids() {
        let mut registry = PresenceRegistry::new();
        registry.replace_all(vec![member("a", "Ada"), member("a", "Ada")]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_add_is_noop() {
        let mut registry = PresenceRegistry::new();
        registry.apply(PresenceChange::Snapshot(vec![member("a", "Ada")]));

        let changed = registry.apply(PresenceChange::Added(member("a", "Ada")));
        assert!(!changed);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_same_name_different_ids() {
        let mut registry = PresenceRegistry::new();
        assert!(registry.add(member("a", "Player")));
        assert!(registry.add(member("b", "Player")));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_remove() {
        let mut registry = PresenceRegistry::new();
        registry.add(member("a", "Ada"));
        registry.add(member("b", "Bo"));

        assert!(registry.apply(PresenceChange::Removed { id: "a".into() }));
        assert_eq!(registry.members(), &[member("b", "Bo")]);

        // Unknown id
        assert!(!registry.apply(PresenceChange::Removed { id: "zz".into() }));
        assert_eq!(registry.len(), 1);
    }
}

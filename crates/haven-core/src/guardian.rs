//! Guardian profiles and the eligible-guardian set.

use crate::errors::{HavenError, Result};
use crate::identifiers::GuardianId;
use serde::{Deserialize, Serialize};

/// Metadata describing a guardian eligible to contribute to a session or
/// vote on a recovery request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardianProfile {
    /// Stable guardian identifier.
    pub guardian_id: GuardianId,
    /// Human readable label for operator UX.
    pub label: String,
    /// Guardian's registered Ed25519 verifying key.
    pub verifying_key: [u8; 32],
    /// Verifying key of the guardian's hardware authenticator, if enrolled.
    pub hardware_key: Option<[u8; 32]>,
}

impl GuardianProfile {
    /// Create a profile without a hardware authenticator.
    pub fn new(guardian_id: GuardianId, label: impl Into<String>, verifying_key: [u8; 32]) -> Self {
        Self {
            guardian_id,
            label: label.into(),
            verifying_key,
            hardware_key: None,
        }
    }

    /// Attach an enrolled hardware authenticator key.
    pub fn with_hardware_key(mut self, hardware_key: [u8; 32]) -> Self {
        self.hardware_key = Some(hardware_key);
        self
    }
}

/// Non-empty, duplicate-free set of eligible guardians.
///
/// Constructed once per session/request; the invariants in the constructor
/// are what make downstream quorum arithmetic trustworthy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardianSet {
    guardians: Vec<GuardianProfile>,
}

impl GuardianSet {
    /// Create a guardian set, rejecting empty or duplicated memberships.
    pub fn new(guardians: Vec<GuardianProfile>) -> Result<Self> {
        if guardians.is_empty() {
            return Err(HavenError::empty_guardian_set(
                "a guardian set needs at least one member",
            ));
        }
        for (i, guardian) in guardians.iter().enumerate() {
            if guardians[..i]
                .iter()
                .any(|g| g.guardian_id == guardian.guardian_id)
            {
                return Err(HavenError::internal(format!(
                    "duplicate guardian {} in set",
                    guardian.guardian_id
                )));
            }
        }
        Ok(Self { guardians })
    }

    /// Number of guardians.
    pub fn len(&self) -> usize {
        self.guardians.len()
    }

    /// Whether the set is empty. Always false for a constructed set.
    pub fn is_empty(&self) -> bool {
        self.guardians.is_empty()
    }

    /// Iterate over guardian profiles.
    pub fn iter(&self) -> impl Iterator<Item = &GuardianProfile> {
        self.guardians.iter()
    }

    /// Lookup a guardian by identifier.
    pub fn get(&self, guardian_id: &GuardianId) -> Option<&GuardianProfile> {
        self.guardians
            .iter()
            .find(|guardian| &guardian.guardian_id == guardian_id)
    }

    /// Whether the given guardian is eligible.
    pub fn contains(&self, guardian_id: &GuardianId) -> bool {
        self.get(guardian_id).is_some()
    }

    /// Identifiers of every member.
    pub fn ids(&self) -> Vec<GuardianId> {
        self.guardians.iter().map(|g| g.guardian_id).collect()
    }
}

impl<'a> IntoIterator for &'a GuardianSet {
    type Item = &'a GuardianProfile;
    type IntoIter = std::slice::Iter<'a, GuardianProfile>;

    fn into_iter(self) -> Self::IntoIter {
        self.guardians.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn profile(seed: u8) -> GuardianProfile {
        GuardianProfile::new(
            GuardianId::from_seed(seed),
            format!("guardian-{seed}"),
            [seed; 32],
        )
    }

    #[test]
    fn rejects_empty_set() {
        assert_matches!(
            GuardianSet::new(vec![]),
            Err(HavenError::EmptyGuardianSet { .. })
        );
    }

    #[test]
    fn rejects_duplicate_members() {
        let result = GuardianSet::new(vec![profile(1), profile(2), profile(1)]);
        assert_matches!(result, Err(HavenError::Internal { .. }));
    }

    #[test]
    fn lookup_by_id() {
        let set = GuardianSet::new(vec![profile(1), profile(2)]).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains(&GuardianId::from_seed(2)));
        assert!(!set.contains(&GuardianId::from_seed(3)));
        assert_eq!(set.get(&GuardianId::from_seed(1)).unwrap().label, "guardian-1");
    }
}

//! IAM policy bindings.
//!
//! Policy updates are deltas: the desired bindings are merged into (or
//! removed from) the current policy with a read-modify-write cycle that
//! echoes the policy etag, so a concurrent writer surfaces as
//! [`crate::error::GcpError::ConcurrentModification`] instead of
//! silently losing grants.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

use crate::config::spec::{DesiredBinding, PolicyBindingProperties};
use crate::error::Result;
use crate::gcp::GcpClient;

/// An IAM policy with its concurrency fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Role bindings, kept sorted by role.
    #[serde(default)]
    pub bindings: Vec<Binding>,
    /// Concurrency fingerprint from the last read, echoed on writes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// Policy format version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
}

/// A role with its bound members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    /// IAM role name.
    pub role: String,
    /// Members bound to the role.
    pub members: Vec<String>,
}

/// Merges desired bindings into the current policy.
///
/// Per-role member sets are unioned, so applying the same delta twice
/// yields the same policy. The result is sorted by role with sorted
/// members, and carries the current policy's etag for the write.
#[must_use]
pub fn merge_add(current: &Policy, desired: &[DesiredBinding]) -> Policy {
    let mut by_role = role_map(current);
    for binding in desired {
        let members = by_role.entry(binding.role.clone()).or_default();
        members.extend(binding.members.iter().cloned());
    }
    rebuild(current, by_role)
}

/// Removes desired bindings from the current policy.
///
/// Only exact member matches are removed; a role whose member set
/// becomes empty is dropped entirely. Members or roles that are already
/// absent are ignored, so removal is idempotent too.
#[must_use]
pub fn merge_remove(current: &Policy, desired: &[DesiredBinding]) -> Policy {
    let mut by_role = role_map(current);
    for binding in desired {
        if let Some(members) = by_role.get_mut(&binding.role) {
            for member in &binding.members {
                members.remove(member);
            }
            if members.is_empty() {
                by_role.remove(&binding.role);
            }
        }
    }
    rebuild(current, by_role)
}

fn role_map(policy: &Policy) -> BTreeMap<String, BTreeSet<String>> {
    let mut by_role: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for binding in &policy.bindings {
        by_role
            .entry(binding.role.clone())
            .or_default()
            .extend(binding.members.iter().cloned());
    }
    by_role
}

fn rebuild(current: &Policy, by_role: BTreeMap<String, BTreeSet<String>>) -> Policy {
    Policy {
        bindings: by_role
            .into_iter()
            .map(|(role, members)| Binding {
                role,
                members: members.into_iter().collect(),
            })
            .collect(),
        etag: current.etag.clone(),
        version: current.version,
    }
}

/// Applies policy-binding deltas against a project.
#[derive(Debug, Clone, Copy)]
pub struct PolicyBindingHandler<'a> {
    client: &'a GcpClient,
}

impl<'a> PolicyBindingHandler<'a> {
    /// Creates a handler over the given client.
    #[must_use]
    pub const fn new(client: &'a GcpClient) -> Self {
        Self { client }
    }

    /// Grants the desired bindings with one read-modify-write cycle.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::GcpError::ConcurrentModification`] when another writer
    /// changed the policy between the read and the write; the caller
    /// must re-run the whole cycle.
    pub async fn apply_add(&self, props: &PolicyBindingProperties) -> Result<Policy> {
        let current = self.client.get_iam_policy(&props.resource).await?;
        let merged = merge_add(&current, &props.bindings);
        info!(
            "Granting {} binding(s) on {}",
            props.bindings.len(),
            props.resource
        );
        self.client.set_iam_policy(&props.resource, &merged).await
    }

    /// Revokes the desired bindings with one read-modify-write cycle.
    ///
    /// # Errors
    ///
    /// Same contract as [`Self::apply_add`].
    pub async fn apply_remove(&self, props: &PolicyBindingProperties) -> Result<Policy> {
        let current = self.client.get_iam_policy(&props.resource).await?;
        let merged = merge_remove(&current, &props.bindings);
        info!(
            "Revoking {} binding(s) on {}",
            props.bindings.len(),
            props.resource
        );
        self.client.set_iam_policy(&props.resource, &merged).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(bindings: &[(&str, &[&str])]) -> Policy {
        Policy {
            bindings: bindings
                .iter()
                .map(|(role, members)| Binding {
                    role: (*role).to_string(),
                    members: members.iter().map(|m| (*m).to_string()).collect(),
                })
                .collect(),
            etag: Some(String::from("BwWKmjvelug=")),
            version: Some(3),
        }
    }

    fn desired(bindings: &[(&str, &[&str])]) -> Vec<DesiredBinding> {
        bindings
            .iter()
            .map(|(role, members)| DesiredBinding {
                role: (*role).to_string(),
                members: members.iter().map(|m| (*m).to_string()).collect(),
            })
            .collect()
    }

    #[test]
    fn merge_unions_members_and_sorts_roles() {
        let current = policy(&[("roles/viewer", &["user:bar@example.com"])]);
        let delta = desired(&[
            ("roles/editor", &["user:taco@example.com"]),
            ("roles/viewer", &["user:bell@example.com"]),
        ]);
        let merged = merge_add(&current, &delta);
        assert_eq!(
            merged,
            policy(&[
                ("roles/editor", &["user:taco@example.com"]),
                (
                    "roles/viewer",
                    &["user:bar@example.com", "user:bell@example.com"]
                ),
            ])
        );
    }

    #[test]
    fn merge_add_is_idempotent() {
        let current = policy(&[("roles/viewer", &["user:bar@example.com"])]);
        let delta = desired(&[("roles/viewer", &["user:bell@example.com"])]);
        let once = merge_add(&current, &delta);
        let twice = merge_add(&once, &delta);
        assert_eq!(once, twice);
    }

    #[test]
    fn merge_preserves_etag_for_the_write() {
        let current = policy(&[]);
        let merged = merge_add(&current, &desired(&[("roles/viewer", &["user:a@b.c"])]));
        assert_eq!(merged.etag.as_deref(), Some("BwWKmjvelug="));
        assert_eq!(merged.version, Some(3));
    }

    #[test]
    fn remove_drops_only_exact_members() {
        let current = policy(&[(
            "roles/viewer",
            &["user:bar@example.com", "user:bell@example.com"],
        )]);
        let removed = merge_remove(&current, &desired(&[("roles/viewer", &["user:bell@example.com"])]));
        assert_eq!(
            removed,
            policy(&[("roles/viewer", &["user:bar@example.com"])])
        );
    }

    #[test]
    fn remove_drops_emptied_roles() {
        let current = policy(&[("roles/viewer", &["user:bar@example.com"])]);
        let removed = merge_remove(&current, &desired(&[("roles/viewer", &["user:bar@example.com"])]));
        assert!(removed.bindings.is_empty());
    }

    #[test]
    fn remove_ignores_absent_roles_and_members() {
        let current = policy(&[("roles/viewer", &["user:bar@example.com"])]);
        let removed = merge_remove(
            &current,
            &desired(&[
                ("roles/editor", &["user:bar@example.com"]),
                ("roles/viewer", &["user:ghost@example.com"]),
            ]),
        );
        assert_eq!(removed, current);
    }
}

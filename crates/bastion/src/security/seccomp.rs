//! Seccomp profile selection.
//!
//! Only decides whether a syscall filter applies and which profile file it
//! comes from; compiling the profile is the runtime's job.

use std::path::{Path, PathBuf};

use serde::Serialize;

use super::SecuritySpec;
use crate::config::RuntimeDefaults;

/// Profile path that disables syscall filtering.
pub const UNCONFINED: &str = "unconfined";

/// Whether a seccomp filter applies, and from which profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum SeccompDecision {
    /// No filter.
    Inactive,
    /// Filter loaded from `profile`.
    Active {
        /// Profile file.
        profile: PathBuf,
    },
}

impl SeccompDecision {
    /// Whether a filter applies.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }

    /// The profile the filter is loaded from, if active.
    #[must_use]
    pub fn profile(&self) -> Option<&Path> {
        match self {
            Self::Active { profile } => Some(profile),
            Self::Inactive => None,
        }
    }
}

/// Decide whether the container runs under a seccomp filter.
///
/// Privileged containers that did not ask for a specific profile run
/// unfiltered, as do containers that ask for [`UNCONFINED`].
#[must_use]
pub fn resolve_seccomp(spec: &SecuritySpec, defaults: &RuntimeDefaults) -> SeccompDecision {
    let requested = spec.seccomp_profile_path.as_str();

    if requested == UNCONFINED {
        return SeccompDecision::Inactive;
    }

    if spec.privileged
        && (requested.is_empty()
            || Path::new(requested) == defaults.seccomp_override_path
            || Path::new(requested) == defaults.seccomp_default_path)
    {
        tracing::debug!(requested, "Privileged container, seccomp disabled");
        return SeccompDecision::Inactive;
    }

    let profile = if requested.is_empty() {
        defaults.seccomp_profile.clone()
    } else {
        PathBuf::from(requested)
    };
    SeccompDecision::Active { profile }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::CapabilitySet;

    fn defaults() -> RuntimeDefaults {
        RuntimeDefaults::new(CapabilitySet::all())
    }

    fn spec(privileged: bool, path: &str) -> SecuritySpec {
        SecuritySpec {
            privileged,
            seccomp_profile_path: path.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_profile_applies() {
        let defaults = defaults();
        let decision = resolve_seccomp(&spec(false, ""), &defaults);
        assert_eq!(decision.profile(), Some(defaults.seccomp_profile.as_path()));
    }

    #[test]
    fn test_explicit_profile() {
        let decision = resolve_seccomp(&spec(false, "/opt/strict.json"), &defaults());
        assert_eq!(
            decision,
            SeccompDecision::Active {
                profile: PathBuf::from("/opt/strict.json")
            }
        );
    }

    #[test]
    fn test_unconfined() {
        assert!(!resolve_seccomp(&spec(false, UNCONFINED), &defaults()).is_active());
        assert!(!resolve_seccomp(&spec(true, UNCONFINED), &defaults()).is_active());
    }

    #[test]
    fn test_privileged_default_sentinels() {
        let defaults = defaults();
        let override_path = defaults.seccomp_override_path.display().to_string();
        let default_path = defaults.seccomp_default_path.display().to_string();

        assert!(!resolve_seccomp(&spec(true, ""), &defaults).is_active());
        assert!(!resolve_seccomp(&spec(true, &override_path), &defaults).is_active());
        assert!(!resolve_seccomp(&spec(true, &default_path), &defaults).is_active());
        assert!(resolve_seccomp(&spec(true, "/opt/strict.json"), &defaults).is_active());
        assert!(resolve_seccomp(&spec(false, &default_path), &defaults).is_active());
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(SeccompDecision::Inactive).unwrap();
        assert_eq!(json["state"], "inactive");
    }
}

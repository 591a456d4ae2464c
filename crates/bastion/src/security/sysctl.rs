//! Sysctl policy filtering.
//!
//! Namespaced sysctls only make sense when the container owns the namespace
//! they belong to. Runtime defaults that would leak into a shared namespace
//! are skipped; explicit user requests that would do so are rejected.

use std::collections::BTreeMap;

use bastion_common::{BastionError, BastionResult};

use crate::namespace::{NamespaceKind, NamespaceSet};

/// Exact sysctl names that may be set in a container.
const ALLOWED_SYSCTLS: &[&str] = &[
    "kernel.msgmax",
    "kernel.msgmnb",
    "kernel.msgmni",
    "kernel.sem",
    "kernel.shmall",
    "kernel.shmmax",
    "kernel.shmmni",
    "kernel.shm_rmid_forced",
    "kernel.domainname",
    "kernel.hostname",
];

/// Sysctl prefixes that may be set in a container.
const ALLOWED_PREFIXES: &[&str] = &["net.", "fs.mqueue."];

fn invalid(entry: &str, reason: &str) -> BastionError {
    BastionError::InvalidSysctl {
        entry: entry.to_string(),
        reason: reason.to_string(),
    }
}

/// Check that `key` names a namespaced sysctl.
///
/// # Errors
///
/// Returns [`BastionError::InvalidSysctl`] for keys outside the allowed set.
pub fn validate_sysctl_key(key: &str) -> BastionResult<()> {
    if ALLOWED_SYSCTLS.contains(&key) || ALLOWED_PREFIXES.iter().any(|p| key.starts_with(p)) {
        Ok(())
    } else {
        Err(invalid(key, "sysctl is not allowed"))
    }
}

/// Parse `KEY=VALUE` sysctl entries, preserving order.
///
/// # Errors
///
/// Returns [`BastionError::InvalidSysctl`] for entries without `=`, with
/// spaces around the key or value, or naming a disallowed sysctl.
pub fn parse_sysctls<S: AsRef<str>>(entries: &[S]) -> BastionResult<Vec<(String, String)>> {
    entries
        .iter()
        .map(|entry| {
            let entry = entry.as_ref();
            let (key, value) = entry
                .split_once('=')
                .ok_or_else(|| invalid(entry, "sysctl values must be in the form of KEY=VALUE"))?;
            if key.trim() != key || value.trim() != value {
                return Err(invalid(entry, "extra spaces found"));
            }
            validate_sysctl_key(key)?;
            Ok((key.to_string(), value.to_string()))
        })
        .collect()
}

/// The namespace a sysctl key belongs to, if it is gated by one.
#[must_use]
pub fn gating_namespace(key: &str) -> Option<NamespaceKind> {
    if key.starts_with("fs.mqueue.") {
        Some(NamespaceKind::Ipc)
    } else if key.starts_with("net.") {
        Some(NamespaceKind::Network)
    } else if key.starts_with("kernel.domainname") || key.starts_with("kernel.hostname") {
        Some(NamespaceKind::Uts)
    } else {
        None
    }
}

/// Merge runtime-default and user sysctls under the namespace topology.
///
/// User entries override defaults with the same key.
///
/// # Errors
///
/// Returns [`BastionError::InvalidSysctl`] for malformed entries and
/// [`BastionError::SysctlConflict`] for a user sysctl whose namespace is shared.
pub fn filter_sysctls<S: AsRef<str>>(
    default_sysctls: &[S],
    user_sysctls: &BTreeMap<String, String>,
    namespaces: &NamespaceSet,
) -> BastionResult<BTreeMap<String, String>> {
    let mut accepted = BTreeMap::new();

    for (key, value) in parse_sysctls(default_sysctls)? {
        if let Some(kind) = gating_namespace(&key) {
            let mode = namespaces.mode(kind);
            if mode.is_shared() {
                tracing::info!(
                    sysctl = %key,
                    value = %value,
                    namespace = %kind,
                    mode = %mode,
                    "Default sysctl ignored, namespace is not private"
                );
                continue;
            }
        }
        accepted.insert(key, value);
    }

    for (key, value) in user_sysctls {
        validate_sysctl_key(key)?;
        if let Some(kind) = gating_namespace(key) {
            let mode = namespaces.mode(kind);
            if mode.is_shared() {
                return Err(BastionError::SysctlConflict {
                    key: key.clone(),
                    value: value.clone(),
                    namespace: kind.to_string(),
                    mode: mode.kind_name().to_string(),
                });
            }
        }
        accepted.insert(key.clone(), value.clone());
    }

    Ok(accepted)
}

//! AppArmor profile selection.

#[cfg(target_os = "linux")]
use std::path::Path;

use bastion_common::{BastionError, BastionResult};

use super::SecuritySpec;
use crate::config::RuntimeDefaults;

/// Profile name that applies no AppArmor restrictions.
pub const UNCONFINED: &str = "unconfined";

/// Check if AppArmor is enabled on the system.
#[cfg(target_os = "linux")]
#[must_use]
pub fn is_enabled() -> bool {
    if !Path::new("/sys/kernel/security/apparmor").exists() {
        return false;
    }
    std::fs::read_to_string("/sys/module/apparmor/parameters/enabled")
        .is_ok_and(|s| s.trim().starts_with('Y'))
}

/// Check if AppArmor is enabled on the system.
#[cfg(not(target_os = "linux"))]
#[must_use]
pub const fn is_enabled() -> bool {
    false
}

/// Select the AppArmor profile to apply, if any.
///
/// # Errors
///
/// Returns [`BastionError::UnsupportedProfile`] when a confining profile is
/// requested but AppArmor is disabled on the host.
pub fn resolve_apparmor_profile(
    spec: &SecuritySpec,
    defaults: &RuntimeDefaults,
) -> BastionResult<Option<String>> {
    let requested = spec.apparmor_profile.as_str();

    if !defaults.apparmor_enabled {
        if !requested.is_empty() && requested != UNCONFINED {
            return Err(BastionError::UnsupportedProfile {
                subsystem: "AppArmor".to_string(),
                profile: requested.to_string(),
            });
        }
        return Ok(None);
    }

    if spec.privileged && requested.is_empty() {
        tracing::debug!("Privileged container without explicit AppArmor profile");
        return Ok(None);
    }

    let profile = if requested.is_empty() {
        defaults.apparmor_profile.as_str()
    } else {
        requested
    };

    Ok((!profile.is_empty()).then(|| profile.to_string()))
}

//! Mandatory access control and syscall confinement.

use bastion_common::BastionResult;
use serde::Serialize;

use super::SecuritySpec;
use super::apparmor::resolve_apparmor_profile;
use super::seccomp::{SeccompDecision, resolve_seccomp};
use super::selinux::resolve_label_options;
use crate::config::RuntimeDefaults;
use crate::namespace::{NamespaceSet, TopologyResolver};

/// Resolved confinement of a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfinementConfig {
    selinux_opts: Vec<String>,
    apparmor_profile: Option<String>,
    seccomp: SeccompDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    read_only_rootfs: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    no_new_privileges: Option<bool>,
}

impl ConfinementConfig {
    /// SELinux label options.
    #[must_use]
    pub fn selinux_opts(&self) -> &[String] {
        &self.selinux_opts
    }

    /// AppArmor profile to apply, if any.
    #[must_use]
    pub fn apparmor_profile(&self) -> Option<&str> {
        self.apparmor_profile.as_deref()
    }

    /// Seccomp decision.
    #[must_use]
    pub const fn seccomp(&self) -> &SeccompDecision {
        &self.seccomp
    }

    /// Read-only root filesystem override. `None` leaves the runtime default.
    #[must_use]
    pub const fn read_only_rootfs(&self) -> Option<bool> {
        self.read_only_rootfs
    }

    /// no_new_privs override. `None` leaves the runtime default.
    #[must_use]
    pub const fn no_new_privileges(&self) -> Option<bool> {
        self.no_new_privileges
    }
}

/// Compose SELinux, AppArmor and seccomp confinement for a container.
///
/// Join targets are looked up through `resolver` now, so a label that
/// rotated since the target was created is picked up as it currently is.
///
/// # Errors
///
/// Fails if a joined container cannot be found or its label is malformed,
/// or if an AppArmor profile is requested while AppArmor is disabled.
pub fn compose_confinement(
    spec: &SecuritySpec,
    defaults: &RuntimeDefaults,
    namespaces: &NamespaceSet,
    resolver: &dyn TopologyResolver,
) -> BastionResult<ConfinementConfig> {
    let selinux_opts = resolve_label_options(spec, defaults, namespaces, resolver)?;
    let apparmor_profile = resolve_apparmor_profile(spec, defaults)?;
    let seccomp = resolve_seccomp(spec, defaults);

    tracing::debug!(
        selinux = ?selinux_opts,
        apparmor = ?apparmor_profile,
        seccomp = seccomp.is_active(),
        "Confinement composed"
    );

    Ok(ConfinementConfig {
        selinux_opts,
        apparmor_profile,
        seccomp,
        read_only_rootfs: spec.read_only_rootfs,
        no_new_privileges: spec.no_new_privileges,
    })
}

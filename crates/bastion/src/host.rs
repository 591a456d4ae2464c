//! Host kernel feature probing.

use bastion_common::{BastionError, BastionResult};

use crate::security::{CapabilitySet, apparmor, selinux::SELinuxContext};

/// Host features that security resolution depends on.
///
/// Queried once when [`RuntimeDefaults`](crate::config::RuntimeDefaults) are
/// loaded; resolution itself never probes the host.
pub trait HostFeatures {
    /// Capabilities in the kernel bounding set of the current process.
    ///
    /// # Errors
    ///
    /// Returns [`BastionError::HostQuery`] if the bounding set cannot be read.
    fn bounding_set(&self) -> BastionResult<CapabilitySet>;

    /// Whether the kernel supports ambient capabilities.
    fn ambient_supported(&self) -> bool;

    /// Whether SELinux is enabled.
    fn selinux_enabled(&self) -> bool;

    /// Whether AppArmor is enabled.
    fn apparmor_enabled(&self) -> bool;
}

/// The running Linux host.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinuxHost;

impl HostFeatures for LinuxHost {
    #[cfg(target_os = "linux")]
    fn bounding_set(&self) -> BastionResult<CapabilitySet> {
        let raw = caps::read(None, caps::CapSet::Bounding).map_err(|e| BastionError::HostQuery {
            what: "capability bounding set".to_string(),
            message: e.to_string(),
        })?;

        Ok(raw
            .into_iter()
            .filter_map(|cap| {
                let known = crate::security::Capability::from_caps(cap);
                if known.is_none() {
                    tracing::debug!(capability = %cap, "Ignoring capability unknown to this build");
                }
                known
            })
            .collect())
    }

    #[cfg(not(target_os = "linux"))]
    fn bounding_set(&self) -> BastionResult<CapabilitySet> {
        Err(BastionError::HostQuery {
            what: "capability bounding set".to_string(),
            message: "capabilities are only supported on Linux".to_string(),
        })
    }

    #[cfg(target_os = "linux")]
    fn ambient_supported(&self) -> bool {
        caps::runtime::ambient_set_supported().is_ok()
    }

    #[cfg(not(target_os = "linux"))]
    fn ambient_supported(&self) -> bool {
        false
    }

    fn selinux_enabled(&self) -> bool {
        SELinuxContext::is_enabled()
    }

    fn apparmor_enabled(&self) -> bool {
        apparmor::is_enabled()
    }
}

/// Fixed host description, for tests and offline resolution.
#[derive(Debug, Clone, Default)]
pub struct StaticHost {
    /// Bounding set, or `None` to make the query fail.
    pub bounding: Option<CapabilitySet>,
    /// Ambient capability support.
    pub ambient: bool,
    /// SELinux enablement.
    pub selinux: bool,
    /// AppArmor enablement.
    pub apparmor: bool,
}

impl StaticHost {
    /// A host with the given bounding set and every optional feature off.
    #[must_use]
    pub const fn new(bounding: CapabilitySet) -> Self {
        Self {
            bounding: Some(bounding),
            ambient: false,
            selinux: false,
            apparmor: false,
        }
    }

    /// A host whose bounding set cannot be read.
    #[must_use]
    pub const fn failing() -> Self {
        Self {
            bounding: None,
            ambient: false,
            selinux: false,
            apparmor: false,
        }
    }

    /// Enable ambient capability support.
    #[must_use]
    pub fn with_ambient(mut self) -> Self {
        self.ambient = true;
        self
    }

    /// Enable SELinux.
    #[must_use]
    pub fn with_selinux(mut self) -> Self {
        self.selinux = true;
        self
    }

    /// Enable AppArmor.
    #[must_use]
    pub fn with_apparmor(mut self) -> Self {
        self.apparmor = true;
        self
    }
}

impl HostFeatures for StaticHost {
    fn bounding_set(&self) -> BastionResult<CapabilitySet> {
        self.bounding.clone().ok_or_else(|| BastionError::HostQuery {
            what: "capability bounding set".to_string(),
            message: "unavailable".to_string(),
        })
    }

    fn ambient_supported(&self) -> bool {
        self.ambient
    }

    fn selinux_enabled(&self) -> bool {
        self.selinux
    }

    fn apparmor_enabled(&self) -> bool {
        self.apparmor
    }
}

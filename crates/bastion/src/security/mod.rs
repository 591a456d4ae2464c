//! Container security composition.
//!
//! This module turns a container's declarative security request into the
//! concrete settings written into its runtime spec:
//! - Linux capabilities
//! - SELinux labels, AppArmor profiles and seccomp
//! - Namespaced sysctls

pub mod apparmor;
mod capabilities;
mod confinement;
pub mod seccomp;
pub mod selinux;
pub mod sysctl;

use std::collections::BTreeMap;

use bastion_common::BastionResult;
use serde::{Deserialize, Serialize};

pub use capabilities::{
    Capability, CapabilitySet, CapabilitySets, IMAGE_CAPABILITY_LABELS, UserIdentity,
    merge_capabilities, resolve_capabilities,
};
pub use confinement::{ConfinementConfig, compose_confinement};
pub use seccomp::SeccompDecision;
pub use selinux::SELinuxContext;
pub use sysctl::filter_sysctls;

use crate::config::RuntimeDefaults;
use crate::namespace::{NamespaceSet, TopologyResolver};

/// Declarative security request for one container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritySpec {
    /// Run with every capability and without confinement defaults.
    pub privileged: bool,
    /// Capabilities to add, possibly `ALL`.
    pub cap_add: Vec<String>,
    /// Capabilities to drop, possibly `ALL`.
    pub cap_drop: Vec<String>,
    /// Explicit SELinux label options.
    pub selinux_opts: Vec<String>,
    /// Explicit AppArmor profile.
    pub apparmor_profile: String,
    /// Explicit seccomp profile path, or `unconfined`.
    pub seccomp_profile_path: String,
    /// Read-only root filesystem.
    pub read_only_rootfs: Option<bool>,
    /// no_new_privs flag.
    pub no_new_privileges: Option<bool>,
    /// Labels declared by the image.
    pub image_labels: BTreeMap<String, String>,
    /// `user[:group]` the init process runs as.
    pub user: String,
    /// Per-container sysctls.
    pub sysctls: BTreeMap<String, String>,
}

/// A container creation request, as far as security is concerned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerRequest {
    /// Security request.
    pub security: SecuritySpec,
    /// Namespace topology.
    pub namespaces: NamespaceSet,
}

/// Resolved security configuration of a container.
///
/// Produced once per creation request and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedSecurityConfig {
    capabilities: CapabilitySets,
    confinement: ConfinementConfig,
    sysctls: BTreeMap<String, String>,
}

impl ResolvedSecurityConfig {
    /// Capability sets.
    #[must_use]
    pub const fn capabilities(&self) -> &CapabilitySets {
        &self.capabilities
    }

    /// SELinux, AppArmor and seccomp confinement.
    #[must_use]
    pub const fn confinement(&self) -> &ConfinementConfig {
        &self.confinement
    }

    /// Accepted sysctls.
    #[must_use]
    pub const fn sysctls(&self) -> &BTreeMap<String, String> {
        &self.sysctls
    }
}

/// Compose the full security configuration of a container.
///
/// # Errors
///
/// Returns the first error from capability resolution, confinement
/// composition or sysctl filtering, in that order.
pub fn compose(
    request: &ContainerRequest,
    defaults: &RuntimeDefaults,
    resolver: &dyn TopologyResolver,
) -> BastionResult<ResolvedSecurityConfig> {
    let spec = &request.security;
    let identity = UserIdentity::new(&spec.user, request.namespaces.user);

    let capabilities = resolve_capabilities(spec, defaults, &identity)?;
    let confinement = compose_confinement(spec, defaults, &request.namespaces, resolver)?;
    let sysctls = filter_sysctls(&defaults.default_sysctls, &spec.sysctls, &request.namespaces)?;

    tracing::info!(
        privileged = spec.privileged,
        root = identity.is_root(),
        bounding = capabilities.bounding().len(),
        sysctls = sysctls.len(),
        "Security configuration resolved"
    );

    Ok(ResolvedSecurityConfig {
        capabilities,
        confinement,
        sysctls,
    })
}

//! Runtime-wide security defaults.
//!
//! [`SecurityConf`] is the on-disk TOML configuration. [`RuntimeDefaults`]
//! combines it with a one-time snapshot of host features and is passed
//! explicitly into every resolution call.

use std::path::{Path, PathBuf};

use bastion_common::{BastionError, BastionResult, ConfPaths};
use serde::{Deserialize, Serialize};

use crate::host::HostFeatures;
use crate::security::{CapabilitySet, merge_capabilities};

/// Default AppArmor profile name.
pub const DEFAULT_APPARMOR_PROFILE: &str = "bastion-default";

/// On-disk security configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConf {
    /// Container defaults.
    pub containers: ContainersConf,
}

/// The `[containers]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainersConf {
    /// Capabilities granted to unprivileged containers; may contain `ALL`.
    pub default_capabilities: Vec<String>,
    /// AppArmor profile applied when none is requested.
    pub apparmor_profile: String,
    /// Sysctls applied to every container, as `KEY=VALUE`.
    pub default_sysctls: Vec<String>,
    /// Whether to apply SELinux labels when SELinux is enabled.
    pub label: bool,
    /// Seccomp profile applied when none is requested.
    pub seccomp_profile: Option<PathBuf>,
}

impl Default for ContainersConf {
    fn default() -> Self {
        Self {
            default_capabilities: CapabilitySet::container_defaults().names(),
            apparmor_profile: DEFAULT_APPARMOR_PROFILE.to_string(),
            default_sysctls: vec!["net.ipv4.ping_group_range=0 0".to_string()],
            label: true,
            seccomp_profile: None,
        }
    }
}

impl SecurityConf {
    /// Parse from TOML.
    ///
    /// # Errors
    ///
    /// Returns a serialization error for malformed TOML.
    pub fn from_toml(content: &str) -> BastionResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Read and parse a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> BastionResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| BastionError::Config {
            message: format!("Failed to read {}: {}", path.display(), e),
        })?;
        Self::from_toml(&content)
    }

    /// Load the first configuration file found, or built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn load(paths: &ConfPaths) -> BastionResult<Self> {
        if let Some(path) = paths.explicit.as_ref().filter(|p| !p.is_file()) {
            return Err(BastionError::Config {
                message: format!("Configuration file {} does not exist", path.display()),
            });
        }

        match paths.find_conf() {
            Some(path) => {
                tracing::debug!(path = %path.display(), "Loading security configuration");
                Self::from_file(&path)
            }
            None => {
                tracing::debug!("No security configuration found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }
}

/// Process-wide security defaults, loaded once at startup.
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeDefaults {
    /// Capabilities granted to unprivileged containers.
    pub default_capabilities: CapabilitySet,
    /// AppArmor profile applied when none is requested.
    pub apparmor_profile: String,
    /// Sysctls applied to every container, as `KEY=VALUE`.
    pub default_sysctls: Vec<String>,
    /// Kernel bounding set snapshot.
    pub bounding_set: CapabilitySet,
    /// Whether the kernel supports ambient capabilities.
    pub ambient_supported: bool,
    /// Whether SELinux labels are applied.
    pub labeling_enabled: bool,
    /// Whether AppArmor is enabled on the host.
    pub apparmor_enabled: bool,
    /// Seccomp profile applied when none is requested.
    pub seccomp_profile: PathBuf,
    /// Administrator override location of the default seccomp profile.
    pub seccomp_override_path: PathBuf,
    /// Vendor location of the default seccomp profile.
    pub seccomp_default_path: PathBuf,
}

impl RuntimeDefaults {
    /// Built-in defaults over the given bounding set, with every optional
    /// host feature off.
    #[must_use]
    pub fn new(bounding_set: CapabilitySet) -> Self {
        let paths = ConfPaths::with_root("/");
        Self {
            default_capabilities: CapabilitySet::container_defaults(),
            apparmor_profile: DEFAULT_APPARMOR_PROFILE.to_string(),
            default_sysctls: Vec::new(),
            bounding_set,
            ambient_supported: false,
            labeling_enabled: false,
            apparmor_enabled: false,
            seccomp_profile: paths.seccomp_default(),
            seccomp_override_path: paths.seccomp_override(),
            seccomp_default_path: paths.seccomp_default(),
        }
    }

    /// Load the configuration and snapshot host features.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the kernel
    /// bounding set cannot be read.
    pub fn load(paths: &ConfPaths, host: &dyn HostFeatures) -> BastionResult<Self> {
        let conf = SecurityConf::load(paths)?;
        Self::from_conf(&conf, paths, host)
    }

    /// Combine a parsed configuration with host features.
    ///
    /// # Errors
    ///
    /// Returns an error if a default capability name is invalid or the
    /// kernel bounding set cannot be read.
    pub fn from_conf(
        conf: &SecurityConf,
        paths: &ConfPaths,
        host: &dyn HostFeatures,
    ) -> BastionResult<Self> {
        let bounding_set = host.bounding_set()?;
        let containers = &conf.containers;

        let default_capabilities = merge_capabilities(
            &CapabilitySet::new(),
            &containers.default_capabilities,
            &[],
            &bounding_set,
        )?;

        let seccomp_override_path = paths.seccomp_override();
        let seccomp_default_path = paths.seccomp_default();
        let seccomp_profile = containers.seccomp_profile.clone().unwrap_or_else(|| {
            if seccomp_override_path.is_file() {
                seccomp_override_path.clone()
            } else {
                seccomp_default_path.clone()
            }
        });

        let defaults = Self {
            default_capabilities,
            apparmor_profile: containers.apparmor_profile.clone(),
            default_sysctls: containers.default_sysctls.clone(),
            bounding_set,
            ambient_supported: host.ambient_supported(),
            labeling_enabled: containers.label && host.selinux_enabled(),
            apparmor_enabled: host.apparmor_enabled(),
            seccomp_profile,
            seccomp_override_path,
            seccomp_default_path,
        };

        tracing::info!(
            bounding = defaults.bounding_set.len(),
            ambient = defaults.ambient_supported,
            labeling = defaults.labeling_enabled,
            apparmor = defaults.apparmor_enabled,
            seccomp = %defaults.seccomp_profile.display(),
            "Runtime security defaults loaded"
        );

        Ok(defaults)
    }

    /// Set the default capabilities.
    #[must_use]
    pub fn with_default_capabilities(mut self, caps: CapabilitySet) -> Self {
        self.default_capabilities = caps;
        self
    }

    /// Set the default AppArmor profile.
    #[must_use]
    pub fn with_apparmor_profile(mut self, profile: impl Into<String>) -> Self {
        self.apparmor_profile = profile.into();
        self
    }

    /// Set the default sysctls.
    #[must_use]
    pub fn with_default_sysctls<I, S>(mut self, sysctls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_sysctls = sysctls.into_iter().map(Into::into).collect();
        self
    }

    /// Set ambient capability support.
    #[must_use]
    pub const fn with_ambient(mut self, supported: bool) -> Self {
        self.ambient_supported = supported;
        self
    }

    /// Set SELinux labeling.
    #[must_use]
    pub const fn with_labeling(mut self, enabled: bool) -> Self {
        self.labeling_enabled = enabled;
        self
    }

    /// Set AppArmor enablement.
    #[must_use]
    pub const fn with_apparmor(mut self, enabled: bool) -> Self {
        self.apparmor_enabled = enabled;
        self
    }
}

//! Well-known configuration paths for Bastion.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;

/// Explicit configuration file, if set through the environment.
pub static BASTION_SECURITY_CONF: Lazy<Option<PathBuf>> =
    Lazy::new(|| std::env::var_os("BASTION_SECURITY_CONF").map(PathBuf::from));

/// System configuration directory (default: /etc/bastion).
pub static BASTION_ETC: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var("BASTION_ETC")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/etc/bastion"))
});

/// Vendor data directory (default: /usr/share/bastion).
pub static BASTION_SHARE: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var("BASTION_SHARE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/usr/share/bastion"))
});

const CONF_FILE: &str = "security.toml";
const SECCOMP_FILE: &str = "seccomp.json";

/// Configuration file locations, in lookup order.
#[derive(Debug, Clone)]
pub struct ConfPaths {
    /// Explicit override (environment or command line).
    pub explicit: Option<PathBuf>,
    /// Per-user configuration file.
    pub user: Option<PathBuf>,
    /// System configuration directory.
    pub etc: PathBuf,
    /// Vendor data directory.
    pub share: PathBuf,
}

impl ConfPaths {
    /// Create paths with default locations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create paths rooted under a custom prefix, with no user file.
    #[must_use]
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            explicit: None,
            user: None,
            etc: root.join("etc/bastion"),
            share: root.join("usr/share/bastion"),
        }
    }

    /// Use an explicit configuration file ahead of every other location.
    #[must_use]
    pub fn with_explicit(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit = Some(path.into());
        self
    }

    /// System configuration file.
    #[must_use]
    pub fn system_conf(&self) -> PathBuf {
        self.etc.join(CONF_FILE)
    }

    /// Seccomp profile that overrides the vendor default when present.
    #[must_use]
    pub fn seccomp_override(&self) -> PathBuf {
        self.etc.join(SECCOMP_FILE)
    }

    /// Vendor default seccomp profile.
    #[must_use]
    pub fn seccomp_default(&self) -> PathBuf {
        self.share.join(SECCOMP_FILE)
    }

    /// Candidate configuration files, highest priority first.
    #[must_use]
    pub fn candidates(&self) -> Vec<PathBuf> {
        self.explicit
            .iter()
            .chain(self.user.iter())
            .cloned()
            .chain(std::iter::once(self.system_conf()))
            .collect()
    }

    /// First candidate configuration file that exists.
    #[must_use]
    pub fn find_conf(&self) -> Option<PathBuf> {
        self.candidates().into_iter().find(|p| p.is_file())
    }
}

impl Default for ConfPaths {
    fn default() -> Self {
        Self {
            explicit: BASTION_SECURITY_CONF.clone(),
            user: dirs::config_dir().map(|d| d.join("bastion").join(CONF_FILE)),
            etc: BASTION_ETC.clone(),
            share: BASTION_SHARE.clone(),
        }
    }
}

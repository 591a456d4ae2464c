//! SELinux label resolution.
//!
//! Containers that share the PID or IPC namespace of another container must
//! run with that container's process label, and containers that share those
//! namespaces with the host must run without label confinement.

use std::fmt;
#[cfg(target_os = "linux")]
use std::path::Path;

use bastion_common::{BastionError, BastionResult};

use super::SecuritySpec;
use crate::config::RuntimeDefaults;
use crate::namespace::{NamespaceKind, NamespaceMode, NamespaceSet, TopologyResolver};

/// Label option that turns off label confinement.
pub const DISABLE_OPTION: &str = "disable";

/// The option set that turns off label confinement.
#[must_use]
pub fn disable_options() -> Vec<String> {
    vec![DISABLE_OPTION.to_string()]
}

/// SELinux context of a process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SELinuxContext {
    /// User component.
    pub user: String,
    /// Role component.
    pub role: String,
    /// Type component.
    pub type_: String,
    /// Level component (optional, may itself contain colons).
    pub level: Option<String>,
}

impl SELinuxContext {
    /// Parse a context string.
    ///
    /// # Errors
    ///
    /// Returns [`BastionError::InvalidLabel`] if fewer than three components are present.
    pub fn parse(context: &str) -> BastionResult<Self> {
        let parts: Vec<&str> = context.splitn(4, ':').collect();

        if parts.len() < 3 {
            return Err(BastionError::InvalidLabel {
                label: context.to_string(),
            });
        }

        Ok(Self {
            user: parts[0].to_string(),
            role: parts[1].to_string(),
            type_: parts[2].to_string(),
            level: parts
                .get(3)
                .filter(|s| !s.is_empty())
                .map(|s| (*s).to_string()),
        })
    }

    /// Label options that reproduce this context on another process.
    #[must_use]
    pub fn dup_options(&self) -> Vec<String> {
        let mut opts = vec![
            format!("user:{}", self.user),
            format!("role:{}", self.role),
            format!("type:{}", self.type_),
        ];
        if let Some(level) = &self.level {
            opts.push(format!("level:{level}"));
        }
        opts
    }

    /// Check if SELinux is enabled.
    #[cfg(target_os = "linux")]
    #[must_use]
    pub fn is_enabled() -> bool {
        Path::new("/sys/fs/selinux/enforce").exists()
    }

    /// Check if SELinux is enabled.
    #[cfg(not(target_os = "linux"))]
    #[must_use]
    pub const fn is_enabled() -> bool {
        false
    }
}

impl fmt::Display for SELinuxContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.level {
            Some(level) => write!(f, "{}:{}:{}:{}", self.user, self.role, self.type_, level),
            None => write!(f, "{}:{}:{}", self.user, self.role, self.type_),
        }
    }
}

/// Duplicate a process label into label options. An empty label yields none.
///
/// # Errors
///
/// Returns [`BastionError::InvalidLabel`] for malformed labels.
pub fn dup_label(label: &str) -> BastionResult<Vec<String>> {
    if label.is_empty() {
        return Ok(Vec::new());
    }
    Ok(SELinuxContext::parse(label)?.dup_options())
}

fn namespace_options(
    kind: NamespaceKind,
    mode: &NamespaceMode,
    resolver: &dyn TopologyResolver,
) -> BastionResult<Vec<String>> {
    match mode {
        NamespaceMode::Host => {
            tracing::debug!(namespace = %kind, "Host namespace, disabling label confinement");
            Ok(disable_options())
        }
        NamespaceMode::FromContainer(reference) => {
            let label = resolver.container_label(reference).ok_or_else(|| {
                BastionError::ReferenceNotFound {
                    kind: "container".to_string(),
                    reference: reference.clone(),
                }
            })?;
            tracing::debug!(
                namespace = %kind,
                container = %reference,
                label = %label,
                "Sharing container label"
            );
            dup_label(&label)
        }
        NamespaceMode::FromPod(reference) => {
            // Pod members already run with the pod's label
            resolver
                .pod_label(reference)
                .ok_or_else(|| BastionError::ReferenceNotFound {
                    kind: "pod".to_string(),
                    reference: reference.clone(),
                })?;
            Ok(Vec::new())
        }
        NamespaceMode::Private => Ok(Vec::new()),
    }
}

/// Resolve the SELinux label options for a container.
///
/// # Errors
///
/// Returns [`BastionError::ReferenceNotFound`] if a joined container or pod
/// no longer exists, or [`BastionError::InvalidLabel`] if its label is malformed.
pub fn resolve_label_options(
    spec: &SecuritySpec,
    defaults: &RuntimeDefaults,
    namespaces: &NamespaceSet,
    resolver: &dyn TopologyResolver,
) -> BastionResult<Vec<String>> {
    if !defaults.labeling_enabled || spec.privileged {
        return Ok(disable_options());
    }

    let mut opts = spec.selinux_opts.clone();
    opts.extend(namespace_options(NamespaceKind::Pid, &namespaces.pid, resolver)?);
    opts.extend(namespace_options(NamespaceKind::Ipc, &namespaces.ipc, resolver)?);
    Ok(opts)
}

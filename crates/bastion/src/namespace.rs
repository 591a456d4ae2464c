//! Namespace-sharing topology.
//!
//! Each namespace a container can share is described by a [`NamespaceMode`].
//! Joins name another container or pod by an opaque reference, resolved
//! through a [`TopologyResolver`] at composition time.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use bastion_common::{BastionError, BastionResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// How a container obtains one of its namespaces.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "ref", rename_all = "snake_case")]
pub enum NamespaceMode {
    /// A namespace of its own.
    #[default]
    Private,
    /// The host's namespace.
    Host,
    /// The namespace of another container.
    FromContainer(String),
    /// The namespace of a pod.
    FromPod(String),
}

impl NamespaceMode {
    /// Whether the namespace is shared with anything outside the container.
    #[must_use]
    pub const fn is_shared(&self) -> bool {
        !matches!(self, Self::Private)
    }

    /// Short name of the mode without its reference.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Host => "host",
            Self::FromContainer(_) => "container",
            Self::FromPod(_) => "pod",
        }
    }
}

impl fmt::Display for NamespaceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Private | Self::Host => f.write_str(self.kind_name()),
            Self::FromContainer(reference) | Self::FromPod(reference) => {
                write!(f, "{}:{}", self.kind_name(), reference)
            }
        }
    }
}

impl FromStr for NamespaceMode {
    type Err = BastionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || BastionError::InvalidNamespaceMode {
            value: s.to_string(),
        };

        match s.split_once(':') {
            None if s.is_empty() || s == "private" => Ok(Self::Private),
            None if s == "host" => Ok(Self::Host),
            Some(("container", reference)) if !reference.is_empty() => {
                Ok(Self::FromContainer(reference.to_string()))
            }
            Some(("pod", reference)) if !reference.is_empty() => {
                Ok(Self::FromPod(reference.to_string()))
            }
            _ => Err(invalid()),
        }
    }
}

/// Namespace kinds that gate security decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamespaceKind {
    /// PID namespace.
    Pid,
    /// IPC namespace.
    Ipc,
    /// UTS namespace.
    Uts,
    /// Network namespace.
    Network,
}

impl fmt::Display for NamespaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pid => "PID",
            Self::Ipc => "IPC",
            Self::Uts => "UTS",
            Self::Network => "Network",
        })
    }
}

/// User namespace mode, as far as capability resolution cares.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserNamespaceMode {
    /// Default user namespace handling.
    #[default]
    Private,
    /// The host's user namespace.
    Host,
    /// Keep the invoking user's identity inside the container.
    KeepId,
}

/// Namespace configuration of one container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamespaceSet {
    /// PID namespace.
    pub pid: NamespaceMode,
    /// IPC namespace.
    pub ipc: NamespaceMode,
    /// UTS namespace.
    pub uts: NamespaceMode,
    /// Network namespace.
    pub net: NamespaceMode,
    /// User namespace.
    pub user: UserNamespaceMode,
}

impl NamespaceSet {
    /// Mode of the given namespace.
    #[must_use]
    pub const fn mode(&self, kind: NamespaceKind) -> &NamespaceMode {
        match kind {
            NamespaceKind::Pid => &self.pid,
            NamespaceKind::Ipc => &self.ipc,
            NamespaceKind::Uts => &self.uts,
            NamespaceKind::Network => &self.net,
        }
    }

    /// Mutable mode of the given namespace.
    pub const fn mode_mut(&mut self, kind: NamespaceKind) -> &mut NamespaceMode {
        match kind {
            NamespaceKind::Pid => &mut self.pid,
            NamespaceKind::Ipc => &mut self.ipc,
            NamespaceKind::Uts => &mut self.uts,
            NamespaceKind::Network => &mut self.net,
        }
    }
}

/// Looks up the current process label of join targets.
///
/// Each lookup must be a single consistent read of the target's state; a
/// target that is gone or being removed is reported as `None`.
pub trait TopologyResolver: Send + Sync {
    /// Current process label of a container.
    fn container_label(&self, reference: &str) -> Option<String>;

    /// Current process label of a pod's shared namespaces.
    fn pod_label(&self, _reference: &str) -> Option<String> {
        None
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct RegistryState {
    containers: HashMap<String, String>,
    pods: HashMap<String, String>,
}

/// In-memory [`TopologyResolver`] keyed by container and pod reference.
#[derive(Debug, Default)]
pub struct ContainerRegistry {
    state: RwLock<RegistryState>,
}

impl ContainerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from JSON: `{"containers": {ref: label}, "pods": {ref: label}}`.
    ///
    /// # Errors
    ///
    /// Returns a serialization error for malformed JSON.
    pub fn from_json(json: &str) -> BastionResult<Self> {
        let state: RegistryState = serde_json::from_str(json)?;
        Ok(Self {
            state: RwLock::new(state),
        })
    }

    /// Register a container, or replace its process label.
    pub fn insert_container(&self, reference: impl Into<String>, label: impl Into<String>) {
        self.state
            .write()
            .containers
            .insert(reference.into(), label.into());
    }

    /// Remove a container, returning whether it existed.
    pub fn remove_container(&self, reference: &str) -> bool {
        self.state.write().containers.remove(reference).is_some()
    }

    /// Register a pod, or replace its process label.
    pub fn insert_pod(&self, reference: impl Into<String>, label: impl Into<String>) {
        self.state.write().pods.insert(reference.into(), label.into());
    }

    /// Remove a pod, returning whether it existed.
    pub fn remove_pod(&self, reference: &str) -> bool {
        self.state.write().pods.remove(reference).is_some()
    }
}

impl TopologyResolver for ContainerRegistry {
    fn container_label(&self, reference: &str) -> Option<String> {
        self.state.read().containers.get(reference).cloned()
    }

    fn pod_label(&self, reference: &str) -> Option<String> {
        self.state.read().pods.get(reference).cloned()
    }
}

//! Common error types for the Bastion security composer.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`BastionError`].
pub type BastionResult<T> = Result<T, BastionError>;

/// Broad failure classes surfaced to callers.
///
/// None of these are retried internally; each one ends the single
/// container-creation attempt that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input or an unsupported explicit request.
    Validation,
    /// A request that contradicts the namespace-sharing topology.
    Conflict,
    /// A join reference that no longer resolves.
    NotFound,
    /// A host query that must succeed for resolution to make sense.
    Host,
    /// Configuration loading and parsing.
    Config,
    /// Should not happen.
    Internal,
}

/// Errors produced while composing a container's security configuration.
#[derive(Error, Diagnostic, Debug)]
pub enum BastionError {
    /// Unknown or malformed capability name.
    #[error("Invalid capability: {name}")]
    #[diagnostic(
        code(bastion::capability::invalid),
        help("Use names like 'NET_ADMIN' or 'CAP_NET_ADMIN', or 'ALL'")
    )]
    InvalidCapability {
        /// The offending name as given.
        name: String,
    },

    /// The same capability was both added and dropped.
    #[error("Capability {name} cannot be dropped and added")]
    #[diagnostic(code(bastion::capability::conflict))]
    CapabilityConflict {
        /// The capability present in both lists.
        name: String,
    },

    /// Malformed or disallowed sysctl.
    #[error("Invalid sysctl {entry}: {reason}")]
    #[diagnostic(
        code(bastion::sysctl::invalid),
        help("Only namespaced sysctls are allowed: kernel.msg*, kernel.sem, kernel.shm*, net.*, fs.mqueue.*")
    )]
    InvalidSysctl {
        /// The offending entry.
        entry: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Explicit sysctl request incompatible with the namespace-sharing mode.
    #[error("sysctl {key}={value} can't be set since {namespace} namespace is {mode}: invalid argument")]
    #[diagnostic(
        code(bastion::sysctl::conflict),
        help("Use a private namespace or drop the sysctl")
    )]
    SysctlConflict {
        /// The sysctl key.
        key: String,
        /// The requested value.
        value: String,
        /// Namespace kind gating the key (IPC, Network, UTS).
        namespace: String,
        /// How that namespace is shared.
        mode: String,
    },

    /// Explicit confinement profile requested for a disabled subsystem.
    #[error("{subsystem} profile {profile:?} specified, but {subsystem} is not enabled on this system")]
    #[diagnostic(code(bastion::profile::unsupported))]
    UnsupportedProfile {
        /// The confinement subsystem.
        subsystem: String,
        /// The requested profile.
        profile: String,
    },

    /// A process label that cannot be duplicated into label options.
    #[error("Failed to duplicate label {label:?}")]
    #[diagnostic(code(bastion::label::invalid))]
    InvalidLabel {
        /// The label as read from the target.
        label: String,
    },

    /// Unknown signal name or number.
    #[error("Invalid signal: {signal}")]
    #[diagnostic(code(bastion::signal::invalid))]
    InvalidSignal {
        /// The raw signal as given.
        signal: String,
    },

    /// Unparseable namespace mode.
    #[error("Invalid namespace mode: {value}")]
    #[diagnostic(
        code(bastion::namespace::invalid_mode),
        help("Use 'private', 'host', 'container:<ref>' or 'pod:<ref>'")
    )]
    InvalidNamespaceMode {
        /// The raw value.
        value: String,
    },

    /// A join reference did not resolve.
    #[error("{kind} {reference:?} not found")]
    #[diagnostic(code(bastion::reference::not_found))]
    ReferenceNotFound {
        /// "container" or "pod".
        kind: String,
        /// The opaque reference.
        reference: String,
    },

    /// A host feature query failed.
    #[error("Failed to query {what}: {message}")]
    #[diagnostic(code(bastion::host))]
    HostQuery {
        /// What was being queried.
        what: String,
        /// The underlying error.
        message: String,
    },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    #[diagnostic(code(bastion::config))]
    Config {
        /// The error message.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(bastion::io))]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    #[diagnostic(code(bastion::serialization))]
    Serialization(String),

    /// Internal error (should not happen).
    #[error("Internal error: {message}")]
    #[diagnostic(
        code(bastion::internal),
        help("This is a bug, please report it at https://github.com/bastion-containers/bastion/issues")
    )]
    Internal {
        /// The error message.
        message: String,
    },
}

impl BastionError {
    /// The failure class of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidCapability { .. }
            | Self::CapabilityConflict { .. }
            | Self::InvalidSysctl { .. }
            | Self::UnsupportedProfile { .. }
            | Self::InvalidLabel { .. }
            | Self::InvalidSignal { .. }
            | Self::InvalidNamespaceMode { .. } => ErrorKind::Validation,
            Self::SysctlConflict { .. } => ErrorKind::Conflict,
            Self::ReferenceNotFound { .. } => ErrorKind::NotFound,
            Self::HostQuery { .. } => ErrorKind::Host,
            Self::Config { .. } | Self::Io(_) | Self::Serialization(_) => ErrorKind::Config,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Whether callers should report this as an invalid-argument failure.
    #[must_use]
    pub const fn is_invalid_argument(&self) -> bool {
        matches!(self.kind(), ErrorKind::Conflict)
    }
}

impl From<serde_json::Error> for BastionError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for BastionError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

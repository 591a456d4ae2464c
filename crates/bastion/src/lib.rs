//! # Bastion
//!
//! Bastion composes the security configuration of a Linux container from a
//! declarative request, the runtime-wide defaults and the namespace topology.
//!
//! ## Features
//!
//! - **Capabilities**: bounding, effective, inheritable and ambient sets
//! - **Confinement**: SELinux label options, AppArmor profiles, seccomp selection
//! - **Sysctls**: namespaced sysctls gated by namespace sharing
//! - **Signals**: per-platform signal tables and a forwarding proxy
//!
//! ## Usage
//!
//! ```no_run
//! use bastion::config::RuntimeDefaults;
//! use bastion::host::LinuxHost;
//! use bastion::namespace::ContainerRegistry;
//! use bastion::security::{ContainerRequest, compose};
//! use bastion_common::ConfPaths;
//!
//! # fn example() -> bastion_common::BastionResult<()> {
//! // Load once at startup
//! let defaults = RuntimeDefaults::load(&ConfPaths::new(), &LinuxHost)?;
//! let registry = ContainerRegistry::new();
//!
//! // Resolve per container
//! let request: ContainerRequest = serde_json::from_str(r#"{"security": {"cap_add": ["NET_ADMIN"]}}"#)?;
//! let resolved = compose(&request, &defaults, &registry)?;
//! println!("{:?}", resolved.capabilities().bounding());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod host;
pub mod namespace;
pub mod security;
pub mod signal;

pub use config::RuntimeDefaults;
pub use security::{ContainerRequest, ResolvedSecurityConfig, compose};

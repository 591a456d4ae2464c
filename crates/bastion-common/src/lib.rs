//! # bastion-common
//!
//! Shared types for the Bastion security composer.
//!
//! This crate provides functionality used across all Bastion crates:
//! - The common error type and its failure taxonomy
//! - Well-known configuration and seccomp profile paths

#![warn(missing_docs)]

pub mod error;
pub mod paths;

pub use error::{BastionError, BastionResult, ErrorKind};
pub use paths::ConfPaths;

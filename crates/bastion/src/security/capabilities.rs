//! Linux capability resolution.
//!
//! Derives the bounding, effective/permitted, inheritable and ambient sets a
//! container's init process runs with, from the runtime defaults, the
//! user's add/drop lists, the image's declared requirements and the identity
//! the process runs as.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use bastion_common::{BastionError, BastionResult};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use super::SecuritySpec;
use crate::config::RuntimeDefaults;
use crate::namespace::UserNamespaceMode;

/// Image label keys that declare the capabilities a container requires.
pub const IMAGE_CAPABILITY_LABELS: &[&str] = &["io.containers.capabilities"];

/// Linux capability, ordered by kernel capability number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Capability {
    /// CAP_CHOWN
    Chown,
    /// CAP_DAC_OVERRIDE
    DacOverride,
    /// CAP_DAC_READ_SEARCH
    DacReadSearch,
    /// CAP_FOWNER
    Fowner,
    /// CAP_FSETID
    Fsetid,
    /// CAP_KILL
    Kill,
    /// CAP_SETGID
    Setgid,
    /// CAP_SETUID
    Setuid,
    /// CAP_SETPCAP
    Setpcap,
    /// CAP_LINUX_IMMUTABLE
    LinuxImmutable,
    /// CAP_NET_BIND_SERVICE
    NetBindService,
    /// CAP_NET_BROADCAST
    NetBroadcast,
    /// CAP_NET_ADMIN
    NetAdmin,
    /// CAP_NET_RAW
    NetRaw,
    /// CAP_IPC_LOCK
    IpcLock,
    /// CAP_IPC_OWNER
    IpcOwner,
    /// CAP_SYS_MODULE
    SysModule,
    /// CAP_SYS_RAWIO
    SysRawio,
    /// CAP_SYS_CHROOT
    SysChroot,
    /// CAP_SYS_PTRACE
    SysPtrace,
    /// CAP_SYS_PACCT
    SysPacct,
    /// CAP_SYS_ADMIN
    SysAdmin,
    /// CAP_SYS_BOOT
    SysBoot,
    /// CAP_SYS_NICE
    SysNice,
    /// CAP_SYS_RESOURCE
    SysResource,
    /// CAP_SYS_TIME
    SysTime,
    /// CAP_SYS_TTY_CONFIG
    SysTtyConfig,
    /// CAP_MKNOD
    Mknod,
    /// CAP_LEASE
    Lease,
    /// CAP_AUDIT_WRITE
    AuditWrite,
    /// CAP_AUDIT_CONTROL
    AuditControl,
    /// CAP_SETFCAP
    Setfcap,
    /// CAP_MAC_OVERRIDE
    MacOverride,
    /// CAP_MAC_ADMIN
    MacAdmin,
    /// CAP_SYSLOG
    Syslog,
    /// CAP_WAKE_ALARM
    WakeAlarm,
    /// CAP_BLOCK_SUSPEND
    BlockSuspend,
    /// CAP_AUDIT_READ
    AuditRead,
    /// CAP_PERFMON
    Perfmon,
    /// CAP_BPF
    Bpf,
    /// CAP_CHECKPOINT_RESTORE
    CheckpointRestore,
}

impl Capability {
    /// Every capability known to this build, in kernel order.
    pub const ALL: [Self; 41] = [
        Self::Chown,
        Self::DacOverride,
        Self::DacReadSearch,
        Self::Fowner,
        Self::Fsetid,
        Self::Kill,
        Self::Setgid,
        Self::Setuid,
        Self::Setpcap,
        Self::LinuxImmutable,
        Self::NetBindService,
        Self::NetBroadcast,
        Self::NetAdmin,
        Self::NetRaw,
        Self::IpcLock,
        Self::IpcOwner,
        Self::SysModule,
        Self::SysRawio,
        Self::SysChroot,
        Self::SysPtrace,
        Self::SysPacct,
        Self::SysAdmin,
        Self::SysBoot,
        Self::SysNice,
        Self::SysResource,
        Self::SysTime,
        Self::SysTtyConfig,
        Self::Mknod,
        Self::Lease,
        Self::AuditWrite,
        Self::AuditControl,
        Self::Setfcap,
        Self::MacOverride,
        Self::MacAdmin,
        Self::Syslog,
        Self::WakeAlarm,
        Self::BlockSuspend,
        Self::AuditRead,
        Self::Perfmon,
        Self::Bpf,
        Self::CheckpointRestore,
    ];

    /// Get the capability name as a string.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Chown => "CAP_CHOWN",
            Self::DacOverride => "CAP_DAC_OVERRIDE",
            Self::DacReadSearch => "CAP_DAC_READ_SEARCH",
            Self::Fowner => "CAP_FOWNER",
            Self::Fsetid => "CAP_FSETID",
            Self::Kill => "CAP_KILL",
            Self::Setgid => "CAP_SETGID",
            Self::Setuid => "CAP_SETUID",
            Self::Setpcap => "CAP_SETPCAP",
            Self::LinuxImmutable => "CAP_LINUX_IMMUTABLE",
            Self::NetBindService => "CAP_NET_BIND_SERVICE",
            Self::NetBroadcast => "CAP_NET_BROADCAST",
            Self::NetAdmin => "CAP_NET_ADMIN",
            Self::NetRaw => "CAP_NET_RAW",
            Self::IpcLock => "CAP_IPC_LOCK",
            Self::IpcOwner => "CAP_IPC_OWNER",
            Self::SysModule => "CAP_SYS_MODULE",
            Self::SysRawio => "CAP_SYS_RAWIO",
            Self::SysChroot => "CAP_SYS_CHROOT",
            Self::SysPtrace => "CAP_SYS_PTRACE",
            Self::SysPacct => "CAP_SYS_PACCT",
            Self::SysAdmin => "CAP_SYS_ADMIN",
            Self::SysBoot => "CAP_SYS_BOOT",
            Self::SysNice => "CAP_SYS_NICE",
            Self::SysResource => "CAP_SYS_RESOURCE",
            Self::SysTime => "CAP_SYS_TIME",
            Self::SysTtyConfig => "CAP_SYS_TTY_CONFIG",
            Self::Mknod => "CAP_MKNOD",
            Self::Lease => "CAP_LEASE",
            Self::AuditWrite => "CAP_AUDIT_WRITE",
            Self::AuditControl => "CAP_AUDIT_CONTROL",
            Self::Setfcap => "CAP_SETFCAP",
            Self::MacOverride => "CAP_MAC_OVERRIDE",
            Self::MacAdmin => "CAP_MAC_ADMIN",
            Self::Syslog => "CAP_SYSLOG",
            Self::WakeAlarm => "CAP_WAKE_ALARM",
            Self::BlockSuspend => "CAP_BLOCK_SUSPEND",
            Self::AuditRead => "CAP_AUDIT_READ",
            Self::Perfmon => "CAP_PERFMON",
            Self::Bpf => "CAP_BPF",
            Self::CheckpointRestore => "CAP_CHECKPOINT_RESTORE",
        }
    }

    /// Convert from the `caps` crate's representation.
    ///
    /// Returns `None` for capabilities newer than this build knows about.
    #[must_use]
    pub fn from_caps(cap: caps::Capability) -> Option<Self> {
        cap.to_string().parse().ok()
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Capability {
    type Err = BastionError;

    /// Parses `net_admin`, `NET_ADMIN` or `CAP_NET_ADMIN`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let full = if upper.starts_with("CAP_") {
            upper
        } else {
            format!("CAP_{upper}")
        };

        Self::ALL
            .into_iter()
            .find(|cap| cap.name() == full)
            .ok_or_else(|| BastionError::InvalidCapability {
                name: s.to_string(),
            })
    }
}

impl TryFrom<String> for Capability {
    type Error = BastionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Capability> for String {
    fn from(cap: Capability) -> Self {
        cap.name().to_string()
    }
}

/// Ordered set of capabilities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    /// Create an empty capability set.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Every capability this build knows about.
    #[must_use]
    pub fn all() -> Self {
        Capability::ALL.into_iter().collect()
    }

    /// Default capabilities granted to unprivileged containers.
    #[must_use]
    pub fn container_defaults() -> Self {
        [
            Capability::Chown,
            Capability::DacOverride,
            Capability::Fowner,
            Capability::Fsetid,
            Capability::Kill,
            Capability::NetBindService,
            Capability::Setfcap,
            Capability::Setgid,
            Capability::Setpcap,
            Capability::Setuid,
            Capability::SysChroot,
        ]
        .into_iter()
        .collect()
    }

    /// Parse a list of capability names. `ALL` is not accepted here.
    ///
    /// # Errors
    ///
    /// Returns [`BastionError::InvalidCapability`] for unknown names.
    pub fn parse_names<S: AsRef<str>>(names: &[S]) -> BastionResult<Self> {
        names.iter().map(|n| n.as_ref().parse()).collect()
    }

    /// Whether the set contains `cap`.
    #[must_use]
    pub fn contains(&self, cap: Capability) -> bool {
        self.0.contains(&cap)
    }

    /// Add a capability, returning whether it was newly inserted.
    pub fn insert(&mut self, cap: Capability) -> bool {
        self.0.insert(cap)
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of capabilities in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate in kernel order.
    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }

    /// Capabilities present in both sets.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        self.0.intersection(&other.0).copied().collect()
    }

    /// Whether every member of `self` is in `other`.
    #[must_use]
    pub fn is_subset(&self, other: &Self) -> bool {
        self.0.is_subset(&other.0)
    }

    /// Capability names in kernel order (`CAP_*` form).
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.iter().map(String::from).collect()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a CapabilitySet {
    type Item = &'a Capability;
    type IntoIter = std::collections::btree_set::Iter<'a, Capability>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A user-written capability list: named capabilities, possibly with `ALL`.
#[derive(Debug, Clone, Default)]
struct CapabilityRequest {
    all: bool,
    caps: CapabilitySet,
}

impl CapabilityRequest {
    fn parse<S: AsRef<str>>(names: &[S]) -> BastionResult<Self> {
        let mut request = Self::default();
        for name in names {
            let name = name.as_ref();
            if name.trim().eq_ignore_ascii_case("ALL") {
                request.all = true;
            } else {
                request.caps.insert(name.parse()?);
            }
        }
        Ok(request)
    }

    fn is_empty(&self) -> bool {
        !self.all && self.caps.is_empty()
    }

    /// `ALL` expands to the kernel bounding set.
    fn expand(self, bounding: &CapabilitySet) -> CapabilitySet {
        if self.all {
            bounding.iter().chain(self.caps.iter()).collect()
        } else {
            self.caps
        }
    }
}

/// Merge capability add/drop lists onto a base set.
///
/// - Dropping `ALL` keeps only the explicitly added capabilities.
/// - Adding `ALL` starts from the kernel bounding set.
/// - A capability may not appear in both lists.
///
/// # Errors
///
/// Returns [`BastionError::InvalidCapability`] for unknown names and
/// [`BastionError::CapabilityConflict`] when add and drop overlap.
pub fn merge_capabilities<S: AsRef<str>>(
    base: &CapabilitySet,
    add: &[S],
    drop: &[S],
    bounding: &CapabilitySet,
) -> BastionResult<CapabilitySet> {
    let add = CapabilityRequest::parse(add)?;
    let drop = CapabilityRequest::parse(drop)?;

    if add.is_empty() && drop.is_empty() {
        return Ok(base.clone());
    }

    if drop.all {
        if add.all {
            return Err(BastionError::CapabilityConflict {
                name: "ALL".to_string(),
            });
        }
        return Ok(add.caps);
    }

    let (base, add) = if add.all {
        (bounding.clone(), CapabilitySet::new())
    } else {
        (base.clone(), add.caps)
    };

    if let Some(cap) = add.iter().find(|cap| drop.caps.contains(*cap)) {
        return Err(BastionError::CapabilityConflict {
            name: cap.name().to_string(),
        });
    }

    Ok(base
        .iter()
        .filter(|cap| !drop.caps.contains(*cap))
        .chain(add.iter())
        .collect())
}

/// The identity the container's init process runs as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    user: String,
    userns: UserNamespaceMode,
}

impl UserIdentity {
    /// Build from a `user[:group]` string and the user-namespace mode.
    #[must_use]
    pub fn new(user_spec: &str, userns: UserNamespaceMode) -> Self {
        let user = user_spec
            .split_once(':')
            .map_or(user_spec, |(user, _)| user);
        Self {
            user: user.to_string(),
            userns,
        }
    }

    /// The user part of the identity.
    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Whether the process runs with root's capability semantics.
    ///
    /// An explicit user decides on its own: only `root` or `0` is root, in
    /// every user namespace mode. An unset user is root unless the host
    /// identity is kept.
    #[must_use]
    pub fn is_root(&self) -> bool {
        match self.user.as_str() {
            "root" | "0" => true,
            "" => self.userns != UserNamespaceMode::KeepId,
            _ => false,
        }
    }
}

/// The resolved capability sets of a container's init process.
///
/// Effective and permitted are always equal, so only one is stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySets {
    bounding: CapabilitySet,
    effective: CapabilitySet,
    inheritable: CapabilitySet,
    ambient: CapabilitySet,
}

impl CapabilitySets {
    /// Bounding set.
    #[must_use]
    pub const fn bounding(&self) -> &CapabilitySet {
        &self.bounding
    }

    /// Effective set.
    #[must_use]
    pub const fn effective(&self) -> &CapabilitySet {
        &self.effective
    }

    /// Permitted set (identical to the effective set).
    #[must_use]
    pub const fn permitted(&self) -> &CapabilitySet {
        &self.effective
    }

    /// Inheritable set.
    #[must_use]
    pub const fn inheritable(&self) -> &CapabilitySet {
        &self.inheritable
    }

    /// Ambient set.
    #[must_use]
    pub const fn ambient(&self) -> &CapabilitySet {
        &self.ambient
    }
}

impl Serialize for CapabilitySets {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("CapabilitySets", 5)?;
        state.serialize_field("bounding", &self.bounding)?;
        state.serialize_field("effective", &self.effective)?;
        state.serialize_field("permitted", &self.effective)?;
        state.serialize_field("inheritable", &self.inheritable)?;
        state.serialize_field("ambient", &self.ambient)?;
        state.end()
    }
}

fn required_capabilities_label(labels: &BTreeMap<String, String>) -> Option<&str> {
    IMAGE_CAPABILITY_LABELS
        .iter()
        .find_map(|key| labels.get(*key))
        .map(String::as_str)
}

/// Narrow `working` to the capabilities the image declares it needs.
///
/// An unsatisfiable declaration is logged and `working` is returned as is.
fn apply_image_requirements(
    working: CapabilitySet,
    labels: &BTreeMap<String, String>,
    kernel: &CapabilitySet,
) -> BastionResult<CapabilitySet> {
    let Some(value) = required_capabilities_label(labels) else {
        return Ok(working);
    };

    let requested: Vec<&str> = value.split(',').collect();
    if matches!(requested.as_slice(), [only] if only.trim().is_empty()) {
        tracing::debug!("Image declares no required capabilities");
        return Ok(CapabilitySet::new());
    }

    let required = CapabilityRequest::parse(&requested)?.expand(kernel);
    let missing: Vec<&str> = required
        .iter()
        .filter(|cap| !working.contains(*cap))
        .map(Capability::name)
        .collect();

    if missing.is_empty() {
        tracing::debug!(
            required = ?required.names(),
            "Narrowing bounding set to image requirements"
        );
        Ok(required)
    } else {
        tracing::error!(
            missing = %missing.join(","),
            "Capabilities requested by image are not allowed by default"
        );
        Ok(working)
    }
}

/// Resolve the capability sets for a container's init process.
///
/// # Errors
///
/// Returns a validation error for malformed capability names or
/// conflicting add/drop lists.
pub fn resolve_capabilities(
    spec: &SecuritySpec,
    defaults: &RuntimeDefaults,
    identity: &UserIdentity,
) -> BastionResult<CapabilitySets> {
    let kernel = &defaults.bounding_set;

    let bounding = if spec.privileged {
        tracing::debug!("Privileged container, granting full bounding set");
        kernel.clone()
    } else {
        let merged = merge_capabilities(
            &defaults.default_capabilities,
            &spec.cap_add,
            &spec.cap_drop,
            kernel,
        )?;
        apply_image_requirements(merged.intersection(kernel), &spec.image_labels, kernel)?
    };

    if identity.is_root() {
        return Ok(CapabilitySets {
            effective: bounding.clone(),
            bounding,
            inheritable: CapabilitySet::new(),
            ambient: CapabilitySet::new(),
        });
    }

    let user_caps = CapabilityRequest::parse(&spec.cap_add)?
        .expand(kernel)
        .intersection(kernel)
        .intersection(&bounding);
    tracing::debug!(user = identity.user(), caps = ?user_caps.names(), "Non-root capability set");

    let ambient = if defaults.ambient_supported {
        user_caps.clone()
    } else {
        CapabilitySet::new()
    };

    Ok(CapabilitySets {
        bounding,
        effective: user_caps,
        inheritable: ambient.clone(),
        ambient,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(names: &[&str]) -> CapabilitySet {
        CapabilitySet::parse_names(names).unwrap()
    }

    fn defaults() -> RuntimeDefaults {
        RuntimeDefaults::new(CapabilitySet::all())
            .with_default_capabilities(caps(&["CHOWN", "SETUID"]))
    }

    fn root() -> UserIdentity {
        UserIdentity::new("root", UserNamespaceMode::Private)
    }

    #[test]
    fn test_capability_parse() {
        assert_eq!("net_admin".parse::<Capability>().unwrap(), Capability::NetAdmin);
        assert_eq!("CAP_NET_ADMIN".parse::<Capability>().unwrap(), Capability::NetAdmin);
        assert_eq!(" Sys_Admin ".parse::<Capability>().unwrap(), Capability::SysAdmin);
        assert!("NET_WIZARD".parse::<Capability>().is_err());
        assert!("".parse::<Capability>().is_err());
    }

    #[test]
    fn test_capability_names_round_trip() {
        for cap in Capability::ALL {
            assert_eq!(cap.name().parse::<Capability>().unwrap(), cap);
        }
    }

    #[test]
    fn test_from_caps_crate() {
        assert_eq!(
            Capability::from_caps(caps::Capability::CAP_BPF),
            Some(Capability::Bpf)
        );
    }

    #[test]
    fn test_set_serializes_in_kernel_order() {
        let set = caps(&["SETUID", "CHOWN", "NET_ADMIN"]);
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"["CAP_CHOWN","CAP_SETUID","CAP_NET_ADMIN"]"#);
        let back: CapabilitySet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
    }

    #[test]
    fn test_merge_add_and_drop() {
        let base = caps(&["CHOWN", "SETUID", "KILL"]);
        let merged =
            merge_capabilities(&base, &["NET_ADMIN"], &["KILL"], &CapabilitySet::all()).unwrap();
        assert_eq!(merged, caps(&["CHOWN", "SETUID", "NET_ADMIN"]));
    }

    #[test]
    fn test_merge_drop_all_keeps_adds() {
        let base = caps(&["CHOWN", "SETUID"]);
        let merged =
            merge_capabilities(&base, &["NET_RAW"], &["all"], &CapabilitySet::all()).unwrap();
        assert_eq!(merged, caps(&["NET_RAW"]));
    }

    #[test]
    fn test_merge_add_all_uses_bounding() {
        let bounding = caps(&["CHOWN", "SYS_ADMIN", "NET_ADMIN"]);
        let merged =
            merge_capabilities(&CapabilitySet::new(), &["ALL"], &["SYS_ADMIN"], &bounding)
                .unwrap();
        assert_eq!(merged, caps(&["CHOWN", "NET_ADMIN"]));
    }

    #[test]
    fn test_merge_conflicts() {
        let all = CapabilitySet::all();
        let err = merge_capabilities(&all, &["NET_ADMIN"], &["CAP_NET_ADMIN"], &all).unwrap_err();
        assert!(matches!(err, BastionError::CapabilityConflict { .. }));

        let err = merge_capabilities(&all, &["ALL"], &["ALL"], &all).unwrap_err();
        assert!(matches!(err, BastionError::CapabilityConflict { .. }));
    }

    #[test]
    fn test_merge_invalid_name() {
        let all = CapabilitySet::all();
        let err = merge_capabilities(&all, &["NOT_A_CAP"], &[], &all).unwrap_err();
        assert!(matches!(err, BastionError::InvalidCapability { name } if name == "NOT_A_CAP"));
    }

    #[test]
    fn test_identity() {
        assert!(UserIdentity::new("", UserNamespaceMode::Private).is_root());
        assert!(UserIdentity::new("0:0", UserNamespaceMode::KeepId).is_root());
        assert!(UserIdentity::new("root", UserNamespaceMode::Host).is_root());
        assert!(!UserIdentity::new("", UserNamespaceMode::KeepId).is_root());
        assert!(!UserIdentity::new("1000:1000", UserNamespaceMode::Private).is_root());
        assert_eq!(UserIdentity::new("app:wheel", UserNamespaceMode::Private).user(), "app");
    }

    #[test]
    fn test_root_scenario() {
        let spec = SecuritySpec {
            cap_add: vec!["NET_ADMIN".to_string()],
            ..Default::default()
        };
        let sets = resolve_capabilities(&spec, &defaults(), &root()).unwrap();
        assert_eq!(sets.bounding(), &caps(&["CHOWN", "SETUID", "NET_ADMIN"]));
        assert_eq!(sets.effective(), sets.bounding());
        assert_eq!(sets.permitted(), sets.bounding());
        assert!(sets.inheritable().is_empty());
        assert!(sets.ambient().is_empty());
    }

    #[test]
    fn test_kernel_filters_unsupported() {
        let defaults = RuntimeDefaults::new(caps(&["CHOWN", "SETUID"]))
            .with_default_capabilities(caps(&["CHOWN", "SETUID", "BPF"]));
        let spec = SecuritySpec {
            cap_add: vec!["PERFMON".to_string()],
            ..Default::default()
        };
        let sets = resolve_capabilities(&spec, &defaults, &root()).unwrap();
        assert_eq!(sets.bounding(), &caps(&["CHOWN", "SETUID"]));
    }

    #[test]
    fn test_privileged_gets_kernel_set() {
        let kernel = caps(&["CHOWN", "SYS_ADMIN", "NET_ADMIN"]);
        let spec = SecuritySpec {
            privileged: true,
            cap_drop: vec!["SYS_ADMIN".to_string()],
            ..Default::default()
        };
        let sets = resolve_capabilities(&spec, &RuntimeDefaults::new(kernel.clone()), &root())
            .unwrap();
        assert_eq!(sets.bounding(), &kernel);
        assert_eq!(sets.effective(), &kernel);
        assert!(sets.inheritable().is_empty());
    }

    #[test]
    fn test_image_label_empty_clears_bounding() {
        let mut spec = SecuritySpec::default();
        spec.image_labels
            .insert(IMAGE_CAPABILITY_LABELS[0].to_string(), String::new());
        let sets = resolve_capabilities(&spec, &defaults(), &root()).unwrap();
        assert!(sets.bounding().is_empty());
        assert!(sets.effective().is_empty());
    }

    #[test]
    fn test_image_label_narrows_bounding() {
        let mut spec = SecuritySpec::default();
        spec.image_labels
            .insert(IMAGE_CAPABILITY_LABELS[0].to_string(), "chown".to_string());
        let sets = resolve_capabilities(&spec, &defaults(), &root()).unwrap();
        assert_eq!(sets.bounding(), &caps(&["CHOWN"]));
    }

    #[test]
    fn test_image_label_unsatisfied_keeps_bounding() {
        let mut spec = SecuritySpec::default();
        spec.image_labels.insert(
            IMAGE_CAPABILITY_LABELS[0].to_string(),
            "CAP_CHOWN,CAP_SYS_ADMIN".to_string(),
        );
        let sets = resolve_capabilities(&spec, &defaults(), &root()).unwrap();
        assert_eq!(sets.bounding(), &caps(&["CHOWN", "SETUID"]));
    }

    #[test]
    fn test_image_label_invalid_name() {
        let mut spec = SecuritySpec::default();
        spec.image_labels
            .insert(IMAGE_CAPABILITY_LABELS[0].to_string(), "CHOWN,BOGUS".to_string());
        let err = resolve_capabilities(&spec, &defaults(), &root()).unwrap_err();
        assert!(matches!(err, BastionError::InvalidCapability { .. }));
    }

    #[test]
    fn test_non_root_uses_cap_add_only() {
        let spec = SecuritySpec {
            cap_add: vec!["NET_BIND_SERVICE".to_string()],
            cap_drop: vec!["CHOWN".to_string()],
            ..Default::default()
        };
        let identity = UserIdentity::new("1000", UserNamespaceMode::Private);

        let sets = resolve_capabilities(&spec, &defaults(), &identity).unwrap();
        assert_eq!(sets.bounding(), &caps(&["SETUID", "NET_BIND_SERVICE"]));
        assert_eq!(sets.effective(), &caps(&["NET_BIND_SERVICE"]));
        assert!(sets.ambient().is_empty());
        assert!(sets.inheritable().is_empty());

        let sets =
            resolve_capabilities(&spec, &defaults().with_ambient(true), &identity).unwrap();
        assert_eq!(sets.ambient(), &caps(&["NET_BIND_SERVICE"]));
        assert_eq!(sets.inheritable(), &caps(&["NET_BIND_SERVICE"]));
    }

    #[test]
    fn test_serialized_sets_include_permitted() {
        let sets = resolve_capabilities(&SecuritySpec::default(), &defaults(), &root()).unwrap();
        let value = serde_json::to_value(&sets).unwrap();
        assert_eq!(value["permitted"], value["effective"]);
        assert_eq!(value["bounding"][0], "CAP_CHOWN");
    }
}

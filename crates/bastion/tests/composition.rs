//! Integration tests for full security composition.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::Arc;

use bastion::config::{RuntimeDefaults, SecurityConf};
use bastion::host::StaticHost;
use bastion::namespace::{ContainerRegistry, NamespaceKind, NamespaceMode, NamespaceSet};
use bastion::security::{CapabilitySet, ContainerRequest, SecuritySpec, compose};
use bastion_common::{BastionError, ConfPaths, ErrorKind};
use parking_lot::Mutex;

fn caps(names: &[&str]) -> CapabilitySet {
    CapabilitySet::parse_names(names).unwrap()
}

fn defaults() -> RuntimeDefaults {
    RuntimeDefaults::new(CapabilitySet::all())
        .with_default_capabilities(caps(&["CHOWN", "SETUID"]))
        .with_labeling(true)
        .with_apparmor(true)
        .with_default_sysctls([
            "net.ipv4.ping_group_range=0 0",
            "fs.mqueue.msg_max=64",
            "kernel.domainname=example.com",
        ])
}

/// Log sink shared between a test and its subscriber.
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).to_string()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn request(security: SecuritySpec, namespaces: NamespaceSet) -> ContainerRequest {
    ContainerRequest {
        security,
        namespaces,
    }
}

#[test]
fn test_root_container_with_added_capability() {
    let spec = SecuritySpec {
        cap_add: vec!["NET_ADMIN".to_string()],
        user: "root".to_string(),
        ..Default::default()
    };
    let resolved = compose(
        &request(spec, NamespaceSet::default()),
        &defaults(),
        &ContainerRegistry::new(),
    )
    .unwrap();

    let sets = resolved.capabilities();
    assert_eq!(sets.bounding(), &caps(&["CHOWN", "SETUID", "NET_ADMIN"]));
    assert_eq!(sets.effective(), sets.bounding());
    assert_eq!(sets.permitted(), sets.bounding());
    assert!(sets.inheritable().is_empty());
    assert!(sets.ambient().is_empty());

    let confinement = resolved.confinement();
    assert!(confinement.selinux_opts().is_empty());
    assert_eq!(confinement.apparmor_profile(), Some("bastion-default"));
    assert!(confinement.seccomp().is_active());
    assert_eq!(resolved.sysctls().len(), 3);
}

#[test]
fn test_kernel_without_requested_capability() {
    let kernel = caps(&["CHOWN", "SETUID"]);
    let defaults = RuntimeDefaults::new(kernel.clone()).with_default_capabilities(kernel.clone());
    let spec = SecuritySpec {
        cap_add: vec!["NET_ADMIN".to_string()],
        ..Default::default()
    };
    let resolved = compose(
        &request(spec, NamespaceSet::default()),
        &defaults,
        &ContainerRegistry::new(),
    )
    .unwrap();
    assert_eq!(resolved.capabilities().bounding(), &kernel);
}

#[test]
fn test_privileged_container() {
    let spec = SecuritySpec {
        privileged: true,
        cap_drop: vec!["ALL".to_string()],
        ..Default::default()
    };
    let resolved = compose(
        &request(spec, NamespaceSet::default()),
        &defaults(),
        &ContainerRegistry::new(),
    )
    .unwrap();

    assert_eq!(resolved.capabilities().bounding(), &CapabilitySet::all());
    assert_eq!(resolved.confinement().selinux_opts(), ["disable"]);
    assert_eq!(resolved.confinement().apparmor_profile(), None);
    assert!(!resolved.confinement().seccomp().is_active());
}

#[test]
fn test_join_label_resolved_at_composition_time() {
    let registry = ContainerRegistry::new();
    registry.insert_container("x", "system_u:system_r:container_t:s0:c1,c2");

    let namespaces = NamespaceSet {
        pid: NamespaceMode::FromContainer("x".to_string()),
        ..Default::default()
    };
    let req = request(SecuritySpec::default(), namespaces);

    // Label rotates after X was created
    registry.insert_container("x", "system_u:system_r:container_t:s0:c7,c9");
    let resolved = compose(&req, &defaults(), &registry).unwrap();
    assert_eq!(
        resolved.confinement().selinux_opts(),
        [
            "user:system_u",
            "role:system_r",
            "type:container_t",
            "level:s0:c7,c9"
        ]
    );

    registry.remove_container("x");
    let err = compose(&req, &defaults(), &registry).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.to_string(), "container \"x\" not found");
}

#[test]
fn test_pod_join_requires_live_pod() {
    let registry = ContainerRegistry::new();
    let namespaces = NamespaceSet {
        pid: NamespaceMode::FromPod("infra".to_string()),
        ipc: NamespaceMode::FromPod("infra".to_string()),
        ..Default::default()
    };
    let req = request(SecuritySpec::default(), namespaces);

    let err = compose(&req, &defaults(), &registry).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.to_string(), "pod \"infra\" not found");

    registry.insert_pod("infra", "system_u:system_r:container_t:s0:c1,c2");
    let resolved = compose(&req, &defaults(), &registry).unwrap();
    assert!(resolved.confinement().selinux_opts().is_empty());
}

#[test]
fn test_host_and_joined_label_contributions_accumulate() {
    let registry = ContainerRegistry::new();
    registry.insert_container("x", "u:r:t:s0");
    let namespaces = NamespaceSet {
        pid: NamespaceMode::Host,
        ipc: NamespaceMode::FromContainer("x".to_string()),
        ..Default::default()
    };
    let spec = SecuritySpec {
        selinux_opts: vec!["type:spc_t".to_string()],
        ..Default::default()
    };
    let resolved = compose(&request(spec, namespaces), &defaults(), &registry).unwrap();
    assert_eq!(
        resolved.confinement().selinux_opts(),
        ["type:spc_t", "disable", "user:u", "role:r", "type:t", "level:s0"]
    );
}

#[test]
fn test_sysctl_gating_per_namespace() {
    let cases = [
        (NamespaceKind::Ipc, "fs.mqueue.msg_max", "fs.mqueue.msgsize_max"),
        (NamespaceKind::Network, "net.ipv4.ping_group_range", "net.ipv4.ip_forward"),
        (NamespaceKind::Uts, "kernel.domainname", "kernel.hostname"),
    ];

    for (kind, default_key, user_key) in cases {
        let mut namespaces = NamespaceSet::default();
        *namespaces.mode_mut(kind) = NamespaceMode::Host;

        // Defaults in a host namespace are dropped silently
        let resolved = compose(
            &request(SecuritySpec::default(), namespaces.clone()),
            &defaults(),
            &ContainerRegistry::new(),
        )
        .unwrap();
        assert!(!resolved.sysctls().contains_key(default_key));
        assert_eq!(resolved.sysctls().len(), 2);

        // Explicit requests are rejected
        let spec = SecuritySpec {
            sysctls: BTreeMap::from([(user_key.to_string(), "1".to_string())]),
            ..Default::default()
        };
        let err = compose(&request(spec, namespaces), &defaults(), &ContainerRegistry::new())
            .unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(err.to_string().contains(user_key));
        assert!(err.to_string().contains(&kind.to_string()));
    }
}

#[test]
fn test_user_sysctl_overrides_default() {
    let spec = SecuritySpec {
        sysctls: BTreeMap::from([(
            "net.ipv4.ping_group_range".to_string(),
            "1000 2000".to_string(),
        )]),
        ..Default::default()
    };
    let resolved = compose(
        &request(spec, NamespaceSet::default()),
        &defaults(),
        &ContainerRegistry::new(),
    )
    .unwrap();
    assert_eq!(resolved.sysctls()["net.ipv4.ping_group_range"], "1000 2000");
}

#[test]
fn test_unsatisfiable_image_requirement_is_advisory() {
    let spec = SecuritySpec {
        image_labels: BTreeMap::from([(
            "io.containers.capabilities".to_string(),
            "CHOWN,SYS_ADMIN".to_string(),
        )]),
        ..Default::default()
    };
    let buf = SharedBuf::default();
    let writer = buf.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();

    let resolved = tracing::subscriber::with_default(subscriber, || {
        compose(
            &request(spec, NamespaceSet::default()),
            &defaults(),
            &ContainerRegistry::new(),
        )
    })
    .unwrap();
    assert_eq!(resolved.capabilities().bounding(), &caps(&["CHOWN", "SETUID"]));

    let logs = buf.contents();
    assert!(logs.contains("ERROR"), "{logs}");
    assert!(logs.contains("missing=CAP_SYS_ADMIN"), "{logs}");
}

#[test]
fn test_image_requirement_narrows_bounding() {
    let spec = SecuritySpec {
        image_labels: BTreeMap::from([(
            "io.containers.capabilities".to_string(),
            "setuid".to_string(),
        )]),
        ..Default::default()
    };
    let resolved = compose(
        &request(spec, NamespaceSet::default()),
        &defaults(),
        &ContainerRegistry::new(),
    )
    .unwrap();
    assert_eq!(resolved.capabilities().bounding(), &caps(&["SETUID"]));
}

#[test]
fn test_non_root_keep_id_gets_ambient() {
    let defaults = defaults().with_ambient(true);
    let spec = SecuritySpec {
        cap_add: vec!["NET_BIND_SERVICE".to_string()],
        user: "1000:1000".to_string(),
        ..Default::default()
    };
    let namespaces = NamespaceSet {
        user: bastion::namespace::UserNamespaceMode::KeepId,
        ..Default::default()
    };
    let resolved =
        compose(&request(spec, namespaces), &defaults, &ContainerRegistry::new()).unwrap();

    let sets = resolved.capabilities();
    let expected = caps(&["NET_BIND_SERVICE"]);
    assert_eq!(sets.effective(), &expected);
    assert_eq!(sets.ambient(), &expected);
    assert_eq!(sets.inheritable(), &expected);
    assert_eq!(sets.bounding(), &caps(&["CHOWN", "SETUID", "NET_BIND_SERVICE"]));
}

#[test]
fn test_apparmor_disabled_rejects_explicit_profile() {
    let defaults = defaults().with_apparmor(false);
    let spec = SecuritySpec {
        apparmor_profile: "custom".to_string(),
        ..Default::default()
    };
    let err = compose(
        &request(spec, NamespaceSet::default()),
        &defaults,
        &ContainerRegistry::new(),
    )
    .unwrap_err();
    assert!(matches!(err, BastionError::UnsupportedProfile { .. }));
}

#[test]
fn test_output_serializes_every_capability_set() {
    let resolved =
        compose(&ContainerRequest::default(), &defaults(), &ContainerRegistry::new()).unwrap();
    let json = serde_json::to_value(&resolved).unwrap();
    for set in ["bounding", "effective", "permitted", "inheritable", "ambient"] {
        assert!(json["capabilities"][set].is_array(), "{set}");
    }
    assert_eq!(json["capabilities"]["bounding"][0], "CAP_CHOWN");
    assert_eq!(json["confinement"]["apparmor_profile"], "bastion-default");
}

#[test]
fn test_defaults_loaded_from_conf_file() {
    let dir = tempfile::tempdir().unwrap();
    let conf = dir.path().join("security.toml");
    std::fs::write(
        &conf,
        r#"
[containers]
default_capabilities = ["CHOWN", "NET_RAW"]
default_sysctls = ["net.core.somaxconn=1024"]
label = true
"#,
    )
    .unwrap();

    let paths = ConfPaths::with_root(dir.path()).with_explicit(&conf);
    let host = StaticHost::new(CapabilitySet::all()).with_selinux();
    let defaults = RuntimeDefaults::load(&paths, &host).unwrap();
    assert!(defaults.labeling_enabled);

    let resolved =
        compose(&ContainerRequest::default(), &defaults, &ContainerRegistry::new()).unwrap();
    assert_eq!(resolved.capabilities().bounding(), &caps(&["CHOWN", "NET_RAW"]));
    assert_eq!(resolved.sysctls()["net.core.somaxconn"], "1024");

    let parsed = SecurityConf::load(&paths).unwrap();
    assert_eq!(parsed.containers.default_sysctls.len(), 1);
}

use std::path::Path;
use std::sync::Arc;
use tandem_cgroup::*;
use tandem_core::*;

/// Check if running as root
fn is_root() -> bool {
    nix::unistd::Uid::effective().is_root()
}

#[tokio::test]
async fn test_provider_dispatch_by_parent_segment() {
    let root = tempfile::tempdir().unwrap();
    let provider = HierarchyProvider::new(root.path());

    let plain = CgroupPath::new("integration/test2").unwrap();
    let slice = CgroupPath::new("machine.slice/web").unwrap();

    let plain_driver = provider.driver(DriverKind::select(&plain), &plain);
    let slice_driver = provider.driver(DriverKind::select(&slice), &slice);

    assert_eq!(plain_driver.kind(), DriverKind::Cgroupfs);
    assert_eq!(slice_driver.kind(), DriverKind::Systemd);

    plain_driver.apply(ProcessId::from_raw(10)).await.unwrap();
    slice_driver.apply(ProcessId::from_raw(20)).await.unwrap();

    assert!(root.path().join("integration/test2/cgroup.procs").exists());
    assert!(root
        .path()
        .join("machine.slice/tandem-web.scope/cgroup.procs")
        .exists());
}

#[tokio::test]
async fn test_drivers_never_share_a_group() {
    let provider = HierarchyProvider::new("/cg");
    let a = CgroupPath::new("integration/a").unwrap();
    let b = CgroupPath::new("integration/b").unwrap();

    let driver_a = provider.driver(DriverKind::select(&a), &a);
    let driver_b = provider.driver(DriverKind::select(&b), &b);

    assert_ne!(driver_a.path(), driver_b.path());
}

#[tokio::test]
async fn test_mock_provider_behind_trait_object() {
    let mock = MockProvider::new();
    let provider: Arc<dyn DriverProvider> = Arc::new(mock.clone());

    let path = CgroupPath::new("integration/mock").unwrap();
    let driver = provider.driver(DriverKind::select(&path), &path);

    assert_eq!(driver.path(), Path::new("/mock/integration/mock"));

    let pid = ProcessId::from_raw(4242);
    driver.apply(pid).await.unwrap();
    assert!(mock.has_process(pid));

    driver.destroy().await.unwrap();
    assert!(!mock.has_process(pid));
    assert_eq!(mock.created().len(), 1);
}

#[tokio::test]
async fn test_invalid_paths_rejected() {
    for raw in ["", "/abs/path", "a/./b", "../escape"] {
        let err = CgroupPath::new(raw).unwrap_err();
        assert!(matches!(err, Error::ConfigInvalid { .. }), "{raw}: {err}");
    }
}

#[tokio::test]
#[ignore] // Requires root
async fn test_real_hierarchy_placement() {
    if !is_root() {
        eprintln!("Skipping test: requires root");
        return;
    }

    let provider = HierarchyProvider::default();
    let path = CgroupPath::new("tandem-test/placement").unwrap();
    let driver = provider.driver(DriverKind::select(&path), &path);

    let mut child = std::process::Command::new("sleep").arg("10").spawn().unwrap();
    let pid = ProcessId::from_raw(i32::try_from(child.id()).unwrap());

    driver.apply(pid).await.unwrap();
    let procs = std::fs::read_to_string(driver.path().join("cgroup.procs")).unwrap();
    assert!(procs.lines().any(|line| line == pid.to_string()));

    child.kill().unwrap();
    child.wait().unwrap();
    driver.destroy().await.unwrap();
    assert!(!driver.path().exists());
    let _ = std::fs::remove_dir(Path::new(CGROUP_ROOT).join("tandem-test"));
}

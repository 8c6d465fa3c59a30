//! End-to-end bootstrap tests against the in-memory collaborators.
//!
//! The supervised agent binary is replaced by small unix commands, so the
//! full sequence (detect, network, route, CNI render, supervision) runs in
//! one process without a Windows host.

mod common;

use std::time::Duration;

use calinit::{bootstrap, Error, NetworkBackend, NodeConfig, EC2_METADATA_URL};
use common::{MemoryNetworkStore, MemoryRouteTable, StaticProbe};

fn config(log_dir: &tempfile::TempDir, conf_dir: &tempfile::TempDir) -> NodeConfig {
    let mut cfg = NodeConfig::load();
    cfg.hostname = "node-1".to_string();
    cfg.backend = NetworkBackend::Overlay;
    cfg.startup_timeout = Duration::from_secs(30);
    cfg.log_dir = log_dir.path().to_string_lossy().to_string();
    cfg.cni.conf_dir = conf_dir.path().to_string_lossy().to_string();
    cfg.agent_binary = "true".to_string();
    cfg
}

#[cfg(unix)]
#[tokio::test]
async fn test_full_bootstrap_on_bare_metal() {
    let log_dir = tempfile::tempdir().unwrap();
    let conf_dir = tempfile::tempdir().unwrap();
    let cfg = config(&log_dir, &conf_dir);

    let store = MemoryNetworkStore::new();
    let probe = StaticProbe::unreachable();
    let routes = MemoryRouteTable::resolving_to(MemoryRouteTable::default_route());

    bootstrap::run(&cfg, &store, &probe, &routes).await.unwrap();

    assert!(store.network_names().contains(&"External".to_string()));
    // Bare metal has no metadata service, so no route is patched.
    assert!(routes.installed().is_empty());
    assert!(conf_dir.path().join(&cfg.cni.conf_file_name).exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_ec2_bootstrap_patches_metadata_route() {
    let log_dir = tempfile::tempdir().unwrap();
    let conf_dir = tempfile::tempdir().unwrap();
    let cfg = config(&log_dir, &conf_dir);

    let store = MemoryNetworkStore::new();
    let probe = StaticProbe::reachable_at(&[EC2_METADATA_URL]);
    let routes = MemoryRouteTable::resolving_to(MemoryRouteTable::default_route());

    bootstrap::run(&cfg, &store, &probe, &routes).await.unwrap();

    assert_eq!(routes.installed().len(), 1);
}

#[tokio::test]
async fn test_invalid_config_fails_before_side_effects() {
    let log_dir = tempfile::tempdir().unwrap();
    let conf_dir = tempfile::tempdir().unwrap();
    let mut cfg = config(&log_dir, &conf_dir);
    cfg.startup_timeout = Duration::ZERO;

    let store = MemoryNetworkStore::new();
    let probe = StaticProbe::unreachable();
    let routes = MemoryRouteTable::resolving_to(MemoryRouteTable::default_route());

    let err = bootstrap::run(&cfg, &store, &probe, &routes)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConfigInvalid { .. }));
    assert!(store.network_names().is_empty());
}

#[tokio::test]
async fn test_unlaunchable_agent_is_fatal() {
    let log_dir = tempfile::tempdir().unwrap();
    let conf_dir = tempfile::tempdir().unwrap();
    let mut cfg = config(&log_dir, &conf_dir);
    cfg.agent_binary = "/nonexistent/agent-binary".to_string();

    let store = MemoryNetworkStore::new();
    let probe = StaticProbe::unreachable();
    let routes = MemoryRouteTable::resolving_to(MemoryRouteTable::default_route());

    let err = bootstrap::run(&cfg, &store, &probe, &routes)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::LaunchFailed { .. }));
}

#[cfg(unix)]
#[tokio::test]
async fn test_route_failure_stops_bootstrap_on_cloud() {
    let log_dir = tempfile::tempdir().unwrap();
    let conf_dir = tempfile::tempdir().unwrap();
    let cfg = config(&log_dir, &conf_dir);

    let store = MemoryNetworkStore::new();
    let probe = StaticProbe::reachable_at(&[EC2_METADATA_URL]);
    let routes = MemoryRouteTable::failing();

    let err = bootstrap::run(&cfg, &store, &probe, &routes)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RouteResolutionFailed(_)));
    // Agents must not have been launched; the CNI config is rendered after
    // routing, so its absence is the observable signal.
    assert!(!conf_dir.path().join(&cfg.cni.conf_file_name).exists());
}

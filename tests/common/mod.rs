//! Shared in-memory fakes for the integration tests.
//!
//! Every host side effect the orchestrator performs goes through one of
//! the capability traits, so the fakes here are enough to run the full
//! bootstrap control flow without a Windows host.

// Not every test file uses every fake helper.
#![allow(dead_code)]

use std::sync::Mutex;

use async_trait::async_trait;

use calinit::hns::name_matches;
use calinit::{Error, HostNetwork, NetworkStore, Result};
use calinit::{MetadataProbe, ResolvedRoute, RouteTable};

/// Management IP the fake host assigns to created networks.
pub const FAKE_MANAGEMENT_IP: &str = "10.0.0.4";

// =============================================================================
// MemoryNetworkStore
// =============================================================================

/// In-memory [`NetworkStore`] with scriptable failures.
#[derive(Default)]
pub struct MemoryNetworkStore {
    networks: Mutex<Vec<HostNetwork>>,
    deleted: Mutex<Vec<String>>,
    fail_delete_of: Mutex<Vec<String>>,
    create_failures: Mutex<u32>,
    management_ip_delay: Mutex<u32>,
}

impl MemoryNetworkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store with pre-existing networks.
    pub fn with_networks(networks: Vec<HostNetwork>) -> Self {
        Self {
            networks: Mutex::new(networks),
            ..Self::default()
        }
    }

    /// Makes the next `n` create calls fail.
    pub fn fail_next_creates(&self, n: u32) {
        *self.create_failures.lock().unwrap() = n;
    }

    /// Makes deletion of the named network fail.
    pub fn fail_delete_of(&self, name: &str) {
        self.fail_delete_of.lock().unwrap().push(name.to_string());
    }

    /// Withholds the management IP for the next `n` lookups of a created
    /// network.
    pub fn delay_management_ip(&self, n: u32) {
        *self.management_ip_delay.lock().unwrap() = n;
    }

    pub fn network_names(&self) -> Vec<String> {
        self.networks
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.name.clone())
            .collect()
    }

    pub fn deleted_names(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl NetworkStore for MemoryNetworkStore {
    async fn list_networks(&self) -> Result<Vec<HostNetwork>> {
        Ok(self.networks.lock().unwrap().clone())
    }

    async fn get_network(&self, name: &str) -> Result<Option<HostNetwork>> {
        let mut networks = self.networks.lock().unwrap();
        let found = networks.iter_mut().find(|n| name_matches(name, &n.name));
        let Some(network) = found else {
            return Ok(None);
        };

        if network.management_ip.is_none() {
            let mut delay = self.management_ip_delay.lock().unwrap();
            if *delay == 0 {
                network.management_ip = Some(FAKE_MANAGEMENT_IP.to_string());
            } else {
                *delay -= 1;
            }
        }
        Ok(Some(network.clone()))
    }

    async fn create_network(&self, network: &HostNetwork) -> Result<HostNetwork> {
        {
            let mut failures = self.create_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(Error::NetworkCreateFailed {
                    network: network.name.clone(),
                    reason: "injected create failure".to_string(),
                });
            }
        }
        self.networks.lock().unwrap().push(network.clone());
        Ok(network.clone())
    }

    async fn delete_network(&self, name: &str) -> Result<()> {
        if self
            .fail_delete_of
            .lock()
            .unwrap()
            .iter()
            .any(|n| n == name)
        {
            return Err(Error::CleanupFailed {
                network: name.to_string(),
                reason: "injected delete failure".to_string(),
            });
        }
        self.networks.lock().unwrap().retain(|n| n.name != name);
        self.deleted.lock().unwrap().push(name.to_string());
        Ok(())
    }
}

// =============================================================================
// StaticProbe
// =============================================================================

/// Metadata probe answering from a fixed set of reachable URLs.
#[derive(Default)]
pub struct StaticProbe {
    reachable: Vec<String>,
    calls: Mutex<Vec<(String, Option<(String, String)>)>>,
}

impl StaticProbe {
    /// Probe where nothing answers.
    pub fn unreachable() -> Self {
        Self::default()
    }

    pub fn reachable_at(urls: &[&str]) -> Self {
        Self {
            reachable: urls.iter().map(|u| u.to_string()).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// URLs probed, in order, with the header each probe carried.
    pub fn calls(&self) -> Vec<(String, Option<(String, String)>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetadataProbe for StaticProbe {
    async fn reachable(&self, url: &str, header: Option<(&str, &str)>) -> bool {
        self.calls.lock().unwrap().push((
            url.to_string(),
            header.map(|(k, v)| (k.to_string(), v.to_string())),
        ));
        self.reachable.iter().any(|u| u == url)
    }
}

// =============================================================================
// MemoryRouteTable
// =============================================================================

/// In-memory [`RouteTable`] recording installed routes.
pub struct MemoryRouteTable {
    resolve_result: Option<ResolvedRoute>,
    installed: Mutex<Vec<(String, ResolvedRoute)>>,
}

impl MemoryRouteTable {
    /// Table that resolves every destination through one fixed route.
    pub fn resolving_to(route: ResolvedRoute) -> Self {
        Self {
            resolve_result: Some(route),
            installed: Mutex::new(Vec::new()),
        }
    }

    /// Table whose resolution always fails.
    pub fn failing() -> Self {
        Self {
            resolve_result: None,
            installed: Mutex::new(Vec::new()),
        }
    }

    pub fn default_route() -> ResolvedRoute {
        ResolvedRoute {
            interface_index: 7,
            next_hop: "10.0.0.1".to_string(),
            preferred_source: FAKE_MANAGEMENT_IP.to_string(),
        }
    }

    pub fn installed(&self) -> Vec<(String, ResolvedRoute)> {
        self.installed.lock().unwrap().clone()
    }
}

#[async_trait]
impl RouteTable for MemoryRouteTable {
    async fn resolve_outbound(&self, _destination: &str) -> Result<ResolvedRoute> {
        self.resolve_result
            .clone()
            .ok_or_else(|| Error::RouteResolutionFailed("injected resolve failure".to_string()))
    }

    async fn add_host_route(&self, destination: &str, route: &ResolvedRoute) -> Result<()> {
        self.installed
            .lock()
            .unwrap()
            .push((destination.to_string(), route.clone()));
        Ok(())
    }
}

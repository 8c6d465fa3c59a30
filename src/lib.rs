//! # calinit
//!
//! **Windows Cluster-Node Network Bootstrap Orchestrator**
//!
//! This crate prepares a Windows worker node's host networking for a
//! Calico-based pod network and then supervises the node's two networking
//! agents. It is the one-shot glue between the node joining a cluster and
//! the CNI plugin being able to wire pods: everything here runs before the
//! first pod, exactly once per node (re)start.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                             calinit                                │
//! ├────────────────────────────────────────────────────────────────────┤
//! │  bootstrap::run                                                    │
//! │    validate → deadline → detect → network → route → cni → agents   │
//! ├────────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────┐ ┌──────────────────┐ ┌────────────────────┐  │
//! │  │ PlatformDetector │ │ NetworkLifecycle │ │  RouteConfigurator │  │
//! │  │ Aks/Eks/Ec2/Gce/ │ │ sweep + create + │ │  metadata /32 via  │  │
//! │  │ BareMetal        │ │ mgmt-IP wait     │ │  resolved egress   │  │
//! │  └────────┬─────────┘ └────────┬─────────┘ └─────────┬──────────┘  │
//! │           │                    │                     │             │
//! │  ┌────────┴────────────────────┴─────────────────────┴──────────┐  │
//! │  │            Capability traits (host side effects)             │  │
//! │  │     NetworkStore      MetadataProbe        RouteTable        │  │
//! │  │   (HNS / in-mem)    (reqwest / static)  (route.exe / in-mem) │  │
//! │  └──────────────────────────────────────────────────────────────┘  │
//! ├────────────────────────────────────────────────────────────────────┤
//! │  ProcessSupervisor: node-agent (-startup) ∥ policy-agent (-felix)  │
//! │  shared deadline, kill + 500ms grace, no restarts                  │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Deadline Model
//!
//! One deadline, computed from `startup_timeout` at the top of
//! [`bootstrap::run`], bounds every retry loop and both supervised
//! processes. No component carries its own retry counter; a loop either
//! succeeds or surfaces [`Error::DeadlineExceeded`].
//!
//! # Testability
//!
//! All host side effects (HNS queries, metadata HTTP probes, the route
//! table) sit behind narrow async traits, so the full bootstrap sequence
//! runs against in-memory fakes in the integration tests. The production
//! implementations shell out through PowerShell the same way the agents'
//! own tooling does.
//!
//! # Example
//!
//! ```rust,ignore
//! use calinit::{bootstrap, HnsStore, HttpProbe, NetshRouteTable, NodeConfig};
//!
//! #[tokio::main]
//! async fn main() -> calinit::Result<()> {
//!     let cfg = NodeConfig::load();
//!     let store = HnsStore::new();
//!     bootstrap::run(&cfg, &store, &HttpProbe::new(), &NetshRouteTable).await
//! }
//! ```

pub mod bootstrap;
pub mod cni;
pub mod config;
pub mod constants;
pub mod error;
pub mod firewall;
pub mod hns;
pub mod network;
pub mod platform;
pub mod route;
pub mod supervisor;

// Re-exports
pub use config::{CniSettings, FelixSettings, NetworkBackend, NodeConfig};
pub use constants::*;
pub use error::{Error, Result};
pub use hns::{HnsStore, HostNetwork, NetworkKind, NetworkStore};
pub use network::NetworkLifecycleManager;
pub use platform::{HttpProbe, MetadataProbe, PlatformKind};
pub use route::{NetshRouteTable, ResolvedRoute, RouteTable};
pub use supervisor::{ProcessReport, ProcessRole, ProcessStatus, ProcessSupervisor};

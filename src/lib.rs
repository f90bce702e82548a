//! Simlab: Simulation Orchestration & Communication-Graph Engine
//!
//! Provisions per-tenant simulated agent workloads on a cluster backend,
//! persists each tenant's communication graph, and drives randomized
//! kick traversals with directive dispatch to the live agents.

pub mod cluster;
pub mod concurrency;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod graph;
pub mod logging;
pub mod orchestrator;
pub mod provision;
pub mod store;
pub mod teardown;
pub mod topology;

//! # Hyphae - Multi-Tenant Agent Knowledge Substrate
//!
//! Hyphae is a bio-inspired substrate that lets many independent agents
//! within a tenant share knowledge without a central blackboard: broadcasts
//! ("nutrients") propagate along an adaptive routing graph whose edge
//! weights strengthen or decay from the outcomes of the decisions they
//! informed, while a separate Hyphal Memory store holds durable, retrievable
//! knowledge ranked by semantic similarity and diversified by MMR.
//!
//! ## Architecture
//!
//! The crate follows a functional-core/imperative-shell split throughout:
//! `domain` and `domain_types` hold pure scoring, decay, and validation
//! logic with no I/O; `storage` wraps that core in SQLite persistence;
//! `router_service`, `hyphal_service`, and `reinforcement_service` compose
//! the two into the operations the REST surface in `rest_api` exposes.
//! `scheduler` drives the background decay/TTL-sweep tick through the same
//! [`time_provider::TimeProvider`] abstraction used in tests. `runtime`
//! bundles the pools, storage shells, and scheduler handle into one
//! process-wide value passed into every request handler, rather than
//! relying on global state.

pub mod domain;
pub mod domain_types;
pub mod error;

pub mod auth;
pub mod cache;
pub mod config;
pub mod database;
pub mod security;
pub mod storage;
pub mod time_provider;

pub mod hyphal_service;
pub mod reinforcement_service;
pub mod router_service;
pub mod scheduler;

pub mod observability;
pub mod rest_api;
pub mod runtime;
pub mod server;

pub use error::{CoreError, CoreResult};
pub use runtime::CoreRuntime;

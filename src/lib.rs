//! HTTP load-balancing dispatcher.
//!
//! Keeps an ordered pool of backends, probes their health on an interval,
//! and relays each inbound request to one live backend chosen by a
//! configurable policy.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request     ┌──────────────────────────────────────────────┐
//!     ───────────────────┼─▶ http::server ──▶ http::dispatcher          │
//!                        │                        │                      │
//!                        │                        ▼                      │
//!                        │               load_balancer::pool             │
//!                        │              (policy + unhealthy set)         │
//!                        │                        │                      │
//!                        │                        ▼                      │
//!     Client Response    │              load_balancer::backend ─────────┼──▶ Backend
//!     ◀──────────────────┼──────────────── (forward, probe)             │
//!                        │                        ▲                      │
//!                        │               health::active (interval)       │
//!                        │                                               │
//!                        │   config · error · lifecycle · observability  │
//!                        └──────────────────────────────────────────────┘
//! ```

// Core subsystems
pub mod config;
pub mod error;
pub mod http;

// Traffic management
pub mod health;
pub mod load_balancer;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::schema::ProxyConfig;
pub use http::{Dispatcher, HttpServer};
pub use lifecycle::Shutdown;
pub use load_balancer::{backend::Backend, pool::Pool, PolicyKind, SelectionPolicy};

//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, ConnectInfo, tracing layer)
//!     → dispatcher.rs (stopped check, Pool::pick_healthy)
//!     → InFlight::forward (slot held until the body is done)
//!         → forward.rs (X-Forwarded-For / X-Forwarded-Port)
//!         → client.rs (pooled hyper client)
//!     → response streamed back verbatim, or an error status
//! ```

pub mod client;
pub mod dispatcher;
pub mod forward;
pub mod server;

pub use dispatcher::Dispatcher;
pub use server::HttpServer;

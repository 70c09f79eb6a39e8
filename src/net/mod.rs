//! Network-facing layers: wire schema, REST collaborator, sockets and routing.
//!
//! ARCHITECTURE
//! ============
//! `connection` owns socket lifecycles and knows nothing about message
//! meaning. `router` decodes frames into typed events and owns the
//! reconnect decision. `api` talks to the REST collaborator.

pub mod api;
pub mod backoff;
pub mod connection;
pub mod router;
pub mod types;

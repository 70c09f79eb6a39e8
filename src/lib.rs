//! Stage/session real-time synchronization core for the operations console.
//!
//! SYSTEM CONTEXT
//! ==============
//! Administrators watch a fleet of stages, each running at most one live
//! listening session. This crate keeps a local projection of every stage
//! correct while push events arrive over an unreliable WebSocket and
//! operators fire start/pause/end commands against selections of stages.
//!
//! LAYOUT
//! ======
//! - `net`: wire schema, REST collaborator, socket lifecycle, event routing
//!   and the reconnect policy.
//! - `state`: the stage entity store, selection/filter store and live
//!   transcript buffer.
//! - `util`: pure helpers (bulk-action validation, per-stage control table,
//!   search/location filtering, debounce).
//! - `console`: composes the stores into one read model.
//! - `runtime`: the single-owner event loop that drives everything.

pub mod config;
pub mod console;
pub mod error;
pub mod net;
pub mod runtime;
pub mod state;
pub mod util;

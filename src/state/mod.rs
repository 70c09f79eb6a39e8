//! Console state stores.
//!
//! DESIGN
//! ======
//! State is split by concern (`stages`, `selection`, `transcript`) so each
//! store can be tested on its own. Stores are plain owned values; the
//! runtime owns all of them and mutates them from a single task.

pub mod selection;
pub mod stages;
pub mod transcript;

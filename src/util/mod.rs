//! Pure helpers shared by the stores and the view model.
//!
//! SYSTEM CONTEXT
//! ==============
//! Nothing here owns state or performs I/O, which keeps the validation and
//! filtering rules testable without a runtime.

pub mod bulk_actions;
pub mod debounce;
pub mod stage_controls;
pub mod stage_filter;

//! Application-level orchestration.
//!
//! The state machine decides what happens next; the controller runs the
//! resulting effects as tasks and feeds their completions back in. The TUI
//! only ever sees [`Snapshot`]s.

mod controller;
pub mod log;
mod machine;

pub(crate) use controller::run_controller;
pub use log::init_local_offset;
pub use machine::{Machine, MenuItem, Phase, Snapshot, MENU_ITEMS};

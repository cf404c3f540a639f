//! Controller layer: UI events, console input parsing, and command orchestration.

pub mod events;
pub mod input;
pub mod orchestration;

//! Resource operations orchestrated over the query engine, cache, audit trail and store.

mod controller;

pub use controller::{ControllerServices, ResourceController};

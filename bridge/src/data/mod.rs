//! Data trees and the transforms between them

mod grid;
mod reconciler;
mod variables;

pub use grid::{unwrap, wrap, wrapping_child};
pub use reconciler::reconcile;
pub use variables::{Variable, VariableSet, WireDocument};

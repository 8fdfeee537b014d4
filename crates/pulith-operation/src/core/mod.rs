//! Pure transformations used by the operation driver.
//!
//! Nothing in this module performs I/O or touches an executor.

mod accumulator;
mod progress;
mod state;
mod validation;

pub use accumulator::BodyAccumulator;
pub use progress::ProgressGate;
pub use state::{transition, AtomicState, OperationState, Transition};
pub use validation::{validate, ValidationReport};

//! # System Module
//!
//! Stage order, per-run pipeline configuration, and the contracts the
//! driver expects from external stage processors.

mod processor;
mod stage;

pub use processor::*;
pub use stage::*;

//! Runtime components for service activation and teardown

pub mod layer;
pub mod plan;
pub mod verify;

pub use layer::*;
pub use plan::{ActivationPlan, PlanStep};
pub use verify::*;

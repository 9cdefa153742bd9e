//! Matrix planning and preflight classification.

pub mod planner;
pub mod preflight;

pub use planner::{
    parse_constraint_document, ConstraintOrigin, MatrixPlan, MatrixPlanner, PlanRequest,
    TargetGroup,
};
pub use preflight::{classify, local_wheels, Classification, IndexLookup, Preflight};

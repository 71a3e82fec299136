//! Workflow engine core: definition parsing, dependency resolution,
//! interpolation, and sequential execution.
//!
//! - `definition` -- document parsing, validation, file loading
//! - `dag` -- topological ordering and execution levels
//! - `interpolate` -- `${...}` template resolution
//! - `retry` -- in-process step retry policy
//! - `executor` -- per-step state machine driver

pub mod dag;
pub mod definition;
pub mod executor;
pub mod interpolate;
pub mod retry;

pub use dag::DependencyResolver;
pub use definition::{parse_workflow, WorkflowError};
pub use executor::{ExecutorError, WorkflowExecutor};
pub use interpolate::{InterpolationContext, InterpolationError, VariableInterpolator};

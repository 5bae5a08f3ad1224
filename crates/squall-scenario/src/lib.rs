//! Scenario document model for the squall chaos orchestrator.
//!
//! A scenario arrives as YAML, is parsed and template-expanded upstream, and
//! reaches this crate as a typed, immutable document: phases of timed chaos
//! actions plus the assertions that judge them. `validate` runs the structural
//! rules the execution engine relies on.

pub mod diagnostics;
pub mod errors;
pub mod model;
pub mod validate;
pub mod value;

pub use diagnostics::*;
pub use errors::*;
pub use model::*;
pub use validate::*;
pub use value::*;

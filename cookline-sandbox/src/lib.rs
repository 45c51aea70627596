//! Resource-bounded evaluator for author-written balance formulas.
//!
//! Formulas are a small JavaScript-shaped language run by an in-process
//! tree-walking interpreter. Each evaluation:
//!
//! 1. passes static checks ([`policy::check_source`]) or is rejected unrun,
//! 2. runs in a fresh [`FormulaSandbox`] with fuel, memory and deadline caps,
//! 3. has one value selected by its output path ([`extract_output`]),
//! 4. is checked against the link's declared [`cookline_model::DerivedType`].
//!
//! [`FormulaExecutor`] drives all four and caps how many sandboxes run at once.

mod ast;
mod builtins;
pub mod error;
pub mod executor;
mod interp;
mod lexer;
pub mod limits;
pub mod output_path;
mod parser;
pub mod policy;
pub mod sandbox;
mod value;

pub use error::{FaultKind, SandboxError, SandboxResult};
pub use executor::{FormulaExecutor, FormulaRequest};
pub use limits::{ResourceLimits, TrackingLimiter};
pub use output_path::extract_output;
pub use policy::check_source;
pub use sandbox::FormulaSandbox;

//! Groundwork Workflow Engine
//!
//! This crate is the core of Groundwork: a stateless engine that executes
//! declarative workflows bringing external resources into a desired state.
//! Each workflow is a partially-ordered set of operations bound to modules
//! implementing an idempotent check-then-set contract.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              Workflow run                    │
//! │  Setup    ── implicit deps | modules | sort  │
//! │  Validate ── typed IO check | module checks  │
//! │  Execute  ── check-then-set, in topo order   │
//! │              outputs wired to dependents     │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! There is no persisted plan and no retry loop inside a run: reconciliation
//! is achieved by running the workflow again.
//!
//! # Example
//!
//! ```ignore
//! use groundwork_engine::{RunOptions, Workflow};
//!
//! let mut workflow: Workflow = load_workflow()?;
//! let result = workflow.run(RunOptions::default()).await;
//! if !result.is_success() {
//!     eprintln!("failed in phase {}", result.phase);
//! }
//! ```

pub mod context;
pub mod error;
pub mod module;
pub mod operation;
pub mod registry;
pub mod testing;
pub mod value;
pub mod workflow;

mod graph;
mod typecheck;

pub use context::*;
pub use error::*;
pub use module::*;
pub use operation::*;
pub use registry::*;
pub use value::*;
pub use workflow::*;

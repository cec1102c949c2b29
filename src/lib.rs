//! testbridge: the orchestration core of an AI-assisted QA suite.
//!
//! Takes a Jira ticket (or Epic) context, drives an LLM backend through
//! a bounded generate -> validate -> review -> refine loop, and hands a
//! validated set of requirements and test cases to whatever export sink
//! sits downstream. Jira fetching, GUIs and file exports live in other
//! components; this crate only knows their three contracts: a ticket
//! context in, a completion backend to call, one canonical result out.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;

pub use application::use_cases::refinement_loop::{RefinementLoop, RefinementOutcome};
pub use domain::artifact::GenerationResult;
pub use domain::error::{AppError, Result};
pub use domain::ticket::{EpicContext, TicketContext};
pub use infrastructure::bootstrap::{build_pipeline, init_tracing, Pipeline};
pub use infrastructure::config::{load_settings, Settings};

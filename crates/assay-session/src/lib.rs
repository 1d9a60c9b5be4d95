//! assay-session — Attempt lifecycle, processing and batch simulation.
//!
//! Runs template and response processing for item attempts, binds and
//! validates candidate responses, drives test-level outcome processing
//! over an assembled test, and simulates many attempts in parallel.

pub mod binding;
pub mod config;
pub mod error;
pub mod processing;
pub mod session;
pub mod simulate;
pub mod test_session;
pub mod validation;

pub use config::{load_config, load_config_from, EngineConfig};
pub use error::{BindingError, SessionError};
pub use processing::{TemplateReport, TemplateState, MAX_TEMPLATE_RETRIES};
pub use session::{ItemSession, ItemSummary};
pub use simulate::{simulate, NoopProgress, SimulationProgress, SimulationReport};
pub use test_session::TestSession;

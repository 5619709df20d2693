// Gateway module - follows the Train Station Pattern
// Request types and the orchestrator that answers them

mod orchestrator;
mod path;
mod request;
mod warm;

pub use orchestrator::Gateway;
pub use path::LogicalPath;
pub use request::{GatewayResponse, OutputFormat, PromptAnswers, ReportRequest, Staleness};
pub use warm::WarmReport;

#[cfg(test)]
pub(crate) use orchestrator::tests as test_support;

//! Client for the Cognos REST data service (RDS)

mod escape;
mod listing;
mod prompts;
mod session;
mod traits;
mod types;

#[cfg(test)]
pub(crate) mod fake_rds;

pub use escape::{encode_component, encode_path};
pub use prompts::answers_xml;
pub use session::CognosSession;
pub use traits::{BackendConnector, CognosConnector, ReportBackend};
pub use types::{EntryKind, FolderEntry, RemoteObject, RemotePath, RetryPolicy, SessionParams};

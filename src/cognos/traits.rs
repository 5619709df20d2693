use async_trait::async_trait;
use bytes::Bytes;

use super::session::CognosSession;
use super::types::{FolderEntry, RemoteObject, SessionParams};
use crate::gateway::PromptAnswers;
use crate::utils::Result;

/// An authenticated session with the report backend
#[async_trait]
pub trait ReportBackend: Send + Sync {
    /// Walk `path` from its root to a folder or report
    async fn resolve(&self, path: &[String]) -> Result<RemoteObject>;

    /// Children of a folder, sorted by name
    async fn list_folder(&self, folder: &[String]) -> Result<Vec<FolderEntry>>;

    /// Run a report synchronously and return its CSV output
    async fn download_csv(&self, report: &[String], answers: &PromptAnswers) -> Result<Bytes>;

    /// Names of the prompts a report accepts
    async fn list_report_prompts(&self, report: &[String]) -> Result<Vec<String>>;
}

/// Opens backend sessions; swapped out in tests
#[async_trait]
pub trait BackendConnector: Send + Sync {
    async fn connect(&self, params: SessionParams) -> Result<Box<dyn ReportBackend>>;
}

/// Connects to a real Cognos server over HTTP
#[derive(Debug, Default, Clone, Copy)]
pub struct CognosConnector;

#[async_trait]
impl BackendConnector for CognosConnector {
    async fn connect(&self, params: SessionParams) -> Result<Box<dyn ReportBackend>> {
        let session = CognosSession::connect(params).await?;
        Ok(Box::new(session))
    }
}

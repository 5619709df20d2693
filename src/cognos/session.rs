use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, Client, Method, StatusCode};
use serde_json::json;
use std::fmt;
use tokio::sync::Semaphore;

use super::escape::encode_path;
use super::listing::{account_id_from_root, parse_listing, WsilEntry};
use super::prompts::{answers_xml, prompt_names};
use super::traits::ReportBackend;
use super::types::{EntryKind, FolderEntry, RemoteObject, RemotePath, RetryPolicy, SessionParams};
use crate::constants::{
    CURRENT_USER_MARKER, LOGIN_ENDPOINT, OUTPUT_ENDPOINT, PROMPTS_ENDPOINT, PUBLIC_FOLDERS,
    USER_AGENT, WSIL_ENDPOINT,
};
use crate::gateway::PromptAnswers;
use crate::utils::{GatewayError, Result};

/// Why a single attempt failed
enum AttemptFailure {
    Status(StatusCode, String),
    Transport(reqwest::Error),
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(status, body) if body.is_empty() => write!(f, "{}", status),
            Self::Status(status, body) => write!(f, "{}: {}", status, body),
            Self::Transport(err) => write!(f, "{}", err),
        }
    }
}

impl AttemptFailure {
    fn into_error(self, endpoint: &str, attempts: u64) -> GatewayError {
        match &self {
            Self::Status(StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN, _) => {
                GatewayError::RemoteRejected(format!("Cognos refused {}: {}", endpoint, self))
            }
            _ => GatewayError::RemoteUnavailable(format!(
                "Cognos request to {} failed after {} attempt(s): {}",
                endpoint, attempts, self
            )),
        }
    }
}

/// An authenticated connection to one Cognos namespace and DSN.
///
/// Holds its own cookie jar, and at most `concurrent_requests` calls are in
/// flight at once.
pub struct CognosSession {
    client: Client,
    base_url: String,
    user: String,
    password: String,
    retry: RetryPolicy,
    permits: Semaphore,
    account_id: String,
}

impl CognosSession {
    /// Sign in and look up the account id behind `~`
    pub async fn connect(params: SessionParams) -> Result<Self> {
        url::Url::parse(&params.base_url).map_err(|e| {
            GatewayError::ConfigError(format!("invalid cognos_url {:?}: {}", params.base_url, e))
        })?;

        let client = Client::builder()
            .cookie_store(true)
            .timeout(params.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| GatewayError::RemoteUnavailable(format!("failed to build HTTP client: {}", e)))?;

        let mut session = Self {
            client,
            base_url: params.base_url.trim_end_matches('/').to_string(),
            user: params.user,
            password: params.password,
            retry: params.retry,
            permits: Semaphore::new(params.concurrent_requests.max(1)),
            account_id: String::new(),
        };

        let login = json!({
            "parameters": [
                { "name": "h_CAM_action", "value": "logonAs" },
                { "name": "CAMNamespace", "value": params.namespace },
                { "name": "dsn", "value": params.dsn },
            ]
        });
        session
            .request(Method::POST, LOGIN_ENDPOINT, &[], Some(&login))
            .await?;

        let root = session.request(Method::GET, WSIL_ENDPOINT, &[], None).await?;
        session.account_id = account_id_from_root(&parse_listing(&String::from_utf8_lossy(&root))?)?;
        tracing::debug!("signed in to Cognos as {} ({})", session.user, session.account_id);

        Ok(session)
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// Send one logical request, retrying per the session's policy.
    ///
    /// The concurrency permit is held across retries and released on return.
    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(&str, &str)],
        body: Option<&serde_json::Value>,
    ) -> Result<Bytes> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| GatewayError::RemoteUnavailable("Cognos session is closed".to_string()))?;

        let url = format!("{}{}", self.base_url, endpoint);
        let mut attempts = 0u64;
        loop {
            attempts += 1;
            let failure = match self.send_once(method.clone(), &url, query, body).await {
                Ok(bytes) => return Ok(bytes),
                Err(failure) => failure,
            };

            if !self.retry.allows_another(attempts) {
                return Err(failure.into_error(endpoint, attempts));
            }
            tracing::warn!(
                "Cognos request to {} failed (attempt {}): {}; retrying in {:?}",
                endpoint,
                attempts,
                failure,
                self.retry.delay
            );
            tokio::time::sleep(self.retry.delay).await;
        }
    }

    async fn send_once(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, &str)],
        body: Option<&serde_json::Value>,
    ) -> std::result::Result<Bytes, AttemptFailure> {
        let mut request = self
            .client
            .request(method, url)
            .basic_auth(&self.user, Some(&self.password))
            .header(header::ACCEPT, "*/*");
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(AttemptFailure::Transport)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(AttemptFailure::Transport)?;
        if !status.is_success() {
            let excerpt = String::from_utf8_lossy(&bytes[..bytes.len().min(200)]).into_owned();
            return Err(AttemptFailure::Status(status, excerpt));
        }
        Ok(bytes)
    }

    async fn list_entries(&self, folder: &[String]) -> Result<Vec<WsilEntry>> {
        let endpoint = format!(
            "{}/path/{}",
            WSIL_ENDPOINT,
            encode_path(folder, &self.account_id)
        );
        let body = self.request(Method::GET, &endpoint, &[], None).await?;
        parse_listing(&String::from_utf8_lossy(&body))
    }
}

#[async_trait]
impl ReportBackend for CognosSession {
    async fn resolve(&self, path: &[String]) -> Result<RemoteObject> {
        let (root, rest) = path.split_first().ok_or_else(|| {
            GatewayError::MalformedInput("backend path has no root folder".to_string())
        })?;
        if root != CURRENT_USER_MARKER && root != PUBLIC_FOLDERS {
            return Err(GatewayError::MalformedInput(format!(
                "backend path must start at {:?} or {:?}",
                CURRENT_USER_MARKER, PUBLIC_FOLDERS
            )));
        }

        let mut current: RemotePath = vec![root.clone()];
        for (depth, name) in rest.iter().enumerate() {
            let entry = self
                .list_entries(&current)
                .await?
                .into_iter()
                .find(|entry| &entry.name == name)
                .ok_or_else(|| {
                    GatewayError::NotFound(format!("{} not found in {}", name, current.join("/")))
                })?;
            current.push(name.clone());

            if entry.kind == EntryKind::Report {
                if depth + 1 == rest.len() {
                    return Ok(RemoteObject::Report { path: current });
                }
                return Err(GatewayError::NotFound(format!(
                    "{} is a report, not a folder",
                    current.join("/")
                )));
            }
        }

        let children = self.list_folder(&current).await?;
        Ok(RemoteObject::Folder {
            path: current,
            children,
        })
    }

    async fn list_folder(&self, folder: &[String]) -> Result<Vec<FolderEntry>> {
        let mut children: Vec<FolderEntry> = self
            .list_entries(folder)
            .await?
            .into_iter()
            .map(FolderEntry::from)
            .collect();
        children.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(children)
    }

    async fn download_csv(&self, report: &[String], answers: &PromptAnswers) -> Result<Bytes> {
        let endpoint = format!(
            "{}/{}/CSV",
            OUTPUT_ENDPOINT,
            encode_path(report, &self.account_id)
        );
        let xml_data = answers_xml(answers);
        let mut query = vec![("async", "OFF")];
        if !answers.is_empty() {
            query.push(("xmlData", xml_data.as_str()));
        }

        tracing::debug!("running report {}", report.join("/"));
        self.request(Method::GET, &endpoint, &query, None).await
    }

    async fn list_report_prompts(&self, report: &[String]) -> Result<Vec<String>> {
        let endpoint = format!(
            "{}/{}",
            PROMPTS_ENDPOINT,
            encode_path(report, &self.account_id)
        );
        let body = self.request(Method::GET, &endpoint, &[], None).await?;
        prompt_names(&String::from_utf8_lossy(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cognos::fake_rds::{self, REJECTED_USER, ROSTER_CSV};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;

    fn params(base_url: &str, user: &str, retry_count: i64) -> SessionParams {
        SessionParams {
            user: user.to_string(),
            password: "pw".to_string(),
            base_url: base_url.to_string(),
            namespace: "esp".to_string(),
            dsn: "bentonvisms".to_string(),
            retry: RetryPolicy::new(Duration::from_millis(10), retry_count),
            timeout: Duration::from_secs(5),
            concurrent_requests: 1,
        }
    }

    fn path(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| p.to_string()).collect()
    }

    #[tokio::test]
    async fn test_connect_discovers_account_id() {
        let rds = fake_rds::spawn().await;
        let session = CognosSession::connect(params(&rds.base_url, "APSCN\\jdoe", 0))
            .await
            .unwrap();

        assert_eq!(session.account_id(), "CAMID(\"esp:a:jdoe\")");
        assert_eq!(rds.state.logins.load(Ordering::SeqCst), 1);
        assert_eq!(rds.state.last_user.lock().as_deref(), Some("APSCN\\jdoe"));
    }

    #[tokio::test]
    async fn test_rejected_login() {
        let rds = fake_rds::spawn().await;
        let err = CognosSession::connect(params(&rds.base_url, REJECTED_USER, 1))
            .await
            .err()
            .unwrap();

        assert!(matches!(err, GatewayError::RemoteRejected(_)));
        // first attempt plus one retry
        assert_eq!(rds.state.logins.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unreachable_backend() {
        let err = CognosSession::connect(params("http://127.0.0.1:9", "jdoe", 0))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, GatewayError::RemoteUnavailable(_)));
    }

    #[tokio::test]
    async fn test_resolve_folders_and_reports() {
        let rds = fake_rds::spawn().await;
        let session = CognosSession::connect(params(&rds.base_url, "jdoe", 0))
            .await
            .unwrap();

        let folder = session
            .resolve(&path(&["Public Folders", "Attendance"]))
            .await
            .unwrap();
        assert_eq!(
            folder,
            RemoteObject::Folder {
                path: path(&["Public Folders", "Attendance"]),
                children: vec![FolderEntry {
                    name: "Daily Totals".to_string(),
                    kind: EntryKind::Report,
                }],
            }
        );

        let report = session
            .resolve(&path(&["~", "Private Report"]))
            .await
            .unwrap();
        assert_eq!(
            report,
            RemoteObject::Report {
                path: path(&["~", "Private Report"])
            }
        );

        let missing = session.resolve(&path(&["Public Folders", "Nope"])).await;
        assert!(matches!(missing, Err(GatewayError::NotFound(_))));

        let through_report = session
            .resolve(&path(&["Public Folders", "Roster", "Deeper"]))
            .await;
        assert!(matches!(through_report, Err(GatewayError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_folder_sorted() {
        let rds = fake_rds::spawn().await;
        let session = CognosSession::connect(params(&rds.base_url, "jdoe", 0))
            .await
            .unwrap();

        let names: Vec<String> = session
            .list_folder(&path(&["Public Folders"]))
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.name)
            .collect();
        assert_eq!(names, vec!["Attendance", "Roster"]);
    }

    #[tokio::test]
    async fn test_download_retries_then_succeeds() {
        let rds = fake_rds::spawn().await;
        rds.state.failing_downloads.store(2, Ordering::SeqCst);
        let session = CognosSession::connect(params(&rds.base_url, "jdoe", 2))
            .await
            .unwrap();

        let mut answers = PromptAnswers::new();
        answers.insert("p_Year".to_string(), "2024".to_string());
        let csv = session
            .download_csv(&path(&["Public Folders", "Roster"]), &answers)
            .await
            .unwrap();

        assert_eq!(csv.as_ref(), ROSTER_CSV.as_bytes());
        assert_eq!(rds.state.downloads.load(Ordering::SeqCst), 1);
        let xml_data = rds.state.last_xml_data.lock().clone().unwrap();
        assert!(xml_data.contains("<name>p_Year</name>"));
        assert!(xml_data.contains("<useValue>2024</useValue>"));
    }

    #[tokio::test]
    async fn test_download_gives_up_after_retries() {
        let rds = fake_rds::spawn().await;
        rds.state.failing_downloads.store(5, Ordering::SeqCst);
        let session = CognosSession::connect(params(&rds.base_url, "jdoe", 1))
            .await
            .unwrap();

        let err = session
            .download_csv(&path(&["Public Folders", "Roster"]), &PromptAnswers::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::RemoteUnavailable(_)));
        assert_eq!(rds.state.failing_downloads.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_list_report_prompts() {
        let rds = fake_rds::spawn().await;
        let session = CognosSession::connect(params(&rds.base_url, "jdoe", 0))
            .await
            .unwrap();

        let prompts = session
            .list_report_prompts(&path(&["Public Folders", "Roster"]))
            .await
            .unwrap();
        assert_eq!(prompts, vec!["p_Year", "p_School"]);
    }

    #[tokio::test]
    async fn test_in_flight_calls_bounded_by_session_limit() {
        for limit in [1usize, 2] {
            let rds = fake_rds::spawn().await;
            rds.state.download_delay_ms.store(100, Ordering::SeqCst);
            let mut session_params = params(&rds.base_url, "jdoe", 0);
            session_params.concurrent_requests = limit;
            let session = Arc::new(CognosSession::connect(session_params).await.unwrap());

            let mut downloads = tokio::task::JoinSet::new();
            for _ in 0..6 {
                let session = session.clone();
                downloads.spawn(async move {
                    session
                        .download_csv(&path(&["Public Folders", "Roster"]), &PromptAnswers::new())
                        .await
                });
            }
            while let Some(outcome) = downloads.join_next().await {
                outcome.unwrap().unwrap();
            }

            assert_eq!(rds.state.downloads.load(Ordering::SeqCst), 6);
            assert_eq!(rds.state.peak_in_flight.load(Ordering::SeqCst), limit);
        }
    }
}

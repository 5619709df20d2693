//! In-process stand-in for the Cognos RDS endpoints, for tests

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub(crate) const REJECTED_USER: &str = "intruder";
pub(crate) const ROSTER_CSV: &str = "Student ID,First Name\n7,Ann\n8,Bo\n";
const SESSION_COOKIE: &str = "cam_passport=fake-session";
const MY_FOLDERS_PATH: &str = "CAMID_x0028_x0022esp_x003Aa_x003Ajdoe_x0022_x0029/My__Folders";

#[derive(Default)]
pub(crate) struct FakeState {
    pub logins: AtomicUsize,
    pub downloads: AtomicUsize,
    /// Downloads that still answer 500 before one succeeds
    pub failing_downloads: AtomicUsize,
    pub last_xml_data: Mutex<Option<String>>,
    pub last_user: Mutex<Option<String>>,
    /// Milliseconds each successful download is held open
    pub download_delay_ms: AtomicU64,
    pub in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
}

pub(crate) struct FakeRds {
    pub base_url: String,
    pub state: Arc<FakeState>,
}

pub(crate) async fn spawn() -> FakeRds {
    let state = Arc::new(FakeState::default());
    let app = Router::new()
        .route("/ibmcognos/bi/v1/login", post(login))
        .route("/ibmcognos/bi/v1/disp/rds/wsil", get(root))
        .route("/ibmcognos/bi/v1/disp/rds/wsil/path/*rest", get(folder))
        .route("/ibmcognos/bi/v1/disp/rds/outputFormat/path/*rest", get(output))
        .route("/ibmcognos/bi/v1/disp/rds/reportPrompts/path/*rest", get(prompts))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    FakeRds {
        base_url: format!("http://{}", addr),
        state,
    }
}

fn basic_user(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let decoded = STANDARD.decode(value.strip_prefix("Basic ")?).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    decoded.split_once(':').map(|(user, _)| user.to_string())
}

fn has_session(headers: &HeaderMap) -> bool {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains(SESSION_COOKIE))
}

fn xml(body: String) -> Response {
    ([(header::CONTENT_TYPE, "text/xml")], body).into_response()
}

fn listing(children: &[(&str, &str)]) -> String {
    let mut body = String::from(
        r#"<inspection xmlns="http://schemas.xmlsoap.org/ws/2001/10/inspection/">"#,
    );
    for (kind, name) in children {
        match *kind {
            "link" => body.push_str(&format!(
                r#"<link location="http://fake/wsil/{0}"><abstract>{0}</abstract></link>"#,
                name
            )),
            _ => body.push_str(&format!(
                r#"<service><abstract>{}</abstract><description location="http://fake/x"/></service>"#,
                name
            )),
        }
    }
    body.push_str("</inspection>");
    body
}

async fn login(State(state): State<Arc<FakeState>>, headers: HeaderMap) -> Response {
    state.logins.fetch_add(1, Ordering::SeqCst);
    let user = basic_user(&headers);
    *state.last_user.lock() = user.clone();
    match user {
        Some(user) if user != REJECTED_USER => (
            [(header::SET_COOKIE, format!("{}; Path=/", SESSION_COOKIE))],
            "{}",
        )
            .into_response(),
        _ => StatusCode::UNAUTHORIZED.into_response(),
    }
}

async fn root(headers: HeaderMap) -> Response {
    if !has_session(&headers) {
        return StatusCode::FORBIDDEN.into_response();
    }
    xml(r#"<inspection xmlns="http://schemas.xmlsoap.org/ws/2001/10/inspection/">
<link location="http://fake/ibmcognos/bi/v1/disp/rds/wsil/path/CAMID(%22esp%3Aa%3Ajdoe%22)/My__Folders"><abstract>My Folders</abstract></link>
<link location="http://fake/ibmcognos/bi/v1/disp/rds/wsil/path/Public__Folders"><abstract>Public Folders</abstract></link>
</inspection>"#
        .to_string())
}

async fn folder(Path(rest): Path<String>) -> Response {
    match rest.as_str() {
        "Public__Folders" => xml(listing(&[("link", "Attendance"), ("service", "Roster")])),
        "Public__Folders/Attendance" => xml(listing(&[("service", "Daily Totals")])),
        MY_FOLDERS_PATH => xml(listing(&[("service", "Private Report")])),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn output(
    State(state): State<Arc<FakeState>>,
    Path(rest): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if query.get("async").map(String::as_str) != Some("OFF") || !rest.ends_with("/CSV") {
        return StatusCode::BAD_REQUEST.into_response();
    }
    let pending = state.failing_downloads.load(Ordering::SeqCst);
    if pending > 0 {
        state.failing_downloads.store(pending - 1, Ordering::SeqCst);
        return (StatusCode::INTERNAL_SERVER_ERROR, "report server busy").into_response();
    }
    let delay = state.download_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        state.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        state.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
    state.downloads.fetch_add(1, Ordering::SeqCst);
    *state.last_xml_data.lock() = query.get("xmlData").cloned();
    ([(header::CONTENT_TYPE, "text/csv")], ROSTER_CSV).into_response()
}

async fn prompts(Path(rest): Path<String>) -> Response {
    if rest != "Public__Folders/Roster" {
        return StatusCode::NOT_FOUND.into_response();
    }
    xml(r#"<rds:prompts xmlns:rds="http://developer.cognos.com/schemas/rds/types/2">
<rds:item><rds:pname>p_Year</rds:pname></rds:item>
<rds:item><rds:pname>p_School</rds:pname></rds:item>
</rds:prompts>"#
        .to_string())
}

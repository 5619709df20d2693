use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::constants::AUTH_REALM;
use crate::gateway::GatewayResponse;
use crate::utils::GatewayError;

/// A `GatewayError` rendered as a plain-text HTTP response
pub struct ApiError(pub GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!("request failed: {}", self.0);
        } else {
            tracing::debug!("request refused: {}", self.0);
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        );
        if status == StatusCode::UNAUTHORIZED {
            if let Ok(challenge) = HeaderValue::from_str(&format!("Basic realm=\"{}\"", AUTH_REALM)) {
                headers.insert(header::WWW_AUTHENTICATE, challenge);
            }
        }

        (status, headers, format!("{}\n", self.0)).into_response()
    }
}

/// Report or listing bytes with their content headers
pub fn gateway_response(response: GatewayResponse) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(response.format.content_type()),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    if let Some(filename) = &response.filename {
        // filenames only ever hold header-safe characters
        if let Ok(disposition) =
            HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename))
        {
            headers.insert(header::CONTENT_DISPOSITION, disposition);
        }
    }
    if let Some(age) = response.age_secs {
        headers.insert(header::AGE, HeaderValue::from(age));
    }

    (StatusCode::OK, headers, response.body).into_response()
}

/// CORS preflight: echo the origin and allow the API key header
pub fn preflight(request_headers: &HeaderMap) -> Response {
    let mut headers = HeaderMap::new();
    if let Some(origin) = request_headers.get(header::ORIGIN) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("X-API-Key"),
    );
    (StatusCode::OK, headers).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::OutputFormat;
    use bytes::Bytes;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (GatewayError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (GatewayError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (GatewayError::MalformedInput("x".into()), StatusCode::BAD_REQUEST),
            (GatewayError::NotCached("x".into()), StatusCode::GATEWAY_TIMEOUT),
            (GatewayError::Unsupported("x".into()), StatusCode::NOT_IMPLEMENTED),
            (GatewayError::RemoteRejected("x".into()), StatusCode::BAD_GATEWAY),
            (GatewayError::StorageBusy("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).into_response().status(), status);
        }
    }

    #[test]
    fn test_unauthorized_carries_challenge() {
        let response = ApiError(GatewayError::Unauthorized("no".into())).into_response();
        let challenge = response.headers().get(header::WWW_AUTHENTICATE).unwrap();
        assert!(challenge.to_str().unwrap().starts_with("Basic realm="));
    }

    #[test]
    fn test_csv_response_headers() {
        let response = gateway_response(GatewayResponse {
            body: Bytes::from_static(b"a\n1\n"),
            format: OutputFormat::Csv,
            filename: Some("Roster.csv".to_string()),
            age_secs: Some(12),
        });
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "text/csv");
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            "attachment; filename=\"Roster.csv\""
        );
        assert_eq!(headers[header::AGE], "12");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }
}

use axum::http::{header, HeaderMap, Uri};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use percent_encoding::percent_decode_str;

use crate::constants::API_KEY_HEADER;
use crate::gateway::{LogicalPath, OutputFormat, PromptAnswers, Staleness};
use crate::utils::{GatewayError, Result};

const JSON_SUFFIX: &str = ".json";
const PROMPTS_FLAG: &str = "prompts";

/// Who is calling and with what secret
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    /// Basic-auth user name; only used for logging
    pub app_name: String,
    pub secret: String,
}

/// Secret from `X-API-Key`, else the basic-auth password
pub fn caller(headers: &HeaderMap) -> Option<Caller> {
    let basic = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Basic "))
        .and_then(|encoded| STANDARD.decode(encoded.trim()).ok())
        .and_then(|decoded| String::from_utf8(decoded).ok())
        .and_then(|decoded| {
            decoded
                .split_once(':')
                .map(|(user, password)| (user.to_string(), password.to_string()))
        });

    let api_key = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty());

    match (api_key, basic) {
        (Some(key), basic) => Some(Caller {
            app_name: basic.map(|(user, _)| user).unwrap_or_default(),
            secret: key.to_string(),
        }),
        (None, Some((app_name, secret))) => Some(Caller { app_name, secret }),
        (None, None) => None,
    }
}

/// Decoded path plus the format it asks for; a `.json` suffix is stripped
pub fn target(uri: &Uri, headers: &HeaderMap) -> Result<(LogicalPath, OutputFormat)> {
    let decoded = percent_decode_str(uri.path())
        .decode_utf8()
        .map_err(|e| GatewayError::MalformedInput(format!("path is not valid UTF-8: {}", e)))?;
    let mut path = LogicalPath::parse(&decoded);

    let wants_json = headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|accept| accept.to_ascii_lowercase().contains("application/json"));
    let format = if path.strip_last_suffix(JSON_SUFFIX) || wants_json {
        OutputFormat::Json
    } else {
        OutputFormat::Csv
    };

    Ok((path, format))
}

pub fn staleness(headers: &HeaderMap) -> Result<Staleness> {
    let directive = match headers.get(header::CACHE_CONTROL) {
        Some(value) => Some(value.to_str().map_err(|_| {
            GatewayError::MalformedInput("Cache-Control header is not ASCII".to_string())
        })?),
        None => None,
    };
    Staleness::parse(directive)
}

/// Prompt answers from the body and the query string, plus whether
/// `?prompts` asked for the prompt list instead of report data.
///
/// Query and form values win over JSON body values.
pub fn answers(uri: &Uri, headers: &HeaderMap, body: &[u8]) -> Result<(PromptAnswers, bool)> {
    let mut answers = PromptAnswers::new();

    let media_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(|value| value.trim().to_ascii_lowercase())
        .unwrap_or_default();

    if !body.is_empty() {
        if media_type.ends_with("json") {
            let values: PromptAnswers = serde_json::from_slice(body).map_err(|e| {
                GatewayError::MalformedInput(format!(
                    "request body must be a JSON object of strings: {}",
                    e
                ))
            })?;
            answers.extend(values);
        } else if media_type == "multipart/form-data" {
            return Err(GatewayError::Unsupported(
                "multipart/form-data bodies are not supported".to_string(),
            ));
        } else if media_type == "application/x-www-form-urlencoded" {
            answers.extend(url::form_urlencoded::parse(body).into_owned());
        }
    }

    let mut list_prompts = false;
    let query = uri.query().unwrap_or_default();
    for (name, value) in url::form_urlencoded::parse(query.as_bytes()).into_owned() {
        if name == PROMPTS_FLAG {
            list_prompts = true;
        } else {
            answers.insert(name, value);
        }
    }

    Ok((answers, list_prompts))
}

use bytes::Bytes;
use std::collections::BTreeMap;

use super::path::LogicalPath;
use crate::utils::{GatewayError, Result};

/// Named report parameters threaded through to the backend.
///
/// Ordered so that serialisations (and therefore cache keys) are stable.
pub type PromptAnswers = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Json,
}

impl OutputFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Csv => "text/csv",
            Self::Json => "application/json",
        }
    }
}

/// How old a cached response the caller accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    /// Use the configured `max_age_secs`
    Default,
    /// Always refetch
    NoCache,
    /// Serve whatever is cached, never call the backend
    OnlyIfCached,
    /// Serve if the entry is at most this many seconds old
    MaxAge(u64),
}

impl Staleness {
    /// Parse a `Cache-Control` style directive
    pub fn parse(directive: Option<&str>) -> Result<Self> {
        let directive = match directive.map(|d| d.trim().to_ascii_lowercase()) {
            None => return Ok(Self::Default),
            Some(d) if d.is_empty() => return Ok(Self::Default),
            Some(d) => d,
        };

        match directive.as_str() {
            "no-cache" => Ok(Self::NoCache),
            "only-if-cached" => Ok(Self::OnlyIfCached),
            other => match other.strip_prefix("max-age=") {
                Some(seconds) => seconds
                    .trim()
                    .parse::<i32>()
                    .ok()
                    .and_then(|s| u64::try_from(s).ok())
                    .map(Self::MaxAge)
                    .ok_or_else(|| {
                        GatewayError::MalformedInput(format!(
                            "could not understand max-age directive {:?}",
                            other
                        ))
                    }),
                None => Err(GatewayError::Unsupported(format!(
                    "Cache-Control directive {:?} is not implemented",
                    other
                ))),
            },
        }
    }

    /// Collapse `Default` into a concrete bound
    pub fn resolve(self, configured_max_age: u64) -> Self {
        match self {
            Self::Default => Self::MaxAge(configured_max_age).resolve(configured_max_age),
            Self::MaxAge(0) => Self::NoCache,
            other => other,
        }
    }
}

/// A request as handed over by the front door, after authentication
#[derive(Debug, Clone)]
pub struct ReportRequest {
    pub path: LogicalPath,
    pub format: OutputFormat,
    pub answers: PromptAnswers,
    pub staleness: Staleness,
}

impl ReportRequest {
    pub fn new(path: LogicalPath, format: OutputFormat) -> Self {
        Self {
            path,
            format,
            answers: PromptAnswers::new(),
            staleness: Staleness::Default,
        }
    }

    pub fn with_answers(mut self, answers: PromptAnswers) -> Self {
        self.answers = answers;
        self
    }

    pub fn with_staleness(mut self, staleness: Staleness) -> Self {
        self.staleness = staleness;
        self
    }
}

/// Response bytes plus what the front door needs to label them
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub body: Bytes,
    pub format: OutputFormat,
    /// Set for CSV responses only
    pub filename: Option<String>,
    /// Age of the cached entry that was served, `None` for fresh data
    pub age_secs: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_staleness() {
        assert_eq!(Staleness::parse(None).unwrap(), Staleness::Default);
        assert_eq!(Staleness::parse(Some("")).unwrap(), Staleness::Default);
        assert_eq!(Staleness::parse(Some("No-Cache")).unwrap(), Staleness::NoCache);
        assert_eq!(
            Staleness::parse(Some("only-if-cached")).unwrap(),
            Staleness::OnlyIfCached
        );
        assert_eq!(
            Staleness::parse(Some("max-age= 300")).unwrap(),
            Staleness::MaxAge(300)
        );
        assert_eq!(
            Staleness::parse(Some("max-age=2147483647")).unwrap(),
            Staleness::MaxAge(2_147_483_647)
        );
    }

    #[test]
    fn test_parse_staleness_errors() {
        assert!(matches!(
            Staleness::parse(Some("max-age=-1")),
            Err(GatewayError::MalformedInput(_))
        ));
        assert!(matches!(
            Staleness::parse(Some("max-age=2147483648")),
            Err(GatewayError::MalformedInput(_))
        ));
        assert!(matches!(
            Staleness::parse(Some("max-age=soon")),
            Err(GatewayError::MalformedInput(_))
        ));
        assert!(matches!(
            Staleness::parse(Some("must-revalidate")),
            Err(GatewayError::Unsupported(_))
        ));
    }

    #[test]
    fn test_resolve() {
        assert_eq!(Staleness::Default.resolve(60), Staleness::MaxAge(60));
        assert_eq!(Staleness::Default.resolve(0), Staleness::NoCache);
        assert_eq!(Staleness::MaxAge(0).resolve(60), Staleness::NoCache);
        assert_eq!(Staleness::OnlyIfCached.resolve(60), Staleness::OnlyIfCached);
    }
}

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

use crate::utils::{GatewayError, Result};

static UNSAFE_FILENAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new("[^A-Za-z0-9 _.-]").expect("static regex"));

/// Caller-facing address of a report or folder.
///
/// Component 0 is the data source (DSN), component 1 is either `public` or a
/// backend user name, the rest walk the folder tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogicalPath {
    components: Vec<String>,
}

impl LogicalPath {
    /// Parse a slash-delimited path, ignoring leading and trailing slashes
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim_matches('/');
        Self {
            components: trimmed.split('/').map(str::to_string).collect(),
        }
    }

    /// Build from components; a component containing `/` is rejected
    pub fn from_components<I, S>(components: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let components: Vec<String> = components.into_iter().map(Into::into).collect();
        if components.iter().any(|c| c.contains('/')) {
            return Err(GatewayError::MalformedInput(
                "a path component may not contain a slash".to_string(),
            ));
        }
        Ok(Self { components })
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn last(&self) -> &str {
        self.components.last().map(String::as_str).unwrap_or("")
    }

    /// Strip `suffix` from the last component, reporting whether it was there
    pub fn strip_last_suffix(&mut self, suffix: &str) -> bool {
        match self.components.last_mut() {
            Some(last) if last.ends_with(suffix) => {
                last.truncate(last.len() - suffix.len());
                true
            }
            _ => false,
        }
    }

    /// Data source selector
    pub fn dsn(&self) -> Result<&str> {
        self.require_remote_shape()?;
        Ok(&self.components[0])
    }

    /// `public` or the backend user owning the private folder
    pub fn root(&self) -> Result<&str> {
        self.require_remote_shape()?;
        Ok(&self.components[1])
    }

    /// Components below the root folder
    pub fn tail(&self) -> &[String] {
        self.components.get(2..).unwrap_or(&[])
    }

    fn require_remote_shape(&self) -> Result<()> {
        if self.components.len() < 2 || self.components[..2].iter().any(String::is_empty) {
            return Err(GatewayError::MalformedInput(
                "path must contain a DSN and at least one other component".to_string(),
            ));
        }
        Ok(())
    }

    /// Download filename for CSV responses, limited to header-safe characters
    pub fn suggested_filename(&self) -> String {
        let safe = UNSAFE_FILENAME_CHARS.replace_all(self.last(), "");
        format!("{}.csv", safe)
    }
}

impl fmt::Display for LogicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.components.join("/"))
    }
}

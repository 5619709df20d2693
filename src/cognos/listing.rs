use percent_encoding::percent_decode_str;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::types::{EntryKind, FolderEntry};
use crate::constants::MY_FOLDERS;
use crate::utils::{GatewayError, Result};

/// One child of a WSIL inspection document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsilEntry {
    pub name: String,
    pub kind: EntryKind,
    pub location: Option<String>,
}

impl From<WsilEntry> for FolderEntry {
    fn from(entry: WsilEntry) -> Self {
        FolderEntry {
            name: entry.name,
            kind: entry.kind,
        }
    }
}

fn unreadable(what: &str, err: impl std::fmt::Display) -> GatewayError {
    GatewayError::RemoteUnavailable(format!("unreadable {} from Cognos: {}", what, err))
}

fn location_of(element: &BytesStart<'_>) -> Result<Option<String>> {
    let attribute = element
        .try_get_attribute("location")
        .map_err(|e| unreadable("folder listing", e))?;
    match attribute {
        Some(attribute) => {
            let value = attribute
                .unescape_value()
                .map_err(|e| unreadable("folder listing", e))?;
            Ok(Some(value.into_owned()))
        }
        None => Ok(None),
    }
}

/// Parse an RDS WSIL listing: `<link>` children are folders and
/// `<service>` children are reports, both named by their `<abstract>`
pub fn parse_listing(xml: &str) -> Result<Vec<WsilEntry>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut depth = 0usize;
    let mut current: Option<WsilEntry> = None;
    let mut in_abstract = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) => {
                depth += 1;
                match (depth, element.local_name().as_ref()) {
                    (2, b"link") => {
                        current = Some(WsilEntry {
                            name: String::new(),
                            kind: EntryKind::Folder,
                            location: location_of(&element)?,
                        });
                    }
                    (2, b"service") => {
                        current = Some(WsilEntry {
                            name: String::new(),
                            kind: EntryKind::Report,
                            location: None,
                        });
                    }
                    (3, b"abstract") => in_abstract = current.is_some(),
                    _ => {}
                }
            }
            Ok(Event::Text(text)) if in_abstract => {
                let text = text.unescape().map_err(|e| unreadable("folder listing", e))?;
                if let Some(entry) = current.as_mut() {
                    entry.name.push_str(&text);
                }
            }
            Ok(Event::CData(text)) if in_abstract => {
                if let Some(entry) = current.as_mut() {
                    entry.name.push_str(&String::from_utf8_lossy(&text));
                }
            }
            Ok(Event::End(_)) => {
                match depth {
                    3 => in_abstract = false,
                    2 => {
                        if let Some(entry) = current.take() {
                            entries.push(entry);
                        }
                    }
                    _ => {}
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(unreadable("folder listing", e)),
            _ => {}
        }
    }

    Ok(entries)
}

/// Account id of the signed-in user, taken from the root listing's
/// `My Folders` link (second-to-last component of its decoded location)
pub fn account_id_from_root(entries: &[WsilEntry]) -> Result<String> {
    let location = entries
        .iter()
        .find(|entry| entry.kind == EntryKind::Folder && entry.name == MY_FOLDERS)
        .and_then(|entry| entry.location.as_deref())
        .ok_or_else(|| {
            GatewayError::RemoteUnavailable("could not find My Folders in the RDS root".to_string())
        })?;

    let decoded = percent_decode_str(location)
        .decode_utf8()
        .map_err(|e| unreadable("My Folders location", e))?;
    let components: Vec<&str> = decoded.split('/').collect();
    match components.len() {
        n if n >= 2 && !components[n - 2].is_empty() => Ok(components[n - 2].to_string()),
        _ => Err(GatewayError::RemoteUnavailable(format!(
            "unexpected My Folders location {:?}",
            location
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ROOT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<inspection xmlns="http://schemas.xmlsoap.org/ws/2001/10/inspection/">
  <link location="https://cognos.example.org/ibmcognos/bi/v1/disp/rds/wsil/path/CAMID(%22esp%3Aa%3Ajdoe%22)/My__Folders">
    <abstract>My Folders</abstract>
  </link>
  <link location="https://cognos.example.org/ibmcognos/bi/v1/disp/rds/wsil/path/Public__Folders">
    <abstract>Public Folders</abstract>
  </link>
</inspection>"#;

    #[test]
    fn test_parse_links_and_services() {
        let xml = r#"<wsil:inspection xmlns:wsil="http://schemas.xmlsoap.org/ws/2001/10/inspection/">
  <wsil:link location="x/Attendance"><wsil:abstract>Attendance</wsil:abstract></wsil:link>
  <wsil:service>
    <wsil:abstract>Roster &amp; Grades</wsil:abstract>
    <wsil:description location="x/report"/>
  </wsil:service>
</wsil:inspection>"#;

        let entries = parse_listing(xml).unwrap();
        assert_eq!(
            entries,
            vec![
                WsilEntry {
                    name: "Attendance".to_string(),
                    kind: EntryKind::Folder,
                    location: Some("x/Attendance".to_string()),
                },
                WsilEntry {
                    name: "Roster & Grades".to_string(),
                    kind: EntryKind::Report,
                    location: None,
                },
            ]
        );
    }

    #[test]
    fn test_account_id_from_root() {
        let entries = parse_listing(ROOT).unwrap();
        assert_eq!(
            account_id_from_root(&entries).unwrap(),
            "CAMID(\"esp:a:jdoe\")"
        );
    }

    #[test]
    fn test_missing_my_folders() {
        let entries = parse_listing("<inspection></inspection>").unwrap();
        assert!(matches!(
            account_id_from_root(&entries),
            Err(GatewayError::RemoteUnavailable(_))
        ));
    }

    #[test]
    fn test_broken_xml() {
        assert!(parse_listing("<inspection><link></inspection>").is_err());
    }
}

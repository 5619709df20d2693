use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::gateway::PromptAnswers;
use crate::utils::{GatewayError, Result};

/// Render answers as the `promptAnswers` document RDS takes in `xmlData`
pub fn answers_xml(answers: &PromptAnswers) -> String {
    let mut xml = String::from("<promptAnswers>");
    for (name, value) in answers {
        xml.push_str("<promptValues><name>");
        xml.push_str(&escape(name.as_str()));
        xml.push_str("</name><values><item><SimplePValue><inclusive>true</inclusive><useValue>");
        xml.push_str(&escape(value.as_str()));
        xml.push_str("</useValue></SimplePValue></item></values></promptValues>");
    }
    xml.push_str("</promptAnswers>");
    xml
}

/// Collect the text of every `pname` element, whatever its namespace prefix
pub fn prompt_names(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut names = Vec::new();
    let mut current: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) if element.local_name().as_ref() == b"pname" => {
                current = Some(String::new());
            }
            Ok(Event::Text(text)) => {
                if let Some(name) = current.as_mut() {
                    let text = text.unescape().map_err(|e| {
                        GatewayError::RemoteUnavailable(format!("unreadable prompt list: {}", e))
                    })?;
                    name.push_str(&text);
                }
            }
            Ok(Event::End(element)) if element.local_name().as_ref() == b"pname" => {
                if let Some(name) = current.take() {
                    names.push(name);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(GatewayError::RemoteUnavailable(format!(
                    "unreadable prompt list: {}",
                    e
                )))
            }
            _ => {}
        }
    }

    Ok(names)
}

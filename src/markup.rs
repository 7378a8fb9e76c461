use quick_xml::Reader;
use quick_xml::events::Event;

/// Text of the first element named `tag`, trimmed. Parse errors end the search.
pub fn first_element_text(xml: &str, tag: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut capture: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(start)) if local_name(start.name().as_ref()) == tag.as_bytes() => {
                capture = Some(String::new());
            }
            Ok(Event::Text(text)) => {
                if let Some(value) = capture.as_mut()
                    && let Ok(decoded) = text.decode()
                {
                    value.push_str(&decoded);
                }
            }
            Ok(Event::GeneralRef(reference)) => {
                if let Some(value) = capture.as_mut()
                    && let Some(resolved) = resolve_entity(&String::from_utf8_lossy(&reference))
                {
                    value.push_str(&resolved);
                }
            }
            Ok(Event::End(end)) if local_name(end.name().as_ref()) == tag.as_bytes() => {
                if let Some(value) = capture.take() {
                    let trimmed = value.trim();
                    if !trimmed.is_empty() {
                        return Some(trimmed.to_owned());
                    }
                }
            }
            Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => {}
        }

        buf.clear();
    }
}

pub fn local_name(name: &[u8]) -> &[u8] {
    name.rsplit(|byte| *byte == b':').next().unwrap_or(name)
}

pub fn resolve_entity(name: &str) -> Option<String> {
    let resolved = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        _ => {
            let numeric = name.strip_prefix('#')?;
            let code = match numeric.strip_prefix('x').or_else(|| numeric.strip_prefix('X')) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => numeric.parse::<u32>().ok()?,
            };
            char::from_u32(code)?
        }
    };
    Some(resolved.to_string())
}

#[cfg(test)]
mod tests {
    use super::{first_element_text, resolve_entity};

    #[test]
    fn finds_first_matching_element() {
        let xml = "<device-info><model-name>Ultra</model-name>\
                   <user-device-name> Den TV </user-device-name></device-info>";
        assert_eq!(
            first_element_text(xml, "user-device-name").as_deref(),
            Some("Den TV")
        );
        assert_eq!(first_element_text(xml, "serial-number"), None);
    }

    #[test]
    fn entities_inside_text_are_decoded() {
        let xml = "<root><name>Tom &amp; Jerry</name></root>";
        assert_eq!(
            first_element_text(xml, "name").as_deref(),
            Some("Tom & Jerry")
        );
    }

    #[test]
    fn empty_elements_are_skipped() {
        let xml = "<root><name>  </name><name>Second</name></root>";
        assert_eq!(first_element_text(xml, "name").as_deref(), Some("Second"));
    }

    #[test]
    fn malformed_markup_yields_none() {
        assert_eq!(first_element_text("<root><name>Open", "name"), None);
        assert_eq!(first_element_text("not xml at all", "name"), None);
    }

    #[test]
    fn numeric_references_resolve() {
        assert_eq!(resolve_entity("#38").as_deref(), Some("&"));
        assert_eq!(resolve_entity("#x26").as_deref(), Some("&"));
        assert_eq!(resolve_entity("nbsp"), None);
    }
}

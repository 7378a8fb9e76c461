use crate::markup::{local_name, resolve_entity};
use quick_xml::Reader;
use quick_xml::escape::unescape;
use quick_xml::events::Event;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppEntry {
    pub id: String,
    pub name: String,
    pub shortcut: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppCatalog {
    entries: Vec<AppEntry>,
}

impl AppCatalog {
    pub fn from_xml(xml: &str) -> Self {
        Self {
            entries: assign_shortcuts(parse_apps(xml)),
        }
    }

    pub fn entries(&self) -> &[AppEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn resolve(&self, key: &str) -> Option<&AppEntry> {
        let wanted = key.trim().to_ascii_uppercase();
        self.entries.iter().find(|entry| entry.shortcut == wanted)
    }
}

pub fn parse_apps(xml: &str) -> Vec<(String, String)> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut current: Option<(String, String)> = None;
    let mut apps = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(start)) if local_name(start.name().as_ref()) == b"app" => {
                let id = start
                    .attributes()
                    .flatten()
                    .find(|attr| local_name(attr.key.as_ref()) == b"id")
                    .map(|attr| {
                        let raw = String::from_utf8_lossy(&attr.value).into_owned();
                        unescape(&raw).map_or(raw.clone(), |value| value.into_owned())
                    });
                current = id.map(|id| (id.trim().to_owned(), String::new()));
            }
            Ok(Event::Text(text)) => {
                if let Some((_, name)) = current.as_mut()
                    && let Ok(decoded) = text.decode()
                {
                    name.push_str(&decoded);
                }
            }
            Ok(Event::GeneralRef(reference)) => {
                if let Some((_, name)) = current.as_mut()
                    && let Some(resolved) = resolve_entity(&String::from_utf8_lossy(&reference))
                {
                    name.push_str(&resolved);
                }
            }
            Ok(Event::End(end)) if local_name(end.name().as_ref()) == b"app" => {
                if let Some((id, name)) = current.take()
                    && !id.is_empty()
                {
                    apps.push((id, name.trim().to_owned()));
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                tracing::warn!("app list is malformed, keeping {} parsed apps: {err}", apps.len());
                break;
            }
            Ok(_) => {}
        }

        buf.clear();
    }

    apps
}

pub fn clean_name(name: &str) -> String {
    let trimmed = name.trim();
    let without_article = trimmed
        .strip_prefix("The ")
        .or_else(|| trimmed.strip_prefix("A "))
        .unwrap_or(trimmed);
    without_article
        .replace("&amp;", "&")
        .chars()
        .filter(char::is_ascii_alphabetic)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// First-come-first-served shortcut assignment in fetch order.
/// Each app tries the single letters of its cleaned name in order, then its
/// prefixes of two or more letters, and takes the first one no earlier app holds.
/// An app with nothing left is dropped.
#[must_use]
pub fn assign_shortcuts(apps: Vec<(String, String)>) -> Vec<AppEntry> {
    let mut taken = HashSet::new();
    let mut entries = Vec::with_capacity(apps.len());

    for (id, name) in apps {
        let cleaned = clean_name(&name);
        let Some(shortcut) = shortcut_candidates(&cleaned).find(|key| !taken.contains(key)) else {
            tracing::warn!(app = %name, id = %id, "no free shortcut key, leaving app out");
            continue;
        };
        taken.insert(shortcut.clone());
        entries.push(AppEntry { id, name, shortcut });
    }

    entries
}

fn shortcut_candidates(cleaned: &str) -> impl Iterator<Item = String> + '_ {
    let letters = cleaned.chars().map(String::from);
    let prefixes = (2..=cleaned.len()).map(|len| cleaned[..len].to_owned());
    letters.chain(prefixes)
}

use dashmap::DashMap;
use domain::{DocumentName, IndexDefinition, NodePath};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use tracing::trace;

/// String-equality index over one `element/@attribute` path of a container.
#[derive(Debug)]
pub struct AttributeIndex {
    definition: IndexDefinition,
    // Attribute value -> documents holding it (kept sorted, no duplicates)
    postings: DashMap<String, Vec<DocumentName>>,
}

impl AttributeIndex {
    pub fn new(definition: IndexDefinition) -> Self {
        Self {
            definition,
            postings: DashMap::new(),
        }
    }

    pub fn definition(&self) -> &IndexDefinition {
        &self.definition
    }

    pub fn is_unique(&self) -> bool {
        self.definition.index_type.unique
    }

    /// Returns the first key that would break uniqueness if `keys` were inserted.
    pub fn check_insert(&self, keys: &[String]) -> Result<(), String> {
        if !self.is_unique() {
            return Ok(());
        }
        for (position, key) in keys.iter().enumerate() {
            if self.postings.contains_key(key) || keys[..position].contains(key) {
                return Err(key.clone());
            }
        }
        Ok(())
    }

    /// Adds the keys of one document. Callers run `check_insert` first.
    pub fn insert(&self, document: &DocumentName, keys: Vec<String>) {
        for key in keys {
            let mut entry = self.postings.entry(key).or_default();
            if let Err(position) = entry.binary_search(document) {
                entry.insert(position, document.clone());
            }
        }
    }

    pub fn lookup(&self, value: &str) -> Vec<DocumentName> {
        self.postings
            .get(value)
            .map(|names| names.value().clone())
            .unwrap_or_default()
    }

    pub fn key_count(&self) -> usize {
        self.postings.len()
    }
}

/// Scans `content`, verifying it is a well-formed XML document, and collects the
/// attribute values found at each of `paths` (one list per path, in document order).
pub fn scan_document(content: &str, paths: &[&NodePath]) -> Result<Vec<Vec<String>>, String> {
    let mut reader = Reader::from_str(content);
    let mut keys = vec![Vec::new(); paths.len()];
    let mut depth = 0usize;
    let mut roots = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                if depth == 0 {
                    roots += 1;
                }
                depth += 1;
                collect_keys(e, paths, &mut keys)?;
            }
            Ok(Event::Empty(ref e)) => {
                if depth == 0 {
                    roots += 1;
                }
                collect_keys(e, paths, &mut keys)?;
            }
            Ok(Event::End(ref e)) => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    format!(
                        "unexpected closing tag '{}'",
                        String::from_utf8_lossy(e.name().as_ref())
                    )
                })?;
            }
            Ok(Event::Text(ref e)) => {
                if depth == 0 && !e.iter().all(u8::is_ascii_whitespace) {
                    return Err("text outside the root element".to_string());
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(format!("at byte {}: {}", reader.error_position(), e));
            }
        }
    }

    if depth != 0 {
        return Err(format!("{} element(s) left unclosed", depth));
    }
    if roots != 1 {
        return Err(format!("expected one root element, found {}", roots));
    }
    trace!(paths = paths.len(), "Document scanned");
    Ok(keys)
}

fn collect_keys(
    element: &BytesStart<'_>,
    paths: &[&NodePath],
    keys: &mut [Vec<String>],
) -> Result<(), String> {
    let local_name = element.local_name();
    let local_name = String::from_utf8_lossy(local_name.as_ref());

    // Attributes are always walked so malformed ones are caught.
    for attribute in element.attributes() {
        let attribute = attribute.map_err(|e| e.to_string())?;
        let qualified = String::from_utf8_lossy(attribute.key.as_ref());
        for (path, found) in paths.iter().zip(keys.iter_mut()) {
            if path.matches_element(&local_name) && path.matches_attribute(&qualified) {
                let value = attribute.unescape_value().map_err(|e| e.to_string())?;
                found.push(value.into_owned());
            }
        }
    }
    Ok(())
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::slug::slugify;

/// Caller-supplied attributes for building or updating a record.
pub type Attributes = serde_json::Map<String, Value>;

/// Validation messages keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// `"Title can't be blank"` style messages, one per error.
    pub fn full_messages(&self) -> Vec<String> {
        self.0
            .iter()
            .flat_map(|(field, messages)| {
                let label = humanize(field);
                messages.iter().map(move |m| format!("{} {}", label, m))
            })
            .collect()
    }
}

/// Result of a create/update against the store.
///
/// `record` is the in-memory instance either way: the persisted one on
/// success, or the rejected one (with the caller's changes applied) on failure.
#[derive(Debug, Clone)]
pub struct Mutation<T> {
    pub record: T,
    pub errors: FieldErrors,
}

impl<T> Mutation<T> {
    pub fn saved(record: T) -> Self {
        Self {
            record,
            errors: FieldErrors::new(),
        }
    }

    pub fn rejected(record: T, errors: FieldErrors) -> Self {
        Self { record, errors }
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Read a string-ish attribute.
///
/// Returns `None` when the key is absent and `Some(None)` when it is present
/// but null. Numbers and booleans are stringified.
pub fn string_attribute(attributes: &Attributes, key: &str) -> Option<Option<String>> {
    attributes.get(key).map(|value| match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    })
}

/// Title and slug handling shared by directories and features.
///
/// A non-blank `slug` locks the slug; a blank one unlocks it so that it
/// follows the title again.
pub(crate) fn assign_sluggable(
    title: &mut String,
    slug: &mut String,
    slug_lock: &mut bool,
    attributes: &Attributes,
) {
    if let Some(value) = string_attribute(attributes, "title") {
        *title = value.unwrap_or_default();
    }

    match string_attribute(attributes, "slug") {
        Some(Some(value)) if !value.trim().is_empty() => {
            *slug = slugify(&value);
            *slug_lock = true;
        }
        Some(_) => *slug_lock = false,
        None => {}
    }

    if !*slug_lock {
        *slug = slugify(title);
    }
}

fn humanize(field: &str) -> String {
    let spaced = field.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

//! Tag templates and entity-kind descriptors.
//!
//! A kind is described once, as data: its name and the tag templates its
//! identifiers produce. Rendering is pure and deterministic, so the same ids
//! always give the same tag strings on every instance.

use std::collections::{BTreeMap, BTreeSet};

/// Identifier values keyed by field name (`id`, `environmentId`, ...).
///
/// Empty values are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagIds {
    values: BTreeMap<String, String>,
}

impl TagIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }

    /// Like [`TagIds::with`] but skips `None`.
    pub fn with_opt(self, field: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(value) => self.with(field, value),
            None => self,
        }
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        if !value.is_empty() {
            self.values.insert(field.into(), value);
        }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.values.get(field).map(String::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TagIds {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut ids = TagIds::new();
        for (field, value) in iter {
            ids.set(field, value);
        }
        ids
    }
}

/// A tag pattern with `{field}` placeholders, e.g.
/// `"environments-{environmentId}-responses"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagTemplate {
    pattern: &'static str,
}

impl TagTemplate {
    pub const fn new(pattern: &'static str) -> Self {
        Self { pattern }
    }

    pub fn pattern(&self) -> &'static str {
        self.pattern
    }

    /// Placeholder names in order of appearance.
    pub fn fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        let mut rest = self.pattern;
        while let Some(start) = rest.find('{') {
            let after = &rest[start + 1..];
            let Some(end) = after.find('}') else {
                break;
            };
            fields.push(&after[..end]);
            rest = &after[end + 1..];
        }
        fields
    }

    /// Render the tag, or `None` if any placeholder has no value in `ids`.
    pub fn render(&self, ids: &TagIds) -> Option<String> {
        let mut out = String::with_capacity(self.pattern.len() + 32);
        let mut rest = self.pattern;
        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let end = after.find('}')?;
            out.push_str(ids.get(&after[..end])?);
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Some(out)
    }
}

/// Descriptor of one domain entity kind and the tags it produces.
#[derive(Debug, PartialEq, Eq)]
pub struct EntityKind {
    pub name: &'static str,
    pub templates: &'static [TagTemplate],
}

impl EntityKind {
    pub const fn new(name: &'static str, templates: &'static [TagTemplate]) -> Self {
        Self { name, templates }
    }

    /// Every tag whose placeholders are all supplied by `ids`, in template
    /// order.
    pub fn tags(&self, ids: &TagIds) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.templates
            .iter()
            .filter_map(|template| template.render(ids))
            .filter(|tag| seen.insert(tag.clone()))
            .collect()
    }

    /// The single tag for exactly this combination of fields, e.g.
    /// `{surveyId}` -> `"surveys-{surveyId}-responses"`. Used when tagging a
    /// cache entry.
    pub fn tag_for(&self, ids: &TagIds) -> Option<String> {
        let wanted: BTreeSet<&str> = ids.fields().collect();
        self.templates
            .iter()
            .find(|template| template.fields().into_iter().collect::<BTreeSet<_>>() == wanted)
            .and_then(|template| template.render(ids))
    }

    /// Union of all placeholder names across templates.
    pub fn fields(&self) -> BTreeSet<&'static str> {
        self.templates
            .iter()
            .flat_map(|template| template.fields())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static RESPONSE_NOTE: EntityKind = EntityKind::new(
        "responseNote",
        &[
            TagTemplate::new("responseNotes-{id}"),
            TagTemplate::new("responses-{responseId}-responseNote"),
        ],
    );

    #[test]
    fn test_render_requires_every_placeholder() {
        let template = TagTemplate::new("surveys-{surveyId}-singleUse-{singleUseId}-responses");
        assert_eq!(template.fields(), vec!["surveyId", "singleUseId"]);

        let partial = TagIds::new().with("surveyId", "s1");
        assert_eq!(template.render(&partial), None);

        let full = partial.with("singleUseId", "u9");
        assert_eq!(
            template.render(&full).as_deref(),
            Some("surveys-s1-singleUse-u9-responses")
        );
    }

    #[test]
    fn test_empty_values_count_as_absent() {
        let ids = TagIds::new().with("id", "").with_opt("responseId", None::<String>);
        assert!(ids.is_empty());
        assert!(RESPONSE_NOTE.tags(&ids).is_empty());
    }

    #[test]
    fn test_kind_tags_and_tag_for() {
        let ids: TagIds = [("id", "n1"), ("responseId", "r1")].into_iter().collect();
        assert_eq!(
            RESPONSE_NOTE.tags(&ids),
            vec!["responseNotes-n1", "responses-r1-responseNote"]
        );
        assert_eq!(
            RESPONSE_NOTE
                .tag_for(&TagIds::new().with("responseId", "r1"))
                .as_deref(),
            Some("responses-r1-responseNote")
        );
        assert_eq!(RESPONSE_NOTE.tag_for(&ids), None);
        assert_eq!(
            RESPONSE_NOTE.fields().into_iter().collect::<Vec<_>>(),
            vec!["id", "responseId"]
        );
    }

    #[test]
    fn test_literal_template_renders_without_ids() {
        let template = TagTemplate::new("organizations");
        assert_eq!(template.render(&TagIds::new()).as_deref(), Some("organizations"));
        assert!(template.fields().is_empty());
    }
}

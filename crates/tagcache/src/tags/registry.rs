use std::collections::BTreeMap;
use std::future::Future;

use crate::error::{InvalidationError, TierError};
use crate::selector::TierSelector;

use super::engine::{EntityKind, TagIds};
use super::kinds::BUILTIN;

/// Outcome of a best-effort invalidation.
#[derive(Debug, Default)]
pub struct RevalidateReport {
    /// Tags that were deleted, with the number of entries each removed.
    pub invalidated: Vec<(String, usize)>,
    /// Tags whose deletion failed on the active tier.
    pub failed: Vec<InvalidationError>,
}

impl RevalidateReport {
    /// True when every tag was invalidated.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn removed_entries(&self) -> usize {
        self.invalidated.iter().map(|(_, removed)| removed).sum()
    }
}

/// Invalidate each tag on the active tier. A failing tag is logged and
/// recorded; the remaining tags are still attempted.
pub async fn invalidate_tags<I, S>(selector: &TierSelector, tags: I) -> RevalidateReport
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    invalidate_each(tags, |tag| async move { selector.delete_by_tag(&tag).await }).await
}

async fn invalidate_each<I, S, F, Fut>(tags: I, mut delete: F) -> RevalidateReport
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<usize, TierError>>,
{
    let mut report = RevalidateReport::default();
    for tag in tags {
        let tag = tag.as_ref().to_string();
        match delete(tag.clone()).await {
            Ok(removed) => {
                tracing::debug!(tag = %tag, removed, "tag invalidated");
                crate::metrics::record_invalidation("ok");
                report.invalidated.push((tag, removed));
            }
            Err(source) => {
                tracing::warn!(tag = %tag, error = %source, "Failed to invalidate tag");
                crate::metrics::record_invalidation("error");
                report.failed.push(InvalidationError { tag, source });
            }
        }
    }
    report
}

/// Maps entity identifiers to tags and invalidates them on the active tier.
///
/// Mutating handlers call [`TagRegistry::revalidate`] after every write that
/// changes a cached entity.
#[derive(Clone)]
pub struct TagRegistry {
    selector: TierSelector,
    kinds: BTreeMap<&'static str, &'static EntityKind>,
}

impl TagRegistry {
    /// A registry with every built-in kind.
    pub fn new(selector: TierSelector) -> Self {
        BUILTIN
            .iter()
            .fold(Self::empty(selector), |registry, kind| registry.with_kind(kind))
    }

    pub fn empty(selector: TierSelector) -> Self {
        Self {
            selector,
            kinds: BTreeMap::new(),
        }
    }

    /// Register a kind, replacing any kind with the same name.
    pub fn with_kind(mut self, kind: &'static EntityKind) -> Self {
        self.kinds.insert(kind.name, kind);
        self
    }

    pub fn kind(&self, name: &str) -> Option<&'static EntityKind> {
        self.kinds.get(name).copied()
    }

    pub fn kinds(&self) -> impl Iterator<Item = &'static EntityKind> + '_ {
        self.kinds.values().copied()
    }

    /// Invalidate every tag `kind` produces for `ids`.
    pub async fn revalidate(&self, kind: &EntityKind, ids: &TagIds) -> RevalidateReport {
        let tags = kind.tags(ids);
        if tags.is_empty() {
            tracing::debug!(kind = kind.name, "no tags apply to the supplied identifiers");
        }
        invalidate_tags(&self.selector, tags).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::CacheEntry;
    use crate::tags::kinds::RESPONSE;
    use std::time::Duration;

    fn entry(key: &str, tag: &str) -> CacheEntry {
        CacheEntry::new(
            key,
            b"v".to_vec(),
            [tag.to_string()].into(),
            Duration::from_secs(60),
            Duration::from_secs(90),
        )
    }

    #[tokio::test]
    async fn test_revalidate_touches_only_applicable_tags() {
        let selector = TierSelector::local_only(16);
        selector.set(entry("response:r1", "responses-r1")).await;
        selector.set(entry("env:e1", "environments-e1-responses")).await;
        selector.set(entry("survey:s1", "surveys-s1-responses")).await;

        let registry = TagRegistry::new(selector.clone());
        let ids = TagIds::new().with("id", "r1").with("environmentId", "e1");
        let report = registry.revalidate(&RESPONSE, &ids).await;

        assert!(report.is_complete());
        assert_eq!(
            report.invalidated,
            vec![
                ("responses-r1".to_string(), 1),
                ("environments-e1-responses".to_string(), 1)
            ]
        );
        assert_eq!(report.removed_entries(), 2);
        assert!(selector.get("response:r1").await.is_none());
        assert!(selector.get("env:e1").await.is_none());
        assert!(selector.get("survey:s1").await.is_some());
    }

    #[tokio::test]
    async fn test_failed_tag_does_not_stop_the_rest() {
        let report = invalidate_each(["a", "b", "c"], |tag| async move {
            if tag == "b" {
                Err(TierError::Timeout {
                    op: "delete_by_tag",
                    timeout_ms: 500,
                })
            } else {
                Ok(3)
            }
        })
        .await;

        assert!(!report.is_complete());
        assert_eq!(
            report.invalidated,
            vec![("a".to_string(), 3), ("c".to_string(), 3)]
        );
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].tag, "b");
        assert!(report.failed[0].source.is_timeout());
    }

    #[test]
    fn test_registry_lookup_and_custom_kinds() {
        static WIDGET: EntityKind = EntityKind::new(
            "widget",
            &[crate::tags::TagTemplate::new("widgets-{id}")],
        );

        let registry = TagRegistry::new(TierSelector::local_only(1));
        assert_eq!(registry.kind("response").map(|k| k.name), Some("response"));
        assert!(registry.kind("widget").is_none());

        let registry = registry.with_kind(&WIDGET);
        assert_eq!(registry.kind("widget"), Some(&WIDGET));
        assert_eq!(registry.kinds().count(), BUILTIN.len() + 1);

        let empty = TagRegistry::empty(TierSelector::local_only(1));
        assert_eq!(empty.kinds().count(), 0);
    }
}

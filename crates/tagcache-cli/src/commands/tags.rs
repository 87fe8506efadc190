use anyhow::{Context, Result, bail};
use colored::Colorize;
use tagcache::tags::kinds::BUILTIN;
use tagcache::{CacheConfig, EntityKind, TagIds, TagRegistry, TierSelector};

use crate::output::{print_error, print_success, print_warning};

pub fn kinds() {
    for kind in BUILTIN {
        println!("{}", kind.name.cyan());
        for template in kind.templates {
            println!("  {}", template.pattern());
        }
    }
}

pub fn render(kind: &str, ids: &[String]) -> Result<()> {
    let kind = find_kind(kind)?;
    let ids = parse_ids(ids)?;
    let tags = kind.tags(&ids);
    if tags.is_empty() {
        print_warning(&format!(
            "No {} tag applies; known fields: {}",
            kind.name,
            kind.fields().into_iter().collect::<Vec<_>>().join(", ")
        ));
    }
    for tag in tags {
        println!("{tag}");
    }
    Ok(())
}

/// Returns `false` if any tag failed to invalidate.
pub async fn revalidate(config: &CacheConfig, kind: &str, ids: &[String]) -> Result<bool> {
    let kind = find_kind(kind)?;
    let ids = parse_ids(ids)?;

    let selector = TierSelector::init(config).await;
    if !selector.is_remote_active() {
        print_warning("Remote tier not active; only this process's local tier is affected");
    }

    let report = TagRegistry::new(selector.clone())
        .revalidate(kind, &ids)
        .await;
    selector.shutdown();

    for (tag, removed) in &report.invalidated {
        print_success(&format!("{tag} ({removed} entries)"));
    }
    for failure in &report.failed {
        print_error(&failure.to_string());
    }
    if report.invalidated.is_empty() && report.failed.is_empty() {
        print_warning(&format!("No {} tag applies to the given ids", kind.name));
    }
    Ok(report.is_complete())
}

fn find_kind(name: &str) -> Result<&'static EntityKind> {
    match BUILTIN.iter().find(|kind| kind.name == name) {
        Some(kind) => Ok(*kind),
        None => {
            let known: Vec<&str> = BUILTIN.iter().map(|kind| kind.name).collect();
            bail!("Unknown kind: {name}. Known kinds: {}", known.join(", "))
        }
    }
}

fn parse_ids(pairs: &[String]) -> Result<TagIds> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .filter(|(field, _)| !field.is_empty())
                .map(|(field, value)| (field.to_string(), value.to_string()))
                .with_context(|| format!("Invalid id '{pair}', expected FIELD=VALUE"))
        })
        .collect()
}

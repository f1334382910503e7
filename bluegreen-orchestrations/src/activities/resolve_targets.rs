//! Resolve the compute targets behind a logical deployment name

use bluegreen_models::DeploymentTarget;
use serde_json::Value;

use crate::config::Timeouts;
use crate::error::{ProviderError, Result};
use crate::poll::retry_transient;
use crate::provider::Provider;

/// Upper bound on pages followed for one listing
const MAX_PAGES: usize = 50;

const LIST_ATTEMPTS: u32 = 3;

/// Targets named `name`, newest first, excluding DELETED and DELETING ones.
///
/// An empty result is not an error.
pub async fn resolve_targets<P: Provider + ?Sized>(
    provider: &P,
    name: &str,
    timeouts: &Timeouts,
) -> Result<Vec<DeploymentTarget>> {
    let mut items = Vec::new();
    let mut page: Option<String> = None;

    for _ in 0..MAX_PAGES {
        let raw = retry_transient("list targets", LIST_ATTEMPTS, timeouts.poll_interval, || {
            provider.list_targets(name, page.as_deref())
        })
        .await?;

        let batch = normalize_target_list(&raw).ok_or_else(|| {
            ProviderError::Decode(format!("unrecognized target list shape: {}", shape_hint(&raw)))
        })?;
        items.extend(batch);

        page = next_page(&raw);
        if page.is_none() {
            break;
        }
    }
    if page.is_some() {
        tracing::warn!(
            name,
            "Target listing still paginated after {} pages, using what was read",
            MAX_PAGES
        );
    }

    let targets = select_targets(&items, name);
    tracing::debug!(name, matched = targets.len(), "resolved targets");
    Ok(targets)
}

/// Flatten the list shapes providers answer with.
///
/// Accepts a bare array, `{data: [...]}`, `{data: {items: [...]}}` and
/// `{items: [...]}`. `null` and envelopes without any list are empty.
/// Returns `None` for anything else.
pub fn normalize_target_list(raw: &Value) -> Option<Vec<Value>> {
    match raw {
        Value::Null => Some(Vec::new()),
        Value::Array(items) => Some(items.clone()),
        Value::Object(obj) => match obj.get("data").or_else(|| obj.get("items")) {
            None | Some(Value::Null) => Some(Vec::new()),
            Some(inner) => normalize_target_list(inner),
        },
        _ => None,
    }
}

/// Page token of a paginated envelope, if more pages follow
fn next_page(raw: &Value) -> Option<String> {
    const KEYS: [&str; 3] = ["opc-next-page", "nextPage", "next_page"];
    let lookup = |v: &Value| {
        KEYS.iter().find_map(|k| v.get(*k).and_then(Value::as_str).map(str::to_string))
    };
    lookup(raw)
        .or_else(|| raw.get("data").and_then(lookup))
        .filter(|token| !token.is_empty())
}

fn shape_hint(raw: &Value) -> &'static str {
    match raw {
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Object(_) => "object",
        Value::Array(_) => "array",
        Value::Null => "null",
    }
}

/// Parse, filter and order raw descriptors
pub fn select_targets(items: &[Value], name: &str) -> Vec<DeploymentTarget> {
    let mut targets: Vec<DeploymentTarget> = items
        .iter()
        .filter_map(DeploymentTarget::from_descriptor)
        .filter(|t| t.name == name && !t.state.is_gone_or_going())
        .collect();

    targets.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
    targets.dedup_by(|a, b| a.id == b.id);
    targets
}

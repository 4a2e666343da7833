//! Label selector reduction to an equality-only label map.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

use crate::error::SelectorError;

/// Reduce `selector` to the labels a pod must carry.
///
/// Only `matchLabels` is supported. An empty map selects every pod in the
/// namespace, which is how the API server treats an empty selector.
pub fn match_labels(
    selector: Option<&LabelSelector>,
) -> Result<BTreeMap<String, String>, SelectorError> {
    let selector = selector.ok_or(SelectorError::Missing)?;

    let expressions = selector.match_expressions.as_ref().map_or(0, Vec::len);
    if expressions > 0 {
        return Err(SelectorError::Unsupported(expressions));
    }

    let labels = selector.match_labels.clone().unwrap_or_default();
    if let Some((key, value)) = labels
        .iter()
        .find(|(key, value)| key.is_empty() || key.contains(reserved) || value.contains(reserved))
    {
        return Err(SelectorError::Malformed(format!("{}={}", key, value)));
    }

    Ok(labels)
}

// Characters that would change the meaning of a `k=v,k=v` selector string.
fn reserved(c: char) -> bool {
    matches!(c, ',' | '=' | '!' | '(' | ')') || c.is_whitespace()
}

//! Variable discovery for subject and body templates.

use std::collections::BTreeSet;

use super::placeholders;

/// Return the distinct variable names referenced by a template.
///
/// Subject and body are usually scanned together by passing both texts
/// joined with a newline.
pub fn extract_variables(template: &str) -> BTreeSet<String> {
    placeholders(template)
        .map(|p| p.name.to_string())
        .collect()
}

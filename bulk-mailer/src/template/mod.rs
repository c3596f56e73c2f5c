//! Template variable discovery and rendering.
//!
//! Templates use `{{ name }}` placeholders holding a bare identifier.
//! Anything else between double braces (filters, expressions, unbalanced
//! delimiters) is left untouched.

pub mod renderer;
pub mod variables;

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

pub use renderer::{placeholder, render, strip_tags, wrap_document, RenderedContent};
pub use variables::extract_variables;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("Invalid placeholder pattern")
});

/// A recognized placeholder occurrence within a template.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Placeholder<'t> {
    /// Byte range of the whole `{{ ... }}` token
    pub span: Range<usize>,
    /// The identifier between the delimiters, already trimmed
    pub name: &'t str,
}

/// Scan a template for well-formed placeholders.
///
/// A match directly adjacent to an extra `{` or `}` (e.g. `{{{name}}}`) is
/// treated as malformed and skipped.
pub(crate) fn placeholders(template: &str) -> impl Iterator<Item = Placeholder<'_>> {
    PLACEHOLDER.captures_iter(template).filter_map(move |caps| {
        let whole = caps.get(0)?;
        let name = caps.get(1)?;

        let bytes = template.as_bytes();
        let opens_early = whole.start() > 0 && bytes[whole.start() - 1] == b'{';
        let closes_late = bytes.get(whole.end()) == Some(&b'}');
        if opens_early || closes_late {
            return None;
        }

        Some(Placeholder {
            span: whole.range(),
            name: name.as_str(),
        })
    })
}

//! Per-recipient rendering of subject and HTML body.
//!
//! Rendering never fails: a variable without a value becomes a visible
//! `[name]` marker so the delivered email shows exactly what was missing.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use super::placeholders;

static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^<]+?>").expect("Invalid tag pattern"));

/// Subject, HTML and plain-text content for one recipient.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedContent {
    pub subject: String,
    pub html: String,
    pub text: String,
}

impl RenderedContent {
    /// Render both templates and derive the plain-text alternative.
    pub fn render(
        subject_template: &str,
        body_template: &str,
        vars: &HashMap<String, String>,
    ) -> Self {
        let html = render(body_template, vars);
        let text = strip_tags(&html);
        Self {
            subject: render(subject_template, vars),
            html,
            text,
        }
    }
}

/// Visible marker rendered in place of a variable with no value.
pub fn placeholder(name: &str) -> String {
    format!("[{}]", name)
}

/// Substitute every recognized placeholder in `template`.
pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;

    for p in placeholders(template) {
        out.push_str(&template[last..p.span.start]);
        match vars.get(p.name) {
            Some(value) => out.push_str(value),
            None => out.push_str(&placeholder(p.name)),
        }
        last = p.span.end;
    }

    out.push_str(&template[last..]);
    out
}

/// Derive a plain-text body by removing everything between `<` and `>`.
///
/// This is deliberately naive; it only feeds the `text/plain` alternative.
pub fn strip_tags(html: &str) -> String {
    TAG.replace_all(html, "").into_owned()
}

/// Wrap a body fragment in a minimal HTML document.
///
/// Bodies that already start with a doctype or `<html>` are returned as-is.
pub fn wrap_document(body: &str) -> String {
    let trimmed = body.trim_start();
    let lower: String = trimmed.chars().take(9).collect::<String>().to_lowercase();
    if lower.starts_with("<!doctype") || lower.starts_with("<html") {
        return body.to_string();
    }

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Email</title>
</head>
<body>
    {}
</body>
</html>"#,
        body
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_render_missing_variable_uses_placeholder() {
        assert_eq!(render("Hi {{name}}", &HashMap::new()), "Hi [name]");
    }

    #[test]
    fn test_render_substitutes_value() {
        assert_eq!(render("Hi {{name}}", &vars(&[("name", "Ann")])), "Hi Ann");
    }

    #[test]
    fn test_render_trims_inside_delimiters() {
        let rendered = render("{{ first }} {{last }}", &vars(&[("first", "A"), ("last", "B")]));
        assert_eq!(rendered, "A B");
    }

    #[test]
    fn test_render_is_idempotent() {
        let template = "<p>Hello {{ name }} from {{ city }}</p>";
        let values = vars(&[("name", "Ann")]);
        assert_eq!(render(template, &values), render(template, &values));
    }

    #[test]
    fn test_render_leaves_expressions_alone() {
        let template = "{{ name|upper }} {{ name }}";
        assert_eq!(render(template, &vars(&[("name", "Ann")])), "{{ name|upper }} Ann");
    }

    #[test]
    fn test_render_does_not_reexpand_values() {
        let rendered = render("{{ a }}", &vars(&[("a", "{{ b }}"), ("b", "x")]));
        assert_eq!(rendered, "{{ b }}");
    }

    #[test]
    fn test_strip_tags() {
        let text = strip_tags("<p>Hello <b>Ann</b>,</p><br/>bye");
        assert_eq!(text, "Hello Ann,bye");
    }

    #[test]
    fn test_wrap_document_fragment() {
        let wrapped = wrap_document("<p>Hi</p>");
        assert!(wrapped.starts_with("<!DOCTYPE html>"));
        assert!(wrapped.contains("<p>Hi</p>"));
    }

    #[test]
    fn test_wrap_document_keeps_full_document() {
        let doc = "  <html><body>Hi</body></html>";
        assert_eq!(wrap_document(doc), doc);
        let doc = "<!doctype html><html></html>";
        assert_eq!(wrap_document(doc), doc);
    }

    #[test]
    fn test_rendered_content_derives_text() {
        let content = RenderedContent::render(
            "Update for {{ name }}",
            "<p>Hello {{ name }}</p>",
            &vars(&[("name", "Ann")]),
        );
        assert_eq!(content.subject, "Update for Ann");
        assert_eq!(content.html, "<p>Hello Ann</p>");
        assert_eq!(content.text, "Hello Ann");
    }
}

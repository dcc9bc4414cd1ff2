//! Helper functions exposed to notification templates

use minijinja::value::ValueKind;
use minijinja::{Environment, Error, ErrorKind, Value};
use regex::Regex;

/// Register all helpers on an environment.
///
/// | Name | Call | Result |
/// |------|------|--------|
/// | `indent` | `indent(4, text)` | every line of `text` prefixed with 4 spaces |
/// | `hasTag` | `hasTag("urgent", text)` | `true` if `urgent` appears as a whole word |
/// | `last` | `last(loop.index0, items)` | `true` on the final element of `items` |
pub fn register(env: &mut Environment<'_>) {
    env.add_function("indent", indent);
    env.add_function("hasTag", has_tag);
    env.add_function("last", last);
}

fn indent(amount: usize, text: Value) -> String {
    match text_of(&text) {
        Some(text) => indent_lines(amount, &text),
        None => String::new(),
    }
}

fn has_tag(tag: String, text: Value) -> Result<bool, Error> {
    if text.is_undefined() || text.is_none() {
        return Ok(false);
    }

    let matcher = tag_matcher(&tag)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, format!("bad tag {tag:?}: {e}")))?;
    let Some(matcher) = matcher else {
        return Ok(false);
    };

    // A list of labels matches when any of its entries does
    if text.kind() == ValueKind::Seq {
        let items = text.try_iter()?;
        return Ok(items
            .filter_map(|item| text_of(&item))
            .any(|item| matcher.is_match(&item)));
    }

    Ok(text_of(&text).is_some_and(|text| matcher.is_match(&text)))
}

fn last(index: usize, seq: Value) -> bool {
    seq.len().is_some_and(|len| index + 1 == len)
}

/// Prefix every line of `text` with `amount` spaces.
///
/// Empty input stays empty and a trailing newline does not produce a padded
/// empty line.
pub fn indent_lines(amount: usize, text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let pad = " ".repeat(amount);
    let mut out = String::with_capacity(text.len() + pad.len() * 2);
    for line in text.split_inclusive('\n') {
        out.push_str(&pad);
        out.push_str(line);
    }
    out
}

/// Check whether `tag` occurs in `text` bounded by non-word characters or
/// the string edges.
pub fn contains_tag(tag: &str, text: &str) -> Result<bool, regex::Error> {
    Ok(tag_matcher(tag)?.is_some_and(|matcher| matcher.is_match(text)))
}

fn tag_matcher(tag: &str) -> Result<Option<Regex>, regex::Error> {
    if tag.is_empty() {
        return Ok(None);
    }
    let pattern = format!(r"(?:^|\W){}(?:\W|$)", regex::escape(tag));
    Regex::new(&pattern).map(Some)
}

fn text_of(value: &Value) -> Option<String> {
    if value.is_undefined() || value.is_none() {
        return None;
    }
    match value.as_str() {
        Some(s) => Some(s.to_string()),
        None => Some(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(source: &str, ctx: serde_json::Value) -> String {
        let mut env = Environment::new();
        env.set_undefined_behavior(minijinja::UndefinedBehavior::Chainable);
        register(&mut env);
        env.render_str(source, ctx).unwrap()
    }

    #[test]
    fn test_indent_empty() {
        assert_eq!(indent_lines(4, ""), "");
    }

    #[test]
    fn test_indent_multiline() {
        assert_eq!(indent_lines(2, "a\nb"), "  a\n  b");
        assert_eq!(indent_lines(3, "single"), "   single");
    }

    #[test]
    fn test_indent_trailing_newline() {
        assert_eq!(indent_lines(2, "a\nb\n"), "  a\n  b\n");
    }

    #[test]
    fn test_has_tag_word_boundaries() {
        assert!(contains_tag("foo", "a foo b").unwrap());
        assert!(!contains_tag("foo", "afoob").unwrap());
        assert!(contains_tag("foo", "foo").unwrap());
        assert!(contains_tag("foo", "[foo]").unwrap());
        assert!(!contains_tag("foo", "foobar").unwrap());
    }

    #[test]
    fn test_has_tag_escapes_pattern() {
        assert!(contains_tag("c++", "written in c++ today").unwrap());
        assert!(!contains_tag("a.c", "abc").unwrap());
    }

    #[test]
    fn test_has_tag_empty_tag_never_matches() {
        assert!(!contains_tag("", "anything").unwrap());
    }

    #[test]
    fn test_indent_in_template() {
        let out = render(
            "{{ indent(2, text) }}",
            serde_json::json!({ "text": "one\ntwo" }),
        );
        assert_eq!(out, "  one\n  two");
    }

    #[test]
    fn test_indent_missing_value_renders_empty() {
        assert_eq!(render("[{{ indent(2, nope) }}]", serde_json::json!({})), "[]");
    }

    #[test]
    fn test_has_tag_in_template() {
        let source = "{% if hasTag('deploy', summary) %}yes{% else %}no{% endif %}";
        assert_eq!(
            render(source, serde_json::json!({ "summary": "please deploy now" })),
            "yes"
        );
        assert_eq!(
            render(source, serde_json::json!({ "summary": "redeployed" })),
            "no"
        );
        assert_eq!(render(source, serde_json::json!({})), "no");
    }

    #[test]
    fn test_has_tag_on_label_list() {
        let source = "{% if hasTag('infra', labels) %}yes{% else %}no{% endif %}";
        assert_eq!(
            render(source, serde_json::json!({ "labels": ["backend", "infra"] })),
            "yes"
        );
        assert_eq!(
            render(source, serde_json::json!({ "labels": ["infrastructure"] })),
            "no"
        );
    }

    #[test]
    fn test_last_separator() {
        let source = "{% for w in words %}{{ w }}{% if not last(loop.index0, words) %}, {% endif %}{% endfor %}";
        assert_eq!(
            render(source, serde_json::json!({ "words": ["a", "b", "c"] })),
            "a, b, c"
        );
    }
}

//! Template set loading and execution

use std::fs;
use std::path::Path;

use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;

use super::helpers;
use super::types::{TemplateError, TemplateResult};

const DESTINATION_NAME: &str = "destination";

/// Build an environment with the relay's helpers and lenient lookups.
///
/// `Chainable` makes `{{ issue.fields.summary }}` render empty when any
/// segment is missing instead of failing the render.
pub fn environment() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Chainable);
    helpers::register(&mut env);
    env
}

/// Fragments compiled together as one namespace, rendered from `entry`.
#[derive(Debug)]
pub struct TemplateSet {
    env: Environment<'static>,
    entry: String,
    names: Vec<String>,
}

impl TemplateSet {
    /// Load every file in `dir` whose name ends with `suffix`.
    ///
    /// Fragments are named after their file name, so the entry is given as
    /// e.g. `main.tpl` and other fragments are pulled in with
    /// `{% include "issue.tpl" %}`.
    pub fn load(dir: impl AsRef<Path>, entry: &str, suffix: &str) -> TemplateResult<Self> {
        let dir = dir.as_ref();
        let io_err = |source| TemplateError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut sources = Vec::new();
        for dir_entry in fs::read_dir(dir).map_err(io_err)? {
            let path = dir_entry.map_err(io_err)?.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.ends_with(suffix) {
                continue;
            }

            let name = name.to_string();
            let source = fs::read_to_string(&path).map_err(|source| TemplateError::Io {
                path: path.clone(),
                source,
            })?;
            sources.push((name, source));
        }
        sources.sort_by(|a, b| a.0.cmp(&b.0));

        Self::from_sources(sources, entry)
    }

    /// Compile fragments given as `(name, source)` pairs.
    pub fn from_sources<I, N, S>(sources: I, entry: &str) -> TemplateResult<Self>
    where
        I: IntoIterator<Item = (N, S)>,
        N: Into<String>,
        S: Into<String>,
    {
        let mut env = environment();
        let mut names = Vec::new();

        for (name, source) in sources {
            let name: String = name.into();
            env.add_template_owned(name.clone(), source.into())
                .map_err(TemplateError::Syntax)?;
            names.push(name);
        }

        if !names.iter().any(|name| name == entry) {
            return Err(TemplateError::MissingEntry(entry.to_string()));
        }

        Ok(Self {
            env,
            entry: entry.to_string(),
            names,
        })
    }

    /// Render the entry fragment against `context`.
    pub fn execute<C: Serialize>(&self, context: C) -> TemplateResult<String> {
        let template = self
            .env
            .get_template(&self.entry)
            .map_err(TemplateError::Render)?;
        template.render(context).map_err(TemplateError::Render)
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Fragment names in load order
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// A single-fragment template computing a recipient address per message.
#[derive(Debug)]
pub struct DestinationTemplate {
    env: Environment<'static>,
    source: String,
}

impl DestinationTemplate {
    /// Compile `source`; a plain address without markup is a valid template.
    pub fn parse(source: &str) -> TemplateResult<Self> {
        let mut env = environment();
        env.add_template_owned(DESTINATION_NAME, source.to_string())
            .map_err(TemplateError::Syntax)?;
        Ok(Self {
            env,
            source: source.to_string(),
        })
    }

    /// Render the address, trimming surrounding whitespace.
    pub fn render<C: Serialize>(&self, context: C) -> TemplateResult<String> {
        let template = self
            .env
            .get_template(DESTINATION_NAME)
            .map_err(TemplateError::Render)?;
        let rendered = template.render(context).map_err(TemplateError::Render)?;
        Ok(rendered.trim().to_string())
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write(dir: &Path, name: &str, source: &str) {
        fs::write(dir.join(name), source).unwrap();
    }

    #[test]
    fn test_load_directory_with_includes() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.tpl", "[{{ issue }}] {% include \"summary.tpl\" %}");
        write(dir.path(), "summary.tpl", "{{ summary }}");
        write(dir.path(), "notes.txt", "{{ broken");

        let set = TemplateSet::load(dir.path(), "main.tpl", ".tpl").unwrap();
        assert_eq!(set.names(), ["main.tpl", "summary.tpl"]);

        let out = set
            .execute(json!({ "issue": "JIRA-1", "summary": "fix bug" }))
            .unwrap();
        assert_eq!(out, "[JIRA-1] fix bug");
    }

    #[test]
    fn test_missing_entry() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "other.tpl", "x");

        let err = TemplateSet::load(dir.path(), "main.tpl", ".tpl").unwrap_err();
        assert!(matches!(err, TemplateError::MissingEntry(name) if name == "main.tpl"));
    }

    #[test]
    fn test_missing_directory() {
        let err = TemplateSet::load("/nonexistent/jibber/tpl", "main.tpl", ".tpl").unwrap_err();
        assert!(matches!(err, TemplateError::Io { .. }));
    }

    #[test]
    fn test_syntax_error() {
        let err = TemplateSet::from_sources([("main.tpl", "{% if %}")], "main.tpl").unwrap_err();
        assert!(matches!(err, TemplateError::Syntax(_)));
    }

    #[test]
    fn test_missing_keys_render_empty() {
        let set = TemplateSet::from_sources(
            [("main.tpl", "{{ summary }}|{{ issue.fields.priority.name }}|{% for c in comments %}{{ c }}{% endfor %}")],
            "main.tpl",
        )
        .unwrap();
        assert_eq!(set.execute(json!({})).unwrap(), "||");
    }

    #[test]
    fn test_missing_include_is_render_error() {
        let set = TemplateSet::from_sources([("main.tpl", "{% include \"gone.tpl\" %}")], "main.tpl")
            .unwrap();
        let err = set.execute(json!({})).unwrap_err();
        assert!(matches!(err, TemplateError::Render(_)));
    }

    #[test]
    fn test_helper_type_error_is_render_error() {
        let set = TemplateSet::from_sources([("main.tpl", "{{ indent('x', summary) }}")], "main.tpl")
            .unwrap();
        let err = set.execute(json!({ "summary": "a" })).unwrap_err();
        assert!(matches!(err, TemplateError::Render(_)));
    }

    #[test]
    fn test_trailing_newline_can_render_empty() {
        let set = TemplateSet::from_sources(
            [("main.tpl", "{% if hasTag('deploy', summary) %}{{ summary }}{% endif %}\n")],
            "main.tpl",
        )
        .unwrap();
        assert_eq!(set.execute(json!({ "summary": "fix bug" })).unwrap(), "");
    }

    #[test]
    fn test_destination_template() {
        let destination =
            DestinationTemplate::parse("{{ project | lower }}@conference.example.org\n").unwrap();
        assert_eq!(
            destination.render(json!({ "project": "OPS" })).unwrap(),
            "ops@conference.example.org"
        );
    }

    #[test]
    fn test_static_destination() {
        let destination = DestinationTemplate::parse("ops@example.org").unwrap();
        assert_eq!(destination.render(json!({})).unwrap(), "ops@example.org");
        assert_eq!(destination.source(), "ops@example.org");
    }
}

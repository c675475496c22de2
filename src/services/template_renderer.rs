//! Tera renderer for the generated configuration files.
//! Templates use Jinja2 syntax; values that land in YAML go through `yaml_quote`.
use serde::Serialize;
use std::collections::HashMap;
use std::error::Error as _;
use std::path::Path;
use tera::{Context, Tera, Value};
use thiserror::Error;

use super::embedded_templates;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to render {name}: {cause}")]
    Template { name: String, cause: String },

    #[error("failed to load template {name}: {cause}")]
    Load { name: String, cause: String },
}

/// Tera errors keep the useful part (the missing variable, the bad line) in their source chain.
fn describe(err: &tera::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

/// Encodes any value as a double-quoted scalar. JSON string syntax is valid YAML,
/// so quotes, colons, `#` and newlines in operator input cannot change document structure.
pub fn yaml_quote(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    };
    serde_json::to_string(&text)
        .map(Value::String)
        .map_err(|e| tera::Error::msg(format!("yaml_quote: {e}")))
}

#[derive(Clone)]
pub struct TemplateRenderer {
    tera: Tera,
}

impl TemplateRenderer {
    /// Templates compiled into the binary.
    pub fn from_embedded() -> Result<Self, RenderError> {
        let mut tera = Tera::default();
        for (name, content) in embedded_templates::ALL_TEMPLATES {
            tera.add_raw_template(name, content).map_err(|e| RenderError::Load {
                name: name.to_string(),
                cause: describe(&e),
            })?;
        }
        tera.register_filter("yaml_quote", yaml_quote);
        tracing::debug!(
            "Loaded {} embedded templates",
            embedded_templates::ALL_TEMPLATES.len()
        );
        Ok(Self { tera })
    }

    /// Embedded templates, with any same-named file in `dir` taking precedence.
    pub fn with_overrides(dir: &Path) -> Result<Self, RenderError> {
        let mut renderer = Self::from_embedded()?;
        for (name, _) in embedded_templates::ALL_TEMPLATES {
            let path = dir.join(name);
            let content = match std::fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(RenderError::Load {
                        name: name.to_string(),
                        cause: e.to_string(),
                    })
                }
            };
            renderer
                .tera
                .add_raw_template(name, &content)
                .map_err(|e| RenderError::Load {
                    name: name.to_string(),
                    cause: describe(&e),
                })?;
            tracing::info!("Template {} overridden from {}", name, path.display());
        }
        Ok(renderer)
    }

    /// Renders `name` with the fields of `data`. Undefined variables are an error.
    pub fn render<T: Serialize>(&self, name: &str, data: &T) -> Result<String, RenderError> {
        let context = Context::from_serialize(data).map_err(|e| RenderError::Template {
            name: name.to_string(),
            cause: describe(&e),
        })?;
        let rendered = self.tera.render(name, &context).map_err(|e| RenderError::Template {
            name: name.to_string(),
            cause: describe(&e),
        })?;
        tracing::debug!("Rendered template {} ({} bytes)", name, rendered.len());
        Ok(rendered)
    }

    #[cfg(test)]
    pub fn list_templates(&self) -> Vec<String> {
        self.tera.get_template_names().map(String::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn yaml_quote_neutralises_structure() {
        let quoted = yaml_quote(&json!("a: b\n# c \"d\""), &HashMap::new()).unwrap();
        assert_eq!(quoted, json!("\"a: b\\n# c \\\"d\\\"\""));
        assert_eq!(yaml_quote(&Value::Null, &HashMap::new()).unwrap(), json!("\"\""));
        assert_eq!(yaml_quote(&json!(3), &HashMap::new()).unwrap(), json!("\"3\""));
    }

    #[test]
    fn all_embedded_templates_are_registered() {
        let renderer = TemplateRenderer::from_embedded().unwrap();
        let mut names = renderer.list_templates();
        names.sort();
        assert_eq!(names.len(), embedded_templates::ALL_TEMPLATES.len());
        assert!(names.contains(&"haproxy.cfg.j2".to_string()));
    }

    #[test]
    fn undefined_variable_is_a_render_error() {
        let renderer = TemplateRenderer::from_embedded().unwrap();
        let err = renderer
            .render("chrony.conf.j2", &json!({ "unrelated": 1 }))
            .unwrap_err();
        assert!(err.to_string().starts_with("failed to render chrony.conf.j2"));
    }

    #[test]
    fn renders_chrony_allow_line() {
        let renderer = TemplateRenderer::from_embedded().unwrap();
        let text = renderer
            .render("chrony.conf.j2", &json!({ "machine_network_cidr": "192.168.10.0/24" }))
            .unwrap();
        assert!(text.contains("allow 192.168.10.0/24"));
    }

    #[test]
    fn override_directory_replaces_named_template() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("chrony.conf.j2"), "server {{ machine_network_cidr }}").unwrap();
        let renderer = TemplateRenderer::with_overrides(dir.path()).unwrap();
        let text = renderer
            .render("chrony.conf.j2", &json!({ "machine_network_cidr": "x" }))
            .unwrap();
        assert_eq!(text, "server x");
    }
}

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{ErrorCode, Result, ScaffoldError};

/// Expression evaluation over template text. Implementations must be
/// deterministic for a fixed data map and side-effect-free; binary content
/// never reaches the evaluator.
pub trait TemplateEvaluator {
    fn render(&self, template: &str, data: &BTreeMap<String, Value>) -> Result<String>;
}

/// The default evaluator: Tera with a one-off template per render call.
#[derive(Debug, Default, Clone, Copy)]
pub struct TeraEvaluator;

impl TemplateEvaluator for TeraEvaluator {
    fn render(&self, template: &str, data: &BTreeMap<String, Value>) -> Result<String> {
        // Fast path: nothing to expand.
        if !template.contains("{{") && !template.contains("{%") {
            return Ok(template.to_owned());
        }

        let mut tera = tera::Tera::default();
        tera.add_raw_template("template", template).map_err(|e| {
            ScaffoldError::new(
                ErrorCode::InternalError,
                format!("failed to parse template: {e}"),
            )
            .with_hint("check the template expression syntax in the pack")
            .with_source(e)
        })?;

        let mut context = tera::Context::new();
        for (key, value) in data {
            context.insert(key, value);
        }

        tera.render("template", &context).map_err(|e| {
            ScaffoldError::new(
                ErrorCode::InternalError,
                format!("failed to render template: {e}"),
            )
            .with_hint("check that all referenced inputs are declared")
            .with_source(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    #[test]
    fn renders_variables() {
        let out = TeraEvaluator
            .render("hello {{ name }}", &data(&[("name", json!("world"))]))
            .unwrap();
        assert_eq!(out, "hello world");
    }

    #[test]
    fn plain_text_passes_through() {
        let out = TeraEvaluator.render("no expressions", &BTreeMap::new()).unwrap();
        assert_eq!(out, "no expressions");
    }

    #[test]
    fn conditionals_see_booleans() {
        let out = TeraEvaluator
            .render(
                "{% if useDb %}db{% else %}nodb{% endif %}",
                &data(&[("useDb", json!(true))]),
            )
            .unwrap();
        assert_eq!(out, "db");
    }

    #[test]
    fn undeclared_variable_fails() {
        let err = TeraEvaluator
            .render("{{ missing }}", &BTreeMap::new())
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InternalError);
    }

    #[test]
    fn render_is_deterministic() {
        let d = data(&[("a", json!(1)), ("b", json!("x"))]);
        let first = TeraEvaluator.render("{{ a }}-{{ b }}", &d).unwrap();
        let second = TeraEvaluator.render("{{ a }}-{{ b }}", &d).unwrap();
        assert_eq!(first, second);
    }
}

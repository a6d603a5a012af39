//! Template engine based on MiniJinja
//!
//! Assets are decoded before substitution. Only string leaves that contain
//! template syntax are rendered, so the typed structure of the object (and
//! the integer/float identity of its numbers) is never re-parsed.

use minijinja::Environment;
use serde::Serialize;
use serde_json::Value as JsonValue;
use syncpod_core::{Configuration, Object};

use crate::error::{Result, TemplateError};
use crate::filters;

/// Values exposed to templates
///
/// - `config`: identity provider and cluster settings (camelCase keys)
/// - `values`: free-form templating data
/// - `platform`: the configured platform
#[derive(Debug, Clone, Serialize)]
pub struct TemplateContext {
    pub config: JsonValue,
    pub values: JsonValue,
    pub platform: String,
}

impl TemplateContext {
    pub fn from_config(config: &Configuration) -> Result<Self> {
        Ok(Self {
            config: serde_json::to_value(&config.config)?,
            values: config.values.clone(),
            platform: config.platform.clone(),
        })
    }
}

/// Template engine builder
pub struct EngineBuilder {
    strict_mode: bool,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self { strict_mode: true }
    }

    /// Set strict mode (fail on undefined variables)
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict_mode = strict;
        self
    }

    /// Build the engine
    pub fn build(self) -> Engine {
        Engine::new(self.strict_mode)
    }
}

/// The template engine
pub struct Engine {
    env: Environment<'static>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Engine {
    /// Create a new engine
    pub fn new(strict_mode: bool) -> Self {
        Self {
            env: create_environment(strict_mode),
        }
    }

    /// Create a builder
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Render a single template string
    pub fn render_string(
        &self,
        template: &str,
        context: &TemplateContext,
        template_name: &str,
    ) -> Result<String> {
        let ctx = minijinja::Value::from_serialize(context);
        self.env
            .render_named_str(template_name, template, ctx)
            .map_err(|e| TemplateError::from_minijinja(&e, template_name, "").into())
    }

    /// Substitute every templated string leaf of an object in place
    pub fn render_object(
        &self,
        object: &mut Object,
        context: &TemplateContext,
        asset: &str,
    ) -> Result<()> {
        let ctx = minijinja::Value::from_serialize(context);
        let mut path = String::new();
        self.render_value(object.as_value_mut(), &ctx, asset, &mut path)
    }

    fn render_value(
        &self,
        value: &mut JsonValue,
        ctx: &minijinja::Value,
        asset: &str,
        path: &mut String,
    ) -> Result<()> {
        match value {
            JsonValue::String(s) if contains_template_syntax(s) => {
                let rendered = self
                    .env
                    .render_named_str(asset, s, ctx.clone())
                    .map_err(|e| TemplateError::from_minijinja(&e, asset, path))?;
                *s = rendered;
            }
            JsonValue::Object(map) => {
                for (key, child) in map.iter_mut() {
                    let len = path.len();
                    if !path.is_empty() {
                        path.push('.');
                    }
                    path.push_str(key);
                    self.render_value(child, ctx, asset, path)?;
                    path.truncate(len);
                }
            }
            JsonValue::Array(items) => {
                for (index, child) in items.iter_mut().enumerate() {
                    let len = path.len();
                    path.push_str(&format!("[{}]", index));
                    self.render_value(child, ctx, asset, path)?;
                    path.truncate(len);
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Create a configured MiniJinja environment
fn create_environment(strict_mode: bool) -> Environment<'static> {
    let mut env = Environment::new();

    if strict_mode {
        env.set_undefined_behavior(minijinja::UndefinedBehavior::Strict);
    } else {
        env.set_undefined_behavior(minijinja::UndefinedBehavior::Lenient);
    }
    // Rendered strings are field values, not HTML
    env.set_auto_escape_callback(|_| minijinja::AutoEscape::None);
    env.set_keep_trailing_newline(true);

    env.add_filter("toyaml", filters::toyaml);
    env.add_filter("tojson", filters::tojson);
    env.add_filter("b64encode", filters::b64encode);
    env.add_filter("b64decode", filters::b64decode);
    env.add_filter("quote", filters::quote);
    env.add_filter("required", filters::required);
    env.add_filter("sha256", filters::sha256sum);
    env.add_filter("trimprefix", filters::trimprefix);
    env.add_filter("trimsuffix", filters::trimsuffix);

    env
}

/// Check if a string contains Jinja syntax
pub fn contains_template_syntax(s: &str) -> bool {
    s.contains("{{") || s.contains("{%")
}

//! Text rendering for replies, webhooks and data loaders
//!
//! All variants read from the same [`TemplateContext`]: the conversation
//! state, resolved secrets, data loader output and event attributes, under
//! the `state.`, `secret.`, `data.` and event namespaces.

use crate::definition::TemplateStyle;
use crate::dispatcher::EventScope;
use crate::event::Event;
use crate::secrets::Secrets;
use crate::state::State;
use handlebars::Handlebars;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unclosed ${{ at byte {0}")]
    Unclosed(usize),
    #[error("compile template: {0}")]
    Compile(String),
    #[error("render template: {0}")]
    Render(String),
}

/// Read-only view handed to templates
pub struct TemplateContext<'a> {
    state: Option<&'a State>,
    secrets: &'a Secrets,
    data: &'a Value,
    attributes: BTreeMap<String, String>,
}

impl<'a> TemplateContext<'a> {
    pub fn new(event: &Event, scope: &'a EventScope) -> Self {
        Self {
            state: scope.state(),
            secrets: scope.secrets(),
            data: scope.data(),
            attributes: event.attributes(),
        }
    }

    /// Resolve one namespaced key
    pub fn lookup(&self, key: &str) -> Option<String> {
        if let Some(name) = key.strip_prefix("state.") {
            return self.state?.get(name).map(str::to_string);
        }
        if let Some(name) = key.strip_prefix("secret.") {
            return self.secrets.get(name).map(|s| s.expose().to_string());
        }
        if let Some(path) = key.strip_prefix("data.") {
            return path
                .split('.')
                .try_fold(self.data, |value, segment| match value {
                    Value::Object(map) => map.get(segment),
                    Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                    _ => None,
                })
                .map(scalar);
        }
        self.attributes.get(key).cloned()
    }

    /// Nested JSON document for full templating engines
    pub fn to_json(&self) -> Value {
        let mut root = Map::new();
        for (key, value) in &self.attributes {
            insert_path(&mut root, key, Value::String(value.clone()));
        }
        let state: Map<String, Value> = self
            .state
            .map(State::map)
            .unwrap_or_default()
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        root.insert("state".to_string(), Value::Object(state));
        let secrets: Map<String, Value> = self
            .secrets
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.expose().to_string())))
            .collect();
        root.insert("secret".to_string(), Value::Object(secrets));
        root.insert("data".to_string(), self.data.clone());
        Value::Object(root)
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn insert_path(root: &mut Map<String, Value>, key: &str, value: Value) {
    let mut parts = key.split('.').peekable();
    let mut node = root;
    while let Some(part) = parts.next() {
        if parts.peek().is_none() {
            node.insert(part.to_string(), value);
            return;
        }
        let entry = node
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(next) = entry else {
            return;
        };
        node = next;
    }
}

pub trait Template: Send + Sync {
    fn format(&self, ctx: &TemplateContext<'_>) -> Result<String, TemplateError>;
}

/// Build the template for `text` in the given style
pub fn compile(style: TemplateStyle, text: &str) -> Result<Arc<dyn Template>, TemplateError> {
    Ok(match style {
        TemplateStyle::Default => Arc::new(Interpolated::parse(text)?),
        TemplateStyle::Handlebars => Arc::new(HandlebarsTemplate::new(text)?),
        TemplateStyle::Plain => Arc::new(Plain(text.to_string())),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Key(String),
}

/// `$key` and `${key}` substitution; unknown keys expand to nothing
#[derive(Debug, Clone)]
pub struct Interpolated {
    segments: Vec<Segment>,
}

impl Interpolated {
    pub fn parse(text: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = text;

        while let Some((before, after)) = rest.split_once('$') {
            literal.push_str(before);
            let key;
            if let Some(body) = after.strip_prefix('{') {
                let position = text.len() - after.len() - 1;
                let (name, tail) = body
                    .split_once('}')
                    .ok_or(TemplateError::Unclosed(position))?;
                key = name.trim();
                rest = tail;
            } else {
                let (name, tail) = after.split_at(name_len(after));
                key = name;
                rest = tail;
            }
            if key.is_empty() {
                literal.push('$');
                continue;
            }
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Key(key.to_string()));
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self { segments })
    }
}

/// Length of a bare key: a letter or underscore followed by ASCII word
/// characters and dots, without trailing dots
fn name_len(s: &str) -> usize {
    if !s.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        return 0;
    }
    let len = s
        .bytes()
        .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_' || *b == b'.')
        .count();
    let trailing_dots = s.bytes().take(len).rev().take_while(|b| *b == b'.').count();
    len - trailing_dots
}

impl Template for Interpolated {
    fn format(&self, ctx: &TemplateContext<'_>) -> Result<String, TemplateError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Key(key) => out.push_str(&ctx.lookup(key).unwrap_or_default()),
            }
        }
        Ok(out)
    }
}

const TEMPLATE_NAME: &str = "template";

/// Full templating language over [`TemplateContext::to_json`]
pub struct HandlebarsTemplate {
    registry: Handlebars<'static>,
}

impl HandlebarsTemplate {
    pub fn new(text: &str) -> Result<Self, TemplateError> {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        registry
            .register_template_string(TEMPLATE_NAME, text)
            .map_err(|e| TemplateError::Compile(e.to_string()))?;
        Ok(Self { registry })
    }
}

impl Template for HandlebarsTemplate {
    fn format(&self, ctx: &TemplateContext<'_>) -> Result<String, TemplateError> {
        self.registry
            .render(TEMPLATE_NAME, &ctx.to_json())
            .map_err(|e| TemplateError::Render(e.to_string()))
    }
}

/// Literal text
#[derive(Debug, Clone)]
pub struct Plain(pub String);

impl Template for Plain {
    fn format(&self, _ctx: &TemplateContext<'_>) -> Result<String, TemplateError> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ChatId, User};
    use crate::secrets::Secret;

    fn scope() -> EventScope {
        let secrets: Secrets = [("token".to_string(), Secret::new("s3cret"))]
            .into_iter()
            .collect();
        let mut state = State::new();
        state.fill([("name", "Ada"), ("score", "7")]);
        let mut scope = EventScope::new(ChatId(5), Arc::new(secrets)).with_state(state);
        scope.set_data(serde_json::json!({
            "price": 12,
            "item": { "title": "Tea" },
            "tags": ["hot", "green"]
        }));
        scope
    }

    fn event() -> Event {
        Event::message(5, 10, "hello").with_sender(User {
            id: 1,
            first_name: "Grace".into(),
            ..User::default()
        })
    }

    fn render(style: TemplateStyle, text: &str) -> String {
        let scope = scope();
        let event = event();
        let ctx = TemplateContext::new(&event, &scope);
        compile(style, text).unwrap().format(&ctx).unwrap()
    }

    #[test]
    fn test_lookup_namespaces() {
        let scope = scope();
        let event = event();
        let ctx = TemplateContext::new(&event, &scope);
        assert_eq!(ctx.lookup("state.name").as_deref(), Some("Ada"));
        assert_eq!(ctx.lookup("secret.token").as_deref(), Some("s3cret"));
        assert_eq!(ctx.lookup("data.price").as_deref(), Some("12"));
        assert_eq!(ctx.lookup("data.item.title").as_deref(), Some("Tea"));
        assert_eq!(ctx.lookup("data.tags.1").as_deref(), Some("green"));
        assert_eq!(ctx.lookup("message.text").as_deref(), Some("hello"));
        assert_eq!(ctx.lookup("chat.id").as_deref(), Some("5"));
        assert_eq!(ctx.lookup("user.first_name").as_deref(), Some("Grace"));
        assert_eq!(ctx.lookup("state.missing"), None);
    }

    #[test]
    fn test_default_interpolation() {
        assert_eq!(
            render(TemplateStyle::Default, "Hi ${state.name}, score $state.score."),
            "Hi Ada, score 7."
        );
        assert_eq!(render(TemplateStyle::Default, "cost: $5 $"), "cost: $5 $");
        assert_eq!(render(TemplateStyle::Default, "[${state.nope}]"), "[]");
        assert_eq!(render(TemplateStyle::Default, "${ data.item.title }"), "Tea");
    }

    #[test]
    fn test_unclosed_brace_fails_at_compile() {
        assert_eq!(
            Interpolated::parse("ab ${state.x").unwrap_err(),
            TemplateError::Unclosed(3)
        );
    }

    #[test]
    fn test_handlebars() {
        assert_eq!(
            render(
                TemplateStyle::Handlebars,
                "{{user.first_name}} buys {{data.item.title}}{{#if state.score}} ({{state.score}}){{/if}} <b>"
            ),
            "Grace buys Tea (7) <b>"
        );
        assert!(matches!(
            compile(TemplateStyle::Handlebars, "{{#if state.score}} open"),
            Err(TemplateError::Compile(_))
        ));
    }

    #[test]
    fn test_plain_passthrough() {
        assert_eq!(render(TemplateStyle::Plain, "${state.name}"), "${state.name}");
    }
}

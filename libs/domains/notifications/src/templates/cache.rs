//! Compiled template cache.
//!
//! Two handlebars registries share the same helpers and partials: HTML bodies
//! render with HTML escaping, subjects and plain-text bodies without.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use handlebars::template::{HelperTemplate, Parameter, TemplateElement};
use handlebars::{Handlebars, no_escape};
use serde_json::Value;

use super::helpers::{is_known_helper, register_helpers};
use crate::error::{NotificationError, NotificationResult};
use crate::models::{RenderedEmail, Template};

/// When compiled templates leave the cache (besides explicit invalidation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    #[default]
    NeverEvict,
    /// Keep at most `n` templates, evicting the least recently rendered.
    MaxEntries(usize),
}

/// Parsed form of a stored template.
pub struct CompiledTemplate {
    name: String,
    subject: handlebars::Template,
    html: handlebars::Template,
    text: Option<handlebars::Template>,
}

impl CompiledTemplate {
    /// Parse all parts of a stored template. Syntax errors and calls to
    /// helpers that are not registered both fail here, before any render.
    pub fn compile(template: &Template) -> NotificationResult<Self> {
        let parse = |source: &str| parse_checked(&template.name, source);

        Ok(Self {
            name: template.name.clone(),
            subject: parse(&template.subject)?,
            html: parse(&template.html)?,
            text: template.text.as_deref().map(parse).transpose()?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

struct Entry {
    has_text: bool,
    last_used: AtomicU64,
}

struct CacheState {
    html: Handlebars<'static>,
    plain: Handlebars<'static>,
    entries: HashMap<String, Entry>,
}

impl CacheState {
    fn unregister(&mut self, name: &str) {
        self.html.unregister_template(name);
        self.plain.unregister_template(&subject_key(name));
        self.plain.unregister_template(&text_key(name));
    }

    fn render(&self, name: &str, entry: &Entry, context: &Value) -> NotificationResult<RenderedEmail> {
        let render_error = |e: handlebars::RenderError| NotificationError::TemplateRender {
            name: name.to_string(),
            message: e.to_string(),
        };

        let subject = self.plain.render(&subject_key(name), context).map_err(render_error)?;
        let html = self.html.render(name, context).map_err(render_error)?;
        let text = if entry.has_text {
            Some(self.plain.render(&text_key(name), context).map_err(render_error)?)
        } else {
            None
        };

        Ok(RenderedEmail {
            subject: subject.trim().to_string(),
            html,
            text,
        })
    }
}

fn parse_checked(name: &str, source: &str) -> NotificationResult<handlebars::Template> {
    let compile_error = |message: String| NotificationError::TemplateCompile {
        name: name.to_string(),
        message,
    };

    let parsed = handlebars::Template::compile(source).map_err(|e| compile_error(e.to_string()))?;
    match unknown_helper(&parsed.elements) {
        Some(helper) => Err(compile_error(format!("unknown helper '{}'", helper))),
        None => Ok(parsed),
    }
}

/// First helper call in `elements` (blocks and subexpressions included) whose
/// name is not registered.
fn unknown_helper(elements: &[TemplateElement]) -> Option<String> {
    elements.iter().find_map(|element| match element {
        TemplateElement::Expression(helper)
        | TemplateElement::HtmlExpression(helper)
        | TemplateElement::HelperBlock(helper) => unknown_in_helper(helper),
        TemplateElement::PartialBlock(block) | TemplateElement::DecoratorBlock(block) => block
            .template
            .as_ref()
            .and_then(|inner| unknown_helper(&inner.elements)),
        _ => None,
    })
}

fn unknown_in_helper(helper: &HelperTemplate) -> Option<String> {
    // A bare `{{name}}` is a variable lookup, not a helper call
    let is_call = helper.block || !helper.params.is_empty() || !helper.hash.is_empty();
    if is_call {
        if let Some(name) = helper.name.as_name() {
            if !is_known_helper(name) {
                return Some(name.to_string());
            }
        }
    }

    helper
        .params
        .iter()
        .chain(helper.hash.values())
        .find_map(|param| match param {
            Parameter::Subexpression(sub) => unknown_helper(std::slice::from_ref(sub.as_element())),
            _ => None,
        })
        .or_else(|| helper.template.as_ref().and_then(|t| unknown_helper(&t.elements)))
        .or_else(|| helper.inverse.as_ref().and_then(|t| unknown_helper(&t.elements)))
}

fn subject_key(name: &str) -> String {
    format!("{}#subject", name)
}

fn text_key(name: &str) -> String {
    format!("{}#text", name)
}

fn build_registry(partials: &[(String, String)], escape: bool) -> NotificationResult<Handlebars<'static>> {
    let mut registry = Handlebars::new();
    if !escape {
        registry.register_escape_fn(no_escape);
    }
    register_helpers(&mut registry);

    for (name, source) in partials {
        parse_checked(&format!("partials/{}", name), source)?;
        registry
            .register_partial(name, source)
            .map_err(|e| NotificationError::TemplateCompile {
                name: format!("partials/{}", name),
                message: e.to_string(),
            })?;
    }
    Ok(registry)
}

/// Name-keyed cache of compiled templates, shared by all renders.
pub struct TemplateCache {
    state: RwLock<CacheState>,
    policy: EvictionPolicy,
    tick: AtomicU64,
}

impl TemplateCache {
    pub fn new(policy: EvictionPolicy, partials: &[(String, String)]) -> NotificationResult<Self> {
        Ok(Self {
            state: RwLock::new(CacheState {
                html: build_registry(partials, true)?,
                plain: build_registry(partials, false)?,
                entries: HashMap::new(),
            }),
            policy,
            tick: AtomicU64::new(0),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, CacheState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::Relaxed)
    }

    /// Render a cached template. `None` on a cache miss.
    pub fn render(&self, name: &str, context: &Value) -> Option<NotificationResult<RenderedEmail>> {
        let state = self.read();
        let entry = state.entries.get(name)?;
        entry.last_used.store(self.next_tick(), Ordering::Relaxed);
        Some(state.render(name, entry, context))
    }

    /// Insert (or replace) a compiled template and render it in one step.
    pub fn insert_and_render(
        &self,
        compiled: CompiledTemplate,
        context: &Value,
    ) -> NotificationResult<RenderedEmail> {
        let mut state = self.write();
        let CompiledTemplate {
            name,
            subject,
            html,
            text,
        } = compiled;

        state.unregister(&name);
        state.plain.register_template(&subject_key(&name), subject);
        state.html.register_template(&name, html);
        let has_text = text.is_some();
        if let Some(text) = text {
            state.plain.register_template(&text_key(&name), text);
        }
        state.entries.insert(
            name.clone(),
            Entry {
                has_text,
                last_used: AtomicU64::new(self.next_tick()),
            },
        );

        if let EvictionPolicy::MaxEntries(max) = self.policy {
            while state.entries.len() > max.max(1) {
                let Some(oldest) = state
                    .entries
                    .iter()
                    .filter(|(key, _)| **key != name)
                    .min_by_key(|(_, entry)| entry.last_used.load(Ordering::Relaxed))
                    .map(|(key, _)| key.clone())
                else {
                    break;
                };
                state.entries.remove(&oldest);
                state.unregister(&oldest);
                tracing::debug!(template = %oldest, "Evicted compiled template");
            }
        }

        let entry = state
            .entries
            .get(&name)
            .ok_or_else(|| NotificationError::TemplateNotFound(name.clone()))?;
        state.render(&name, entry, context)
    }

    /// Drop one compiled template; the next render recompiles from the store.
    pub fn invalidate(&self, name: &str) -> bool {
        let mut state = self.write();
        let removed = state.entries.remove(name).is_some();
        if removed {
            state.unregister(name);
        }
        removed
    }

    pub fn invalidate_all(&self) {
        let mut state = self.write();
        let names: Vec<String> = state.entries.keys().cloned().collect();
        for name in &names {
            state.unregister(name);
        }
        state.entries.clear();
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn template(name: &str, subject: &str, html: &str, text: Option<&str>) -> Template {
        Template {
            name: name.to_string(),
            subject: subject.to_string(),
            html: html.to_string(),
            text: text.map(str::to_string),
            updated_at: Utc::now(),
        }
    }

    fn cache(policy: EvictionPolicy) -> TemplateCache {
        let partials = vec![(
            "layout".to_string(),
            "<main>{{> @partial-block}}</main>".to_string(),
        )];
        TemplateCache::new(policy, &partials).unwrap()
    }

    #[test]
    fn test_escaping_differs_between_html_and_plain() {
        let cache = cache(EvictionPolicy::NeverEvict);
        let compiled = CompiledTemplate::compile(&template(
            "note",
            "Re: {{topic}}",
            "<p>{{topic}}</p>",
            Some("Topic: {{topic}}"),
        ))
        .unwrap();

        let rendered = cache
            .insert_and_render(compiled, &json!({ "topic": "Tom & Jerry" }))
            .unwrap();
        assert_eq!(rendered.subject, "Re: Tom & Jerry");
        assert_eq!(rendered.html, "<p>Tom &amp; Jerry</p>");
        assert_eq!(rendered.text.as_deref(), Some("Topic: Tom & Jerry"));
    }

    #[test]
    fn test_layout_partial_block() {
        let cache = cache(EvictionPolicy::NeverEvict);
        let compiled = CompiledTemplate::compile(&template(
            "wrapped",
            "Hi",
            "{{#> layout}}<p>{{name}}</p>{{/layout}}",
            None,
        ))
        .unwrap();

        let rendered = cache.insert_and_render(compiled, &json!({ "name": "Ada" })).unwrap();
        assert_eq!(rendered.html, "<main><p>Ada</p></main>");
        assert_eq!(rendered.text, None);
    }

    #[test]
    fn test_hit_miss_and_invalidate() {
        let cache = cache(EvictionPolicy::NeverEvict);
        assert!(cache.render("welcome", &json!({})).is_none());

        let compiled =
            CompiledTemplate::compile(&template("welcome", "Hello {{name}}", "<p/>", None)).unwrap();
        cache.insert_and_render(compiled, &json!({ "name": "a" })).unwrap();

        let hit = cache.render("welcome", &json!({ "name": "b" })).unwrap().unwrap();
        assert_eq!(hit.subject, "Hello b");
        assert!(cache.contains("welcome"));

        assert!(cache.invalidate("welcome"));
        assert!(!cache.invalidate("welcome"));
        assert!(cache.render("welcome", &json!({})).is_none());
    }

    #[test]
    fn test_max_entries_evicts_least_recently_used() {
        let cache = cache(EvictionPolicy::MaxEntries(2));
        for name in ["a", "b"] {
            let compiled = CompiledTemplate::compile(&template(name, name, "<p/>", None)).unwrap();
            cache.insert_and_render(compiled, &json!({})).unwrap();
        }

        // Touch "a" so "b" becomes the eviction candidate
        cache.render("a", &json!({})).unwrap().unwrap();

        let compiled = CompiledTemplate::compile(&template("c", "c", "<p/>", None)).unwrap();
        cache.insert_and_render(compiled, &json!({})).unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
    }

    #[test]
    fn test_malformed_template_fails_to_compile() {
        let err = CompiledTemplate::compile(&template("broken", "Hi", "{{#if x}}a{{/each}}", None))
            .err()
            .unwrap();
        assert!(matches!(err, NotificationError::TemplateCompile { ref name, .. } if name == "broken"));
    }

    #[test]
    fn test_unknown_helper_fails_to_compile() {
        for html in [
            "{{shout name}}",
            "{{#if ok}}{{shout name}}{{/if}}",
            "{{#if ok}}x{{else}}{{{shout name}}}{{/if}}",
            "{{#if (shout name)}}x{{/if}}",
            "{{#repeat 2}}x{{/repeat}}",
        ] {
            let err = CompiledTemplate::compile(&template("odd", "Hi", html, None))
                .err()
                .unwrap();
            assert!(
                matches!(&err, NotificationError::TemplateCompile { name, message } if name == "odd" && message.contains("unknown helper")),
                "{html}: {err:?}"
            );
        }

        let err = CompiledTemplate::compile(&template("odd", "{{loud title}}", "<p/>", None))
            .err()
            .unwrap();
        assert!(matches!(err, NotificationError::TemplateCompile { .. }));
    }

    #[test]
    fn test_registered_helpers_and_variables_compile() {
        let html = "{{#if (gt daysOverdue 0)}}{{formatCurrency amount}}{{else}}{{name}}{{/if}}{{{body}}}";
        assert!(CompiledTemplate::compile(&template("ok", "{{capitalize name}}", html, None)).is_ok());
    }

    #[test]
    fn test_render_time_failure_is_a_render_error() {
        let cache = cache(EvictionPolicy::NeverEvict);
        let compiled =
            CompiledTemplate::compile(&template("missing-partial", "Hi", "{{> nowhere}}", None)).unwrap();

        let err = cache.insert_and_render(compiled, &json!({})).unwrap_err();
        assert!(matches!(err, NotificationError::TemplateRender { .. }));
    }

    #[test]
    fn test_invalidate_all() {
        let cache = cache(EvictionPolicy::NeverEvict);
        for name in ["a", "b", "c"] {
            let compiled = CompiledTemplate::compile(&template(name, name, "<p/>", None)).unwrap();
            cache.insert_and_render(compiled, &json!({})).unwrap();
        }
        cache.invalidate_all();
        assert!(cache.is_empty());
    }
}

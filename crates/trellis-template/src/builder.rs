/*
 * builder.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Render context assembly.
//!
//! The context visible to a top-level render is layered, outermost first:
//!
//! 1. process-wide values: `app`, `config` (the site configuration document)
//! 2. per-request values: `user`, `url`, `i18n`, `language`, `theme`,
//!    `timezone`
//! 3. caller-supplied data, deep-merged on top
//!
//! Layers 1 and 2 are filtered for the caller's auth state before layer 3
//! is merged, so caller data is never filtered away.

use std::collections::HashMap;
use std::path::Path;

use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::ConfigSnapshot;
use crate::value::{TemplateValue, ValueMap};

static LANGUAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9-]{1,16}$").unwrap());
static THEME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").unwrap());

/// The authenticated user, as supplied by the session layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserInfo {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub email: Option<String>,
    pub roles: Vec<String>,
}

/// URL of the request being rendered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UrlFacts {
    pub path: String,
    pub query: String,
    pub host: String,
    pub protocol: String,
}

impl UrlFacts {
    pub fn href(&self) -> String {
        let mut href = format!("{}://{}{}", self.protocol, self.host, self.path);
        if !self.query.is_empty() {
            href.push('?');
            href.push_str(&self.query);
        }
        href
    }
}

/// Everything request-specific the context builder needs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestFacts {
    pub user: Option<UserInfo>,
    pub url: UrlFacts,
    /// Requested language tag (`de`, `pt-BR`).
    pub language: Option<String>,
    pub theme: Option<String>,
    /// Requested IANA timezone (the browser's).
    pub timezone: Option<String>,
}

impl RequestFacts {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

/// Source of localized message bundles.
pub trait Localizer: Send + Sync {
    /// The message bundle for `language`, if there is one.
    fn messages(&self, language: &str) -> Option<TemplateValue>;
}

/// Localizer without any bundles.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLocalizer;

impl Localizer for NoLocalizer {
    fn messages(&self, _language: &str) -> Option<TemplateValue> {
        None
    }
}

/// Bundles loaded once from `<lang>.json` files.
#[derive(Debug, Clone, Default)]
pub struct StaticLocalizer {
    bundles: HashMap<String, TemplateValue>,
}

impl StaticLocalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, language: impl Into<String>, messages: TemplateValue) -> &mut Self {
        self.bundles.insert(language.into(), messages);
        self
    }

    /// Load every `*.json` file of `dir`; the file stem is the language.
    ///
    /// Unparseable bundles are skipped with a warning.
    pub fn load_dir(dir: &Path) -> std::io::Result<Self> {
        let mut localizer = Self::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(language) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let content = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<serde_json::Value>(&content) {
                Ok(messages) => {
                    localizer.insert(language, messages.into());
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping invalid locale bundle");
                }
            }
        }
        tracing::debug!(languages = localizer.bundles.len(), "locale bundles loaded");
        Ok(localizer)
    }

    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.bundles.keys().map(String::as_str)
    }
}

impl Localizer for StaticLocalizer {
    fn messages(&self, language: &str) -> Option<TemplateValue> {
        self.bundles.get(language).cloned()
    }
}

/// Builds the framework part of a render context.
pub struct ContextBuilder<'a> {
    snapshot: &'a ConfigSnapshot,
    localizer: &'a dyn Localizer,
}

impl<'a> ContextBuilder<'a> {
    pub fn new(snapshot: &'a ConfigSnapshot, localizer: &'a dyn Localizer) -> Self {
        Self {
            snapshot,
            localizer,
        }
    }

    /// Assemble the unfiltered framework context for a request.
    pub fn build(&self, facts: &RequestFacts) -> TemplateValue {
        let settings = &self.snapshot.config().template;
        let app = &self.snapshot.config().app;

        let (language, messages) = self.resolve_language(facts.language.as_deref());
        let theme = facts
            .theme
            .as_deref()
            .filter(|t| THEME.is_match(t))
            .unwrap_or(settings.default_theme.as_str());
        let timezone = facts
            .timezone
            .as_deref()
            .filter(|tz| tz.parse::<Tz>().is_ok())
            .map(str::to_string)
            .unwrap_or_else(|| self.snapshot.server_timezone().name().to_string());

        let mut app_map = ValueMap::new();
        app_map.insert("name".into(), app.name.as_str().into());
        app_map.insert("version".into(), app.version.as_str().into());

        let mut context = ValueMap::new();
        context.insert("app".into(), app_map.into());
        context.insert("config".into(), self.snapshot.site().clone());
        context.insert("user".into(), user_projection(facts.user.as_ref()));
        context.insert("url".into(), url_projection(&facts.url));
        context.insert("i18n".into(), messages);
        context.insert("language".into(), language.into());
        context.insert("theme".into(), theme.into());
        context.insert("timezone".into(), timezone.into());
        TemplateValue::Map(context)
    }

    /// Assemble and filter the framework context for the request's auth state.
    pub fn build_filtered(&self, facts: &RequestFacts) -> TemplateValue {
        let context = self.build(facts);
        self.snapshot
            .filter()
            .apply(&context, facts.is_authenticated())
    }

    /// Pick the first of: the requested tag, its primary subtag, the default
    /// language, that has a message bundle.
    fn resolve_language(&self, requested: Option<&str>) -> (String, TemplateValue) {
        let default = &self.snapshot.config().template.default_language;
        let mut candidates: Vec<&str> = Vec::new();
        if let Some(tag) = requested.filter(|t| LANGUAGE.is_match(t)) {
            candidates.push(tag);
            if let Some((primary, _)) = tag.split_once('-') {
                candidates.push(primary);
            }
        } else if let Some(tag) = requested {
            tracing::debug!(language = tag, "rejected invalid language tag");
        }
        candidates.push(default);

        for candidate in &candidates {
            if let Some(messages) = self.localizer.messages(candidate) {
                return (candidate.to_string(), messages);
            }
        }
        (default.clone(), TemplateValue::empty_map())
    }
}

/// Build the complete context for a top-level render: the filtered framework
/// context with `extra` deep-merged on top.
pub fn build_render_context(
    snapshot: &ConfigSnapshot,
    localizer: &dyn Localizer,
    facts: &RequestFacts,
    extra: TemplateValue,
) -> TemplateValue {
    let mut context = ContextBuilder::new(snapshot, localizer).build_filtered(facts);
    deep_merge(&mut context, extra);
    context
}

/// Merge `overlay` into `base`. Maps merge key by key; any other overlay
/// value replaces the base value. Null overlays are ignored.
pub fn deep_merge(base: &mut TemplateValue, overlay: TemplateValue) {
    match (base, overlay) {
        (_, TemplateValue::Null) => {}
        (TemplateValue::Map(base_map), TemplateValue::Map(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn user_projection(user: Option<&UserInfo>) -> TemplateValue {
    let mut map = ValueMap::new();
    let Some(user) = user else {
        map.insert("authenticated".into(), false.into());
        map.insert("roles".into(), TemplateValue::List(Vec::new()));
        return map.into();
    };

    map.insert("authenticated".into(), true.into());
    map.insert("id".into(), user.id.as_str().into());
    map.insert("username".into(), user.username.as_str().into());
    map.insert("displayName".into(), user.display_name.as_str().into());
    map.insert("email".into(), user.email.clone().into());
    map.insert(
        "roles".into(),
        user.roles
            .iter()
            .map(|r| TemplateValue::from(r.as_str()))
            .collect::<Vec<_>>()
            .into(),
    );
    for role in &user.roles {
        map.insert(format!("is{}", pascal_case(role)), true.into());
    }
    map.into()
}

fn url_projection(url: &UrlFacts) -> TemplateValue {
    let mut map = ValueMap::new();
    map.insert("path".into(), url.path.as_str().into());
    map.insert("query".into(), url.query.as_str().into());
    map.insert("host".into(), url.host.as_str().into());
    map.insert("protocol".into(), url.protocol.as_str().into());
    map.insert("href".into(), url.href().into());
    map.into()
}

/// `site-admin` -> `SiteAdmin`, `editor` -> `Editor`.
fn pascal_case(name: &str) -> String {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn localizer() -> StaticLocalizer {
        let mut l = StaticLocalizer::new();
        l.insert("en", json!({"hello": "Hello"}).into());
        l.insert("de", json!({"hello": "Hallo"}).into());
        l
    }

    fn facts() -> RequestFacts {
        RequestFacts {
            user: Some(UserInfo {
                id: "u1".into(),
                username: "ada".into(),
                display_name: "Ada L".into(),
                email: None,
                roles: vec!["site-admin".into(), "editor".into()],
            }),
            url: UrlFacts {
                path: "/docs".into(),
                query: "q=1".into(),
                host: "example.org".into(),
                protocol: "https".into(),
            },
            language: Some("de-AT".into()),
            theme: Some("../etc".into()),
            timezone: Some("Europe/Berlin".into()),
        }
    }

    #[test]
    fn test_build_projects_request() {
        let snapshot = ConfigSnapshot::default();
        let l = localizer();
        let ctx = ContextBuilder::new(&snapshot, &l).build(&facts());

        assert_eq!(ctx.get_path(&["user", "isSiteAdmin"]), Some(&true.into()));
        assert_eq!(ctx.get_path(&["user", "isEditor"]), Some(&true.into()));
        assert_eq!(ctx.get_path(&["user", "email"]), Some(&TemplateValue::Null));
        assert_eq!(
            ctx.get_path(&["url", "href"]),
            Some(&"https://example.org/docs?q=1".into())
        );
        // `de-AT` has no bundle, its primary subtag does
        assert_eq!(ctx.get_path(&["language"]), Some(&"de".into()));
        assert_eq!(ctx.get_path(&["i18n", "hello"]), Some(&"Hallo".into()));
        // invalid theme falls back to the default
        assert_eq!(ctx.get_path(&["theme"]), Some(&"default".into()));
        assert_eq!(ctx.get_path(&["timezone"]), Some(&"Europe/Berlin".into()));
    }

    #[test]
    fn test_invalid_inputs_fall_back() {
        let snapshot = ConfigSnapshot::default();
        let l = localizer();
        let f = RequestFacts {
            language: Some("<script>".into()),
            timezone: Some("Nowhere/City".into()),
            ..Default::default()
        };
        let ctx = ContextBuilder::new(&snapshot, &l).build(&f);
        assert_eq!(ctx.get_path(&["language"]), Some(&"en".into()));
        assert_eq!(ctx.get_path(&["timezone"]), Some(&"UTC".into()));
        assert_eq!(ctx.get_path(&["user", "authenticated"]), Some(&false.into()));
    }

    #[test]
    fn test_caller_data_merged_after_filtering() {
        let config: EngineConfig = serde_json::from_value(json!({
            "template": {"contextFilter": {"withoutAuth": ["config.secret"]}},
            "site": {"secret": "s", "title": "T"}
        }))
        .unwrap();
        let snapshot = ConfigSnapshot::new(config);
        let extra = TemplateValue::from(json!({"config": {"secret": "mine"}, "page": 1}));

        let ctx = build_render_context(&snapshot, &NoLocalizer, &RequestFacts::default(), extra);
        assert_eq!(ctx.get_path(&["config", "secret"]), Some(&"mine".into()));
        assert_eq!(ctx.get_path(&["config", "title"]), Some(&"T".into()));
        assert_eq!(ctx.get_path(&["page"]), Some(&1.0.into()));
    }

    #[test]
    fn test_deep_merge() {
        let mut base = TemplateValue::from(json!({"a": {"b": 1, "c": 2}, "d": [1]}));
        deep_merge(
            &mut base,
            TemplateValue::from(json!({"a": {"c": 3}, "d": [2, 3]})),
        );
        assert_eq!(base, TemplateValue::from(json!({"a": {"b": 1, "c": 3}, "d": [2, 3]})));
    }

    #[test]
    fn test_load_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fr.json"), r#"{"hello": "Bonjour"}"#).unwrap();
        std::fs::write(dir.path().join("bad.json"), "{").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        let l = StaticLocalizer::load_dir(dir.path()).unwrap();
        assert_eq!(l.languages().collect::<Vec<_>>(), vec!["fr"]);
        assert_eq!(
            l.messages("fr").and_then(|m| m.get_path(&["hello"]).cloned()),
            Some("Bonjour".into())
        );
    }
}

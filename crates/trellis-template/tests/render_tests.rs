/*
 * render_tests.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * End-to-end rendering tests against in-memory templates.
 */

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;
use trellis_template::{
    Engine, EngineConfig, MemoryFiles, RequestFacts, Severity, TemplateValue, UserInfo,
};

fn render(source: &str, data: serde_json::Value) -> String {
    Engine::new().render(source, TemplateValue::from(data))
}

#[test]
fn test_math_round_trip() {
    assert_eq!(render("{{math.add 2 3}}", json!({})), "5");
    assert_eq!(render("{{math.add 1 (math.multiply 2 3)}}", json!({})), "7");
}

#[test]
fn test_if_else() {
    assert_eq!(render("{{#if true}}yes{{else}}no{{/if}}", json!({})), "yes");
    assert_eq!(render("{{#if false}}yes{{else}}no{{/if}}", json!({})), "no");
    assert_eq!(render("{{#unless flag}}off{{/unless}}", json!({"flag": false})), "off");
}

#[test]
fn test_nested_else_stays_with_inner_block() {
    assert_eq!(
        render("{{#if false}}{{#if true}}X{{else}}Y{{/if}}{{else}}Z{{/if}}", json!({})),
        "Z"
    );
    assert_eq!(
        render("{{#if true}}{{#if false}}X{{else}}Y{{/if}}{{else}}Z{{/if}}", json!({})),
        "Y"
    );
}

#[test]
fn test_each_over_object_keeps_insertion_order() {
    assert_eq!(
        render(
            "{{#each obj}}{{@key}}={{this}};{{/each}}",
            json!({"obj": {"a": 1, "b": 2}})
        ),
        "a=1;b=2;"
    );
}

#[test]
fn test_each_over_list() {
    let out = render(
        "{{#each people}}{{@index}}:{{name}}{{#if @first}}(first){{/if}}{{#unless @last}}, {{/unless}}{{/each}}",
        json!({"people": [{"name": "Ada"}, {"name": "Grace"}]}),
    );
    assert_eq!(out, "0:Ada(first), 1:Grace");
    assert_eq!(
        render("{{#each items}}x{{else}}empty{{/each}}", json!({"items": []})),
        "empty"
    );
}

#[test]
fn test_sorted_values_keep_their_type() {
    assert_eq!(
        render(
            r#"{{#each (array.sort (json.parse '[3,1,2]') sortAs="number")}}{{this}},{{/each}}"#,
            json!({})
        ),
        "1,2,3,"
    );
    assert_eq!(
        render(
            r#"{{#each (array.sort (json.parse '["10","9","1"]') sortAs="number")}}{{this}},{{/each}}"#,
            json!({})
        ),
        "1,9,10,"
    );
}

#[test]
fn test_block_and_regular_forms_agree() {
    let pairs = [
        ("5", "'5'"),
        ("1", "2"),
        ("2", "1"),
        ("'abc'", "'abd'"),
        ("true", "1"),
        ("null", "0"),
        ("'10'", "'9'"),
        ("'x'", "3"),
    ];
    let engine = Engine::new();
    for helper in ["eq", "ne", "gt", "gte", "lt", "lte", "and", "or"] {
        for (a, b) in pairs {
            let regular = engine.render(&format!("{{{{{helper} {a} {b}}}}}"), TemplateValue::Null);
            let block = engine.render(
                &format!("{{{{#{helper} {a} {b}}}}}true{{{{else}}}}false{{{{/{helper}}}}}"),
                TemplateValue::Null,
            );
            assert_eq!(regular, block, "{helper} {a} {b}");
        }
    }
}

#[test]
fn test_loose_equality_is_preserved() {
    assert_eq!(render("{{eq 5 '5'}}", json!({})), "true");
    assert_eq!(render("{{eq count '3'}}", json!({"count": 3})), "true");
    assert_eq!(render("{{ne null 0}}", json!({})), "true");
}

#[test]
fn test_with_replaces_visible_scope() {
    assert_eq!(
        render(
            "{{#with author}}{{name}}[{{app.name}}]{{/with}}",
            json!({"author": {"name": "Ada"}})
        ),
        "Ada[]"
    );
    assert_eq!(
        render("{{#with missing.thing}}x{{else}}none{{/with}}", json!({"missing": {}})),
        "none"
    );
}

#[test]
fn test_let_scoping() {
    assert_eq!(render("{{let greeting='hi'}}{{vars.greeting}}", json!({})), "hi");
    assert_eq!(render("{{#let x=1}}{{vars.x}}{{/let}}[{{vars.x}}]", json!({})), "1[]");
    assert_eq!(
        render(
            "{{#each items}}{{let last=this}}{{/each}}[{{vars.last}}]",
            json!({"items": [1, 2]})
        ),
        "[]"
    );
}

#[test]
fn test_components() {
    let source = concat!(
        r#"{{#component "ui.user-card" title="Untitled"}}<b>{{title}}</b> {{content}}{{/component}}"#,
        r#"{{components.ui.userCard title="Hi"}}|"#,
        r#"{{components.ui.userCard title="Hi" _inline=true}}|"#,
        r#"{{#components.ui.userCard}}body{{/components.ui.userCard}}|"#,
        r#"{{component "ui.user-card" title="By name"}}"#,
    );
    assert_eq!(
        render(source, json!({})),
        "<b>Hi</b> |<b>Hi</b>|<b>Untitled</b> body|<b>By name</b> "
    );
}

#[test]
fn test_component_visible_in_context_after_definition() {
    assert_eq!(
        render(
            r#"{{#component "card"}}x{{/component}}{{#if components.card}}defined{{/if}}"#,
            json!({})
        ),
        "defined"
    );
}

#[test]
fn test_component_cycle_is_reported() {
    let out = render(
        r#"{{#component "x"}}{{components.x}}{{/component}}{{components.x}}"#,
        json!({}),
    );
    assert_eq!(
        out,
        "<!-- template error: circular component reference: x -> x -->"
    );
}

#[test]
fn test_indirect_component_cycle_names_chain() {
    let out = render(
        concat!(
            r#"{{#component "a"}}A{{components.b}}{{/component}}"#,
            r#"{{#component "b"}}B{{components.a}}{{/component}}"#,
            r#"{{components.a}}"#,
        ),
        json!({}),
    );
    assert_eq!(
        out,
        "AB<!-- template error: circular component reference: a -> b -> a -->"
    );
}

#[test]
fn test_missing_and_invalid_components() {
    assert_eq!(
        render("{{components.nope}}", json!({})),
        "<!-- template error: component not found: nope -->"
    );
    let out = render(r#"{{#component "9lives"}}x{{/component}}"#, json!({}));
    assert!(out.contains("invalid component name"), "{out}");
}

#[test]
fn test_depth_guard_leaves_markup_unexpanded() {
    let files = Arc::new(MemoryFiles::with_files([(
        "loop.html",
        r#"x{{file.include "loop.html"}}"#,
    )]));
    let mut config = EngineConfig::default();
    config.template.max_include_depth = 3;
    let engine = Engine::builder().memory_files(files).config(config).build();

    let output = engine.render_detailed(
        r#"{{file.include "loop.html"}}"#,
        &RequestFacts::default(),
        TemplateValue::Null,
        0,
    );
    assert_eq!(output.text, r#"xxx{{file.include "loop.html"}}"#);
    assert_eq!(output.diagnostics.len(), 1);
    assert_eq!(output.diagnostics[0].severity, Severity::Error);
    assert!(output.diagnostics[0].message.contains("maximum render depth (3)"));
}

#[test]
fn test_render_at_depth_counts_from_start_depth() {
    let mut config = EngineConfig::default();
    config.template.max_include_depth = 2;
    let engine = Engine::builder().config(config).build();
    assert_eq!(engine.render_at_depth("{{#if true}}a{{/if}}", TemplateValue::Null, 1), "a");
    assert_eq!(
        engine.render_at_depth("{{#if true}}a{{/if}}", TemplateValue::Null, 2),
        "{{#if true}}a{{/if}}"
    );
}

#[test]
fn test_includes_with_parameters() {
    let files = Arc::new(MemoryFiles::with_files([
        ("partials/nav.html", r#"<nav class="{{active}}">{{app.name}}</nav>"#),
        (
            "components/ui.html",
            r#"{{#component "badge"}}<i>{{label}}</i>{{/component}}ignored"#,
        ),
    ]));
    let engine = Engine::builder().memory_files(files).build();

    assert_eq!(
        engine.render(r#"{{file.include "partials/nav.html" active="home"}}"#, TemplateValue::Null),
        r#"<nav class="home">trellis</nav>"#
    );
    assert_eq!(
        engine.render(
            r#"{{file.includeComponents "components/ui.html"}}{{components.badge label="new"}}"#,
            TemplateValue::Null
        ),
        "<i>new</i>"
    );
    assert_eq!(
        engine.render("{{file.exists partials/nav.html}}", TemplateValue::Null),
        "true"
    );
}

#[test]
fn test_include_errors_are_inline() {
    let engine = Engine::new();
    assert_eq!(
        engine.render(r#"a{{file.include "missing.html"}}b"#, TemplateValue::Null),
        "a<!-- template error: include not found: missing.html -->b"
    );
    let out = engine.render(r#"{{file.include "../secret.txt"}}"#, TemplateValue::Null);
    assert!(out.contains("path traversal is not allowed"), "{out}");
}

#[test]
fn test_syntax_defects_render_inline() {
    let out = render("{{#if true}}kept", json!({}));
    assert!(out.contains("is never closed"), "{out}");
    assert!(out.ends_with("kept"), "{out}");

    let out = render("a{{/each}}b", json!({}));
    assert!(out.contains("has no matching open tag"), "{out}");

    let out = render("{{else}}", json!({}));
    assert!(out.contains("outside of a block"), "{out}");

    assert_eq!(
        render("{{string.concat (string.uppercase a}}", json!({})),
        "<!-- unbalanced subexpression -->"
    );
    assert_eq!(
        render("{{#nope}}x{{/nope}}", json!({})),
        "<!-- template error: unknown block helper: nope -->"
    );
    assert_eq!(
        render("{{nope 1}}", json!({})),
        "<!-- template error: unknown helper: nope -->"
    );
}

#[test]
fn test_comments_and_escapes() {
    assert_eq!(render("a{{!-- {{nope 1}} --}}b{{! short }}c", json!({})), "abc");
    assert_eq!(render(r"\{{name}}", json!({"name": "x"})), "{{name}}");
    assert_eq!(render(r#"{{string.concat "}}" "x"}}"#, json!({})), "}}x");
}

#[test]
fn test_property_fallback_and_literals() {
    assert_eq!(render("{{user.missing}}|{{title}}", json!({"title": "T"})), "|T");
    assert_eq!(
        render("{{string.uppercase unknownName}}", json!({})),
        "UNKNOWNNAME"
    );
    assert_eq!(render("{{data}}", json!({"data": {"a": [1, true]}})), r#"{"a":[1,true]}"#);
}

#[test]
fn test_data_with_markup_is_not_expanded() {
    assert_eq!(
        render("{{raw}}", json!({"raw": "{{math.add 1 1}}"})),
        "{{math.add 1 1}}"
    );
}

#[test]
fn test_request_context() {
    let engine = Engine::new();
    let facts = RequestFacts {
        user: Some(UserInfo {
            id: "7".into(),
            username: "ada".into(),
            display_name: "Ada".into(),
            email: None,
            roles: vec!["site-admin".into()],
        }),
        ..Default::default()
    };
    let source = "{{#if user.authenticated}}{{user.displayName}}{{#if user.isSiteAdmin}} (admin){{/if}}{{else}}guest{{/if}}";
    assert_eq!(engine.render_request(source, &facts, TemplateValue::Null), "Ada (admin)");
    assert_eq!(engine.render(source, TemplateValue::Null), "guest");
}

#[test]
fn test_context_filter_applies_before_render() {
    let mut config = EngineConfig::default();
    config.site = json!({"title": "Docs", "smtpHost": "mail", "smtpUser": "u"});
    config.template.context_filter.without_auth = vec!["config.smtp*".into()];
    config.template.context_filter.always_allow = vec!["config.smtpUser".into()];
    let engine = Engine::builder().config(config).build();

    assert_eq!(
        engine.render("{{config.title}}|{{config.smtpHost}}|{{config.smtpUser}}", TemplateValue::Null),
        "Docs||u"
    );
    // caller data is merged after filtering
    assert_eq!(
        engine.render(
            "{{config.smtpHost}}",
            TemplateValue::from(json!({"config": {"smtpHost": "mine"}}))
        ),
        "mine"
    );
}

#[test]
fn test_out_of_range_date_arithmetic_renders_inline() {
    let engine = Engine::new();
    let output = engine.render_detailed(
        r#"a{{date.add "2025-01-01" amount "ms"}}b"#,
        &RequestFacts::default(),
        TemplateValue::from(json!({"amount": -1e30})),
        0,
    );
    assert_eq!(
        output.text,
        "a<!-- template error: helper 'date.add' failed: date out of range -->b"
    );
    assert_eq!(output.diagnostics.len(), 1);
    assert_eq!(output.diagnostics[0].severity, Severity::Error);
    assert!(output.diagnostics[0].message.contains("date out of range"));

    assert_eq!(
        render(r#"{{date.add "2025-01-01T00:00:00Z" 1 "days"}}"#, json!({})),
        "2025-01-02T00:00:00.000Z"
    );
}

#[test]
fn test_padding_output_is_bounded() {
    let padded = render(r#"{{string.padLeft "x" 50000000}}"#, json!({}));
    assert_eq!(padded.len(), 4096);
    assert!(padded.ends_with(" x"));
    assert_eq!(render(r#"{{string.padRight "x" width "."}}"#, json!({"width": 1e12})).len(), 4096);
}

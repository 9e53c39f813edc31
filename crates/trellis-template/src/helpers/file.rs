/*
 * file.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! `file.*` value helpers. `file.include` and `file.includeComponents`
//! render templates and are handled by the renderer.

use std::path::PathBuf;
use std::time::UNIX_EPOCH;

use super::HelperEnv;
use crate::args::HelperArgs;
use crate::error::{HelperError, HelperResult};
use crate::resolver::ResolveError;
use crate::value::TemplateValue;

pub(crate) const NAMES: &[&str] = &[
    "file.exists",
    "file.include",
    "file.list",
    "file.timestamp",
    "file.includeComponents",
];

pub(crate) fn call(
    method: &str,
    args: &HelperArgs,
    env: &HelperEnv<'_>,
) -> Option<HelperResult<TemplateValue>> {
    let result = match method {
        "exists" => resolve(args, env).map(|path| {
            path.is_some_and(|p| env.files.exists(&p)).into()
        }),
        "list" => resolve(args, env).map(|path| {
            let extension = args.named_str("extension").map(|e| {
                let e = e.trim_start_matches('.').to_string();
                format!(".{e}")
            });
            path.map(|p| env.files.list(&p))
                .unwrap_or_default()
                .into_iter()
                .filter(|name| extension.as_ref().is_none_or(|ext| name.ends_with(ext.as_str())))
                .map(TemplateValue::from)
                .collect::<Vec<_>>()
                .into()
        }),
        "timestamp" => resolve(args, env).map(|path| {
            path.and_then(|p| env.files.modified(&p))
                .and_then(|m| m.duration_since(UNIX_EPOCH).ok())
                .map(|d| TemplateValue::Number(d.as_millis() as f64))
                .unwrap_or_default()
        }),
        _ => return None,
    };
    Some(result)
}

/// Resolve the primary path argument. A path that does not exist is `None`;
/// a rejected path is an error.
fn resolve(args: &HelperArgs, env: &HelperEnv<'_>) -> HelperResult<Option<PathBuf>> {
    args.require(1)?;
    match env.resolver.resolve_module(&args.str_at(0)) {
        Ok(path) => Ok(Some(path)),
        Err(ResolveError::NotFound(_)) => Ok(None),
        Err(e) => Err(HelperError::Failed(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigSnapshot;
    use crate::context::TemplateContext;
    use crate::files::MemoryFiles;
    use chrono::Utc;

    fn run(method: &str, args: HelperArgs) -> HelperResult<TemplateValue> {
        let files = MemoryFiles::with_files([
            ("partials/header.html", "<h1>"),
            ("partials/footer.html", "<footer>"),
            ("partials/notes.txt", "n"),
        ]);
        let ctx = TemplateContext::new();
        let snapshot = ConfigSnapshot::default();
        let env = HelperEnv {
            ctx: &ctx,
            config: &snapshot,
            files: &files,
            resolver: &files,
            now: Utc::now(),
        };
        call(method, &args, &env).unwrap()
    }

    #[test]
    fn test_exists() {
        let found = run("exists", HelperArgs::new("file.exists").arg("partials/header.html"));
        assert_eq!(found.unwrap(), true.into());
        let missing = run("exists", HelperArgs::new("file.exists").arg("partials/nav.html"));
        assert_eq!(missing.unwrap(), false.into());
    }

    #[test]
    fn test_traversal_is_rejected() {
        let err = run("exists", HelperArgs::new("file.exists").arg("../etc/passwd")).unwrap_err();
        assert!(err.to_string().contains(".."), "{err}");
    }

    #[test]
    fn test_list_filters_by_extension() {
        let all = run("list", HelperArgs::new("file.list").arg("partials")).unwrap();
        assert_eq!(all.as_list().map(<[_]>::len), Some(3));
        let html = run(
            "list",
            HelperArgs::new("file.list").arg("partials").with("extension", "html"),
        )
        .unwrap();
        assert_eq!(
            html,
            TemplateValue::List(vec!["footer.html".into(), "header.html".into()])
        );
    }

    #[test]
    fn test_timestamp() {
        let stamp = run("timestamp", HelperArgs::new("file.timestamp").arg("partials/notes.txt")).unwrap();
        assert!(stamp.to_number() > 0.0);
        let missing = run("timestamp", HelperArgs::new("file.timestamp").arg("nope.txt")).unwrap();
        assert!(missing.is_null());
    }
}

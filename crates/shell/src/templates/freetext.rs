use crate::templates::ValidationCtx;

/// Substrings that make a free-text value look like a smuggled secret.
static SECRET_PATTERNS: &[&str] = &[
    "KEY=",
    "SECRET=",
    "TOKEN=",
    "PASSWORD=",
    "PASSWD=",
    "CREDENTIAL=",
    "APIKEY=",
    "API_KEY=",
    "BEARER:",
    "AUTHORIZATION:",
];

/// Extra shape rule applied to a free-text value after the common checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeTextRule {
    /// No extra shape; common sanitization only.
    Plain,
    /// Valid identifier: letter or `_` start, then letters, digits, `_`.
    MigrationIdentifier,
    /// Git ref-name discipline: no spaces, `..`, `@{`, leading/trailing `.`
    /// or `/`, trailing `.lock`, `//`, or ref-hostile characters.
    GitTagName,
}

/// Sanitize a free-text slot value. Returns a human-readable reason on
/// rejection — the caller folds it into the template mismatch report.
pub fn sanitize(value: &str, rule: FreeTextRule, ctx: &ValidationCtx<'_>) -> Result<(), String> {
    if value.is_empty() {
        return Err("free text must not be empty".to_string());
    }
    if value.len() > ctx.free_text.max_length {
        return Err(format!(
            "free text exceeds {} chars",
            ctx.free_text.max_length
        ));
    }
    if value.chars().any(|c| c.is_control()) {
        return Err("free text contains a control character".to_string());
    }
    let upper = value.to_uppercase();
    for pattern in SECRET_PATTERNS {
        if upper.contains(pattern) {
            return Err(format!("free text contains secret pattern {pattern:?}"));
        }
    }
    if let Err(e) = ctx.gigablacklist.check(value) {
        return Err(e.to_string());
    }

    match rule {
        FreeTextRule::Plain => Ok(()),
        FreeTextRule::MigrationIdentifier => check_identifier(value),
        FreeTextRule::GitTagName => check_git_tag(value),
    }
}

fn check_identifier(value: &str) -> Result<(), String> {
    let mut chars = value.chars();
    let ok_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !ok_start || !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(format!("{value:?} is not a valid identifier"));
    }
    Ok(())
}

fn check_git_tag(value: &str) -> Result<(), String> {
    let bad = |reason: &str| Err(format!("{value:?}: {reason}"));

    if value.contains(' ') {
        return bad("tag names cannot contain spaces");
    }
    if value.contains("..") {
        return bad("tag names cannot contain '..'");
    }
    if value.contains("@{") {
        return bad("tag names cannot contain '@{'");
    }
    if value.starts_with('.') || value.ends_with('.') || value.starts_with('/') || value.ends_with('/')
    {
        return bad("tag names cannot start or end with '.' or '/'");
    }
    if value.ends_with(".lock") {
        return bad("tag names cannot end with '.lock'");
    }
    if value.contains("//") {
        return bad("tag names cannot contain '//'");
    }
    if value
        .chars()
        .any(|c| matches!(c, '~' | '^' | ':' | '?' | '*' | '[' | '\\' | '\t' | '\n' | '\r'))
    {
        return bad("tag names cannot contain ref-hostile characters");
    }
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{safety::Gigablacklist, templates::ValidationCtx, templates::Vocabularies},
        rstest::rstest,
        sharpclaw_config::{FreeTextConfig, GlobalEnv},
        std::path::PathBuf,
    };

    fn ctx_parts() -> (GlobalEnv, Vocabularies, Gigablacklist, FreeTextConfig, PathBuf) {
        (
            GlobalEnv::default(),
            Vocabularies::builtin(),
            Gigablacklist::hardcoded(),
            FreeTextConfig::default(),
            PathBuf::from("/srv/sand"),
        )
    }

    macro_rules! with_ctx {
        ($ctx:ident, $body:expr) => {{
            let (global, vocab, giga, free_text, root) = ctx_parts();
            let $ctx = ValidationCtx {
                sandbox_root: &root,
                vocab: &vocab,
                free_text: &free_text,
                gigablacklist: &giga,
                global: &global,
            };
            $body
        }};
    }

    #[test]
    fn test_plain_accepts_normal_text() {
        with_ctx!(ctx, {
            assert!(sanitize("update the parser docs", FreeTextRule::Plain, &ctx).is_ok());
        });
    }

    #[rstest]
    #[case("")]
    #[case("line\nbreak")]
    #[case("tab\there")]
    #[case("API_KEY=abc123")]
    #[case("the TOKEN= is hidden")]
    #[case("Bearer: xyz")]
    #[case("please run rm -rf / now")]
    fn test_plain_rejections(#[case] value: &str) {
        with_ctx!(ctx, {
            assert!(sanitize(value, FreeTextRule::Plain, &ctx).is_err());
        });
    }

    #[test]
    fn test_max_length() {
        with_ctx!(ctx, {
            let long = "a".repeat(201);
            assert!(sanitize(&long, FreeTextRule::Plain, &ctx).is_err());
            let ok = "a".repeat(200);
            assert!(sanitize(&ok, FreeTextRule::Plain, &ctx).is_ok());
        });
    }

    #[rstest]
    #[case("AddUserTable", true)]
    #[case("_private", true)]
    #[case("m2026_init", true)]
    #[case("2026init", false)]
    #[case("has-dash", false)]
    #[case("has space", false)]
    fn test_migration_identifier(#[case] value: &str, #[case] ok: bool) {
        with_ctx!(ctx, {
            assert_eq!(
                sanitize(value, FreeTextRule::MigrationIdentifier, &ctx).is_ok(),
                ok
            );
        });
    }

    #[rstest]
    #[case("v1.2.3", true)]
    #[case("release/2026-03", true)]
    #[case("v1..2", false)]
    #[case("head@{1}", false)]
    #[case(".hidden", false)]
    #[case("tag.", false)]
    #[case("/lead", false)]
    #[case("trail/", false)]
    #[case("refs//double", false)]
    #[case("v1.lock", false)]
    #[case("with space", false)]
    #[case("ca^ret", false)]
    #[case("co:lon", false)]
    #[case("sta*r", false)]
    fn test_git_tag_rule(#[case] value: &str, #[case] ok: bool) {
        with_ctx!(ctx, {
            assert_eq!(sanitize(value, FreeTextRule::GitTagName, &ctx).is_ok(), ok);
        });
    }
}

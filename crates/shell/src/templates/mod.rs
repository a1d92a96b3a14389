//! The command-template whitelist: every external process invocation must
//! match exactly one registered template, slot by slot.

pub mod catalog;
pub mod freetext;
pub mod slot;
pub mod template;
pub mod vocab;

pub use {
    catalog::catalog,
    freetext::FreeTextRule,
    slot::{MAX_COMPOSED_WORDS, SlotKind, UrlList},
    template::{CommandTemplate, FlagSpec, ParamSlot},
    vocab::{PROJECT_SUFFIXES, VOCAB_ENV_PREFIX, Vocabularies},
};

use std::path::Path;

use {sharpclaw_config::{FreeTextConfig, GlobalEnv}, tracing::debug};

use crate::{
    error::{Error, Result},
    safety::{Gigablacklist, binaries},
};

/// Everything slot validation needs from the current task container.
pub struct ValidationCtx<'a> {
    pub sandbox_root: &'a Path,
    pub vocab: &'a Vocabularies,
    pub free_text: &'a FreeTextConfig,
    pub gigablacklist: &'a Gigablacklist,
    pub global: &'a GlobalEnv,
}

/// Description returned when the version-check exception applied instead of
/// a registered template.
pub const VERSION_CHECK_DESCRIPTION: &str = "version check";

/// Validate an external process invocation against the whitelist. Returns
/// the matched template's description.
///
/// Flow: gigablacklist over `[binary, ...args]`, the version-check
/// exception, the permanent block list, then the template matchers. The
/// mismatch report lists one `✗` line per candidate so the model can see
/// exactly how close each template came.
pub fn validate(binary: &str, args: &[String], ctx: &ValidationCtx<'_>) -> Result<&'static str> {
    ctx.gigablacklist.check(binary)?;
    ctx.gigablacklist.check_all(args)?;

    if binaries::is_version_check(binary, args) {
        debug!(binary, "version-check invocation allowed");
        return Ok(VERSION_CHECK_DESCRIPTION);
    }
    if binaries::is_permanently_blocked(binary) {
        return Err(Error::TemplateMismatch {
            report: format!("✗ {binary} is permanently blocked"),
        });
    }

    let base = binary
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(binary)
        .to_lowercase();
    let candidates: Vec<CommandTemplate> = catalog()
        .into_iter()
        .filter(|t| t.binary == base)
        .collect();

    if candidates.is_empty() {
        return Err(Error::TemplateMismatch {
            report: format!("✗ no templates registered for {binary:?}"),
        });
    }

    let mut report = String::new();
    for candidate in &candidates {
        match candidate.matches(args, ctx) {
            Ok(()) => {
                debug!(binary, template = candidate.description, "template matched");
                return Ok(candidate.description);
            },
            Err(reason) => {
                report.push_str(&format!("✗ {}: {reason}\n", candidate.description));
            },
        }
    }
    report.push_str("✗ none of the registered templates matched");
    Err(Error::TemplateMismatch { report })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, std::path::PathBuf};

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    struct Fixture {
        global: GlobalEnv,
        vocab: Vocabularies,
        giga: Gigablacklist,
        free_text: FreeTextConfig,
        root: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                global: GlobalEnv {
                    project_bases: vec!["acme".into()],
                    ..GlobalEnv::default()
                },
                vocab: Vocabularies::builtin(),
                giga: Gigablacklist::hardcoded(),
                free_text: FreeTextConfig::default(),
                root: PathBuf::from("/srv/sand"),
            }
        }

        fn ctx(&self) -> ValidationCtx<'_> {
            ValidationCtx {
                sandbox_root: &self.root,
                vocab: &self.vocab,
                free_text: &self.free_text,
                gigablacklist: &self.giga,
                global: &self.global,
            }
        }
    }

    #[test]
    fn test_git_status_accepted() {
        let f = Fixture::new();
        assert!(validate("git", &args(&["status", "--short"]), &f.ctx()).is_ok());
    }

    #[test]
    fn test_git_push_has_no_template() {
        let f = Fixture::new();
        let err = validate("git", &args(&["push", "origin", "main"]), &f.ctx()).unwrap_err();
        match err {
            Error::TemplateMismatch { report } => {
                assert!(report.contains('✗'));
                assert!(report.contains("none of the registered templates matched"));
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_blocked_binary() {
        let f = Fixture::new();
        assert!(validate("bash", &args(&["-c", "id"]), &f.ctx()).is_err());
        assert!(validate("/usr/bin/curl", &args(&["https://x.dev"]), &f.ctx()).is_err());
    }

    #[test]
    fn test_version_check_exception() {
        let f = Fixture::new();
        // node is permanently blocked, but --version is a pure report.
        assert!(validate("node", &args(&["--version"]), &f.ctx()).is_ok());
        assert!(validate("kubectl", &args(&["version", "--client"]), &f.ctx()).is_ok());
        assert!(validate("node", &args(&["-e", "1"]), &f.ctx()).is_err());
    }

    #[test]
    fn test_gigablacklist_precedes_matching() {
        let f = Fixture::new();
        let err = validate("git", &args(&["add", "rm -rf / x"]), &f.ctx()).unwrap_err();
        assert!(matches!(err, Error::GigablacklistHit { .. }));
    }

    #[test]
    fn test_unknown_binary() {
        let f = Fixture::new();
        assert!(validate("terraform", &args(&["apply"]), &f.ctx()).is_err());
    }

    #[test]
    fn test_dotnet_build_compound_name() {
        let f = Fixture::new();
        assert!(validate("dotnet", &args(&["build", "acme+api"]), &f.ctx()).is_ok());
        assert!(validate("dotnet", &args(&["build", "evil"]), &f.ctx()).is_err());
    }

    #[test]
    fn test_dotnet_ef_migration_name() {
        let f = Fixture::new();
        assert!(
            validate(
                "dotnet",
                &args(&["ef", "migrations", "add", "AddUserTable"]),
                &f.ctx()
            )
            .is_ok()
        );
        assert!(
            validate(
                "dotnet",
                &args(&["ef", "migrations", "add", "2026-bad name"]),
                &f.ctx()
            )
            .is_err()
        );
    }
}

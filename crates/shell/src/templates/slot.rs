use crate::{
    safety::path,
    templates::{
        ValidationCtx,
        freetext::{self, FreeTextRule},
        vocab::PROJECT_SUFFIXES,
    },
};

/// Hard cap on words in a ComposedWords value.
pub const MAX_COMPOSED_WORDS: usize = 12;

/// Which allowed-URL list from the global env an AllowedUrl slot checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlList {
    GitRemotes,
    CloneUrls,
}

/// A typed slot in a command template. Validation is total: every kind
/// either accepts the value or produces a reason.
#[derive(Debug, Clone)]
pub enum SlotKind {
    /// Exact case-insensitive match from a fixed list.
    Choice(&'static [&'static str]),
    /// A path that must resolve inside the sandbox.
    SandboxPath { write: bool },
    /// Exact match in a named vocabulary.
    AdminWord { vocabulary: &'static str },
    /// Integer in `[min, max]`.
    IntRange { min: i64, max: i64 },
    /// Whitespace-split; every word in the vocabulary; at most
    /// [`MAX_COMPOSED_WORDS`] words.
    ComposedWords { vocabulary: &'static str },
    /// `base`, `base+suffix`, or `base.suffix` with a runtime project base
    /// and a compile-time suffix.
    CompoundName,
    /// Sanitized free text; falls back to ComposedWords over
    /// `descriptionWords` when free text is disabled for this command.
    FreeText(FreeTextRule),
    /// Exact match against an allowed-URL list from the global env.
    AllowedUrl(UrlList),
}

impl SlotKind {
    /// Short label for mismatch reports.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Choice(options) => format!("choice of {options:?}"),
            Self::SandboxPath { write: true } => "writable sandbox path".to_string(),
            Self::SandboxPath { write: false } => "sandbox path".to_string(),
            Self::AdminWord { vocabulary } => format!("word from {vocabulary}"),
            Self::IntRange { min, max } => format!("integer {min}..={max}"),
            Self::ComposedWords { vocabulary } => format!("words from {vocabulary}"),
            Self::CompoundName => "project name".to_string(),
            Self::FreeText(_) => "free text".to_string(),
            Self::AllowedUrl(UrlList::GitRemotes) => "allowed git remote".to_string(),
            Self::AllowedUrl(UrlList::CloneUrls) => "allowed clone url".to_string(),
        }
    }

    /// Validate one value against this slot.
    pub fn validate(
        &self,
        value: &str,
        ctx: &ValidationCtx<'_>,
        description: &str,
        binary: &str,
    ) -> Result<(), String> {
        match self {
            Self::Choice(options) => {
                if options.iter().any(|o| o.eq_ignore_ascii_case(value)) {
                    Ok(())
                } else {
                    Err(format!("{value:?} is not one of {options:?}"))
                }
            },
            Self::SandboxPath { write } => {
                let resolved = if *write {
                    path::resolve_for_write(value, ctx.sandbox_root)
                } else {
                    path::resolve(value, ctx.sandbox_root)
                };
                resolved.map(|_| ()).map_err(|e| e.to_string())
            },
            Self::AdminWord { vocabulary } => {
                if ctx.vocab.contains(vocabulary, value) {
                    Ok(())
                } else {
                    Err(format!("{value:?} is not in vocabulary {vocabulary:?}"))
                }
            },
            Self::IntRange { min, max } => match value.parse::<i64>() {
                Ok(n) if (*min..=*max).contains(&n) => Ok(()),
                Ok(n) => Err(format!("{n} is outside {min}..={max}")),
                Err(_) => Err(format!("{value:?} is not an integer")),
            },
            Self::ComposedWords { vocabulary } => {
                composed_words(value, vocabulary, ctx)
            },
            Self::CompoundName => compound_name(value, ctx),
            Self::FreeText(rule) => {
                if ctx.free_text.allows(description, binary) {
                    freetext::sanitize(value, *rule, ctx)
                } else {
                    composed_words(value, "descriptionWords", ctx)
                }
            },
            Self::AllowedUrl(list) => {
                let allowed = match list {
                    UrlList::GitRemotes => &ctx.global.allowed_git_remotes,
                    UrlList::CloneUrls => &ctx.global.allowed_clone_urls,
                };
                if allowed.iter().any(|u| u.eq_ignore_ascii_case(value)) {
                    Ok(())
                } else {
                    Err(format!("{value:?} is not an allowed URL"))
                }
            },
        }
    }
}

fn composed_words(value: &str, vocabulary: &str, ctx: &ValidationCtx<'_>) -> Result<(), String> {
    let words: Vec<&str> = value.split_whitespace().collect();
    if words.is_empty() {
        return Err("no words given".to_string());
    }
    if words.len() > MAX_COMPOSED_WORDS {
        return Err(format!("more than {MAX_COMPOSED_WORDS} words"));
    }
    for word in words {
        if !ctx.vocab.contains(vocabulary, word) {
            return Err(format!("{word:?} is not in vocabulary {vocabulary:?}"));
        }
    }
    Ok(())
}

fn compound_name(value: &str, ctx: &ValidationCtx<'_>) -> Result<(), String> {
    let (base, suffix) = match value.split_once(['+', '.']) {
        Some((base, suffix)) => (base, Some(suffix)),
        None => (value, None),
    };
    let base_ok = ctx
        .global
        .project_bases
        .iter()
        .any(|b| b.eq_ignore_ascii_case(base));
    if !base_ok {
        return Err(format!("{base:?} is not a registered project base"));
    }
    if let Some(suffix) = suffix
        && !PROJECT_SUFFIXES.iter().any(|s| s.eq_ignore_ascii_case(suffix))
    {
        return Err(format!("{suffix:?} is not a known project suffix"));
    }
    Ok(())
}

use std::collections::{HashMap, HashSet};

/// Compile-time word lists. Env and global config can only *add* words,
/// never replace a list.
static BUILTIN_VOCABULARIES: &[(&str, &[&str])] = &[
    ("configurations", &["debug", "release"]),
    (
        "commitWords",
        &[
            "add", "adjust", "bump", "change", "clean", "doc", "docs", "feat", "fix", "fixes",
            "improve", "initial", "merge", "refactor", "remove", "rename", "test", "tests",
            "tweak", "update", "wip",
        ],
    ),
    (
        "descriptionWords",
        &[
            "api", "build", "cache", "client", "config", "data", "endpoint", "error", "handler",
            "import", "job", "layer", "logging", "migration", "model", "module", "parser",
            "pipeline", "query", "route", "schema", "server", "service", "setup", "store",
            "table", "test", "worker",
        ],
    ),
];

/// Suffixes accepted by CompoundName slots, joined to a runtime project base
/// with `+` or `.`.
pub static PROJECT_SUFFIXES: &[&str] = &[
    "api", "app", "cli", "client", "common", "contracts", "core", "data", "domain",
    "infrastructure", "server", "shared", "tests", "web", "worker",
];

/// Env keys of the form `MK8_VOCAB_<listName>=word1,word2` contribute words.
pub const VOCAB_ENV_PREFIX: &str = "MK8_VOCAB_";

/// Named word lists backing AdminWord / ComposedWords slot validation.
/// Lookups are case-insensitive; merging is an additive set union.
#[derive(Debug, Clone, Default)]
pub struct Vocabularies {
    lists: HashMap<String, HashSet<String>>,
}

impl Vocabularies {
    /// Just the compile-time lists.
    #[must_use]
    pub fn builtin() -> Self {
        let mut v = Self::default();
        for (name, words) in BUILTIN_VOCABULARIES {
            v.add_words(name, words.iter().copied());
        }
        v
    }

    /// Compile-time lists plus the global config's vocabularies plus the
    /// sandbox env's `MK8_VOCAB_*` entries.
    #[must_use]
    pub fn merged(
        global: &HashMap<String, Vec<String>>,
        sandbox_env: &HashMap<String, String>,
    ) -> Self {
        let mut v = Self::builtin();
        for (name, words) in global {
            v.add_words(name, words.iter().map(String::as_str));
        }
        for (key, value) in sandbox_env {
            if let Some(name) = key.strip_prefix(VOCAB_ENV_PREFIX)
                && !name.is_empty()
            {
                v.add_words(name, value.split(','));
            }
        }
        v
    }

    fn add_words<'a>(&mut self, list: &str, words: impl Iterator<Item = &'a str>) {
        let set = self.lists.entry(list.to_lowercase()).or_default();
        for word in words {
            let trimmed = word.trim();
            if !trimmed.is_empty() {
                set.insert(trimmed.to_lowercase());
            }
        }
    }

    /// Whether `word` is in the named list (both case-insensitive).
    #[must_use]
    pub fn contains(&self, list: &str, word: &str) -> bool {
        self.lists
            .get(&list.to_lowercase())
            .is_some_and(|set| set.contains(&word.to_lowercase()))
    }

    /// Sorted view of a list, for introspection output.
    #[must_use]
    pub fn words(&self, list: &str) -> Vec<String> {
        let mut words: Vec<String> = self
            .lists
            .get(&list.to_lowercase())
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        words.sort();
        words
    }

    /// Sorted list names, for introspection output.
    #[must_use]
    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lists.keys().cloned().collect();
        names.sort();
        names
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lists() {
        let v = Vocabularies::builtin();
        assert!(v.contains("configurations", "Release"));
        assert!(v.contains("commitWords", "fix"));
        assert!(!v.contains("commitWords", "deploy"));
    }

    #[test]
    fn test_merge_is_additive() {
        let mut global = HashMap::new();
        global.insert("commitWords".to_string(), vec!["deploy".to_string()]);
        let mut env = HashMap::new();
        env.insert(
            "MK8_VOCAB_commitWords".to_string(),
            "hotfix, revert".to_string(),
        );
        env.insert("MK8_VOCAB_envNames".to_string(), "staging,prod".to_string());
        env.insert("UNRELATED".to_string(), "ignored".to_string());

        let v = Vocabularies::merged(&global, &env);
        // Builtins survive every merge.
        assert!(v.contains("commitWords", "fix"));
        assert!(v.contains("commitWords", "deploy"));
        assert!(v.contains("commitWords", "hotfix"));
        assert!(v.contains("commitWords", "revert"));
        assert!(v.contains("envnames", "STAGING"));
        assert!(!v.contains("envnames", "ignored"));
    }

    #[test]
    fn test_words_sorted() {
        let v = Vocabularies::builtin();
        let words = v.words("configurations");
        assert_eq!(words, vec!["debug", "release"]);
    }
}

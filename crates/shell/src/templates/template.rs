use crate::templates::{SlotKind, ValidationCtx};

/// A flag a template accepts after its prefix. Flags are unordered and may
/// not repeat; `--flag=value` and `--flag value` are both accepted when the
/// flag carries a value slot.
#[derive(Debug, Clone)]
pub struct FlagSpec {
    pub name: &'static str,
    pub value: Option<SlotKind>,
}

impl FlagSpec {
    #[must_use]
    pub fn bare(name: &'static str) -> Self {
        Self { name, value: None }
    }

    #[must_use]
    pub fn with_value(name: &'static str, value: SlotKind) -> Self {
        Self {
            name,
            value: Some(value),
        }
    }
}

/// A positional parameter consumed after the flags. Only the last param may
/// be variadic; a required variadic param needs at least one value.
#[derive(Debug, Clone)]
pub struct ParamSlot {
    pub name: &'static str,
    pub kind: SlotKind,
    pub required: bool,
    pub variadic: bool,
}

impl ParamSlot {
    #[must_use]
    pub fn required(name: &'static str, kind: SlotKind) -> Self {
        Self {
            name,
            kind,
            required: true,
            variadic: false,
        }
    }

    #[must_use]
    pub fn optional(name: &'static str, kind: SlotKind) -> Self {
        Self {
            name,
            kind,
            required: false,
            variadic: false,
        }
    }

    #[must_use]
    pub fn variadic(name: &'static str, kind: SlotKind, required: bool) -> Self {
        Self {
            name,
            kind,
            required,
            variadic: true,
        }
    }
}

/// One registered shape an external process invocation may take.
#[derive(Debug, Clone)]
pub struct CommandTemplate {
    pub description: &'static str,
    pub binary: &'static str,
    pub prefix: &'static [&'static str],
    pub flags: Vec<FlagSpec>,
    pub params: Vec<ParamSlot>,
}

impl CommandTemplate {
    /// Match `args` against this template. `Ok(())` means the invocation is
    /// accepted; `Err` carries the first mismatch reason.
    pub fn matches(&self, args: &[String], ctx: &ValidationCtx<'_>) -> Result<(), String> {
        let mut rest = args;

        // Fixed literal prefix, in order.
        for expected in self.prefix {
            match rest.first() {
                Some(got) if got == expected => rest = &rest[1..],
                Some(got) => {
                    return Err(format!("expected {expected:?}, found {got:?}"));
                },
                None => return Err(format!("missing {expected:?}")),
            }
        }

        // Flags: any order, no repeats, optional `=value` form.
        let mut seen: Vec<&str> = Vec::new();
        while let Some(arg) = rest.first() {
            if !arg.starts_with('-') {
                break;
            }
            let (name, inline_value) = match arg.split_once('=') {
                Some((n, v)) => (n, Some(v.to_string())),
                None => (arg.as_str(), None),
            };
            let Some(spec) = self.flags.iter().find(|f| f.name == name) else {
                return Err(format!("unknown flag {name:?}"));
            };
            if seen.contains(&spec.name) {
                return Err(format!("flag {name:?} repeated"));
            }
            seen.push(spec.name);
            rest = &rest[1..];

            match (&spec.value, inline_value) {
                (None, None) => {},
                (None, Some(_)) => {
                    return Err(format!("flag {name:?} takes no value"));
                },
                (Some(kind), Some(value)) => {
                    kind.validate(&value, ctx, self.description, self.binary)
                        .map_err(|e| format!("flag {name:?}: {e}"))?;
                },
                (Some(kind), None) => {
                    let Some(value) = rest.first() else {
                        return Err(format!("flag {name:?} needs a value"));
                    };
                    kind.validate(value, ctx, self.description, self.binary)
                        .map_err(|e| format!("flag {name:?}: {e}"))?;
                    rest = &rest[1..];
                },
            }
        }

        // Positional typed params; trailing variadic swallows the rest.
        for (i, param) in self.params.iter().enumerate() {
            let is_last = i + 1 == self.params.len();
            if param.variadic {
                if !is_last {
                    return Err("template bug: variadic param must be last".to_string());
                }
                if rest.is_empty() && param.required {
                    return Err(format!("missing required {}", param.name));
                }
                for value in rest {
                    param
                        .kind
                        .validate(value, ctx, self.description, self.binary)
                        .map_err(|e| format!("{}: {e}", param.name))?;
                }
                rest = &[];
            } else {
                match rest.first() {
                    Some(value) => {
                        param
                            .kind
                            .validate(value, ctx, self.description, self.binary)
                            .map_err(|e| format!("{}: {e}", param.name))?;
                        rest = &rest[1..];
                    },
                    None if param.required => {
                        return Err(format!("missing required {}", param.name));
                    },
                    None => {},
                }
            }
        }

        if let Some(extra) = rest.first() {
            return Err(format!("unexpected argument {extra:?}"));
        }
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{safety::Gigablacklist, templates::Vocabularies},
        sharpclaw_config::{FreeTextConfig, GlobalEnv},
        std::path::PathBuf,
    };

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
                global: GlobalEnv::default(),
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

    fn log_template() -> CommandTemplate {
        CommandTemplate {
            description: "git log",
            binary: "git",
            prefix: &["log"],
            flags: vec![
                FlagSpec::bare("--oneline"),
                FlagSpec::with_value("-n", SlotKind::IntRange { min: 1, max: 1000 }),
            ],
            params: vec![],
        }
    }

    fn add_template() -> CommandTemplate {
        CommandTemplate {
            description: "git add",
            binary: "git",
            prefix: &["add"],
            flags: vec![],
            params: vec![ParamSlot::variadic(
                "path",
                SlotKind::SandboxPath { write: false },
                true,
            )],
        }
    }

    #[test]
    fn test_prefix_and_flags() {
        let f = Fixture::new();
        let t = log_template();
        assert!(t.matches(&args(&["log"]), &f.ctx()).is_ok());
        assert!(t.matches(&args(&["log", "--oneline"]), &f.ctx()).is_ok());
        assert!(t.matches(&args(&["log", "-n", "10"]), &f.ctx()).is_ok());
        assert!(t.matches(&args(&["log", "-n=10", "--oneline"]), &f.ctx()).is_ok());
        assert!(t.matches(&args(&["status"]), &f.ctx()).is_err());
        assert!(t.matches(&args(&["log", "-n"]), &f.ctx()).is_err());
        assert!(t.matches(&args(&["log", "-n", "0"]), &f.ctx()).is_err());
        assert!(t.matches(&args(&["log", "--graph"]), &f.ctx()).is_err());
    }

    #[test]
    fn test_flag_repeat_rejected() {
        let f = Fixture::new();
        let t = log_template();
        assert!(
            t.matches(&args(&["log", "--oneline", "--oneline"]), &f.ctx())
                .is_err()
        );
        assert!(
            t.matches(&args(&["log", "-n", "5", "-n=6"]), &f.ctx())
                .is_err()
        );
    }

    #[test]
    fn test_variadic_params() {
        let f = Fixture::new();
        let t = add_template();
        assert!(t.matches(&args(&["add", "a.txt"]), &f.ctx()).is_ok());
        assert!(
            t.matches(&args(&["add", "a.txt", "b/c.txt"]), &f.ctx())
                .is_ok()
        );
        // Required variadic needs at least one value.
        assert!(t.matches(&args(&["add"]), &f.ctx()).is_err());
        // Jail still applies to every value.
        assert!(
            t.matches(&args(&["add", "a.txt", "../../etc/passwd"]), &f.ctx())
                .is_err()
        );
    }

    #[test]
    fn test_unexpected_trailing_arg() {
        let f = Fixture::new();
        let t = log_template();
        assert!(t.matches(&args(&["log", "extra"]), &f.ctx()).is_err());
    }

    #[test]
    fn test_bare_flag_with_inline_value_rejected() {
        let f = Fixture::new();
        let t = log_template();
        assert!(t.matches(&args(&["log", "--oneline=yes"]), &f.ctx()).is_err());
    }
}

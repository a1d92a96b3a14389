use std::fmt::Write as _;

use crate::{
    error::{Error, Result},
    script::Verb,
    templates,
};

use super::{VerbCtx, VerbOutput};

/// Introspection verbs let the model see the effective surface it is
/// allowed to use, so a mismatch can be self-corrected instead of retried
/// blindly.
pub fn run(verb: Verb, ctx: &VerbCtx<'_>) -> Result<VerbOutput> {
    let out = match verb {
        Verb::Mk8Verbs => {
            let mut names: Vec<&str> = Verb::ALL.iter().map(Verb::name).collect();
            names.sort_unstable();
            names.join("\n")
        },
        Verb::Mk8Templates => {
            let mut out = String::new();
            for template in templates::catalog() {
                let _ = write!(out, "{}: {}", template.description, template.binary);
                for part in template.prefix {
                    let _ = write!(out, " {part}");
                }
                for flag in &template.flags {
                    match &flag.value {
                        Some(kind) => {
                            let _ = write!(out, " [{} <{}>]", flag.name, kind.label());
                        },
                        None => {
                            let _ = write!(out, " [{}]", flag.name);
                        },
                    }
                }
                for param in &template.params {
                    let suffix = if param.variadic { "..." } else { "" };
                    if param.required {
                        let _ = write!(out, " <{}:{}{suffix}>", param.name, param.kind.label());
                    } else {
                        let _ = write!(out, " [{}:{}{suffix}]", param.name, param.kind.label());
                    }
                }
                out.push('\n');
            }
            out.trim_end().to_string()
        },
        Verb::Mk8Vocab => {
            let mut out = String::new();
            for name in ctx.container.vocab.list_names() {
                let words = ctx.container.vocab.words(&name);
                let _ = writeln!(out, "{name} ({}): {}", words.len(), words.join(", "));
            }
            out.trim_end().to_string()
        },
        Verb::Mk8Sandbox => {
            let mut env_keys: Vec<&String> = ctx.container.env.keys().collect();
            env_keys.sort();
            serde_json::json!({
                "sandboxId": ctx.container.workspace.sandbox_id,
                "root": ctx.container.workspace.sandbox_root,
                "runAsUser": ctx.container.workspace.run_as_user,
                "envKeys": env_keys,
                "blacklistPatterns": ctx.container.gigablacklist.len(),
            })
            .to_string()
        },
        other => return Err(Error::message(format!("{other} is not an introspection verb"))),
    };
    Ok(VerbOutput::text(out))
}

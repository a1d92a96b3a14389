use std::{collections::HashMap, time::Duration};

use tracing::debug;

use crate::{
    error::{Error, Result},
    safety::env::is_readable_env,
    script::{
        fragments::{FragmentRegistry, validate_fragment_id},
        model::{Operation, Patch, PredicateKind, PredicateSpec, Script, ScriptOptions, Verb},
    },
};

/// Expansion limits. All are hard caps; exceeding any is a compile error.
pub const MAX_EXPANDED_OPS: usize = 1024;
pub const MAX_FOREACH_ITEMS: usize = 256;
pub const MAX_BATCH_ENTRIES: usize = 64;
pub const MAX_NESTING_DEPTH: usize = 3;
pub const MAX_CAPTURES: usize = 16;
pub const MAX_LABEL_LEN: usize = 64;

/// Variable names the script may never shadow with a capture.
static RESERVED_VARIABLES: &[&str] = &["WORKSPACE", "CWD", "USER", "PREV", "ITEM", "INDEX"];

/// A deferred `If` predicate re-evaluated by the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimePredicate {
    FileExists(String),
    DirExists(String),
}

/// One fully expanded primitive step.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledOp {
    pub verb: Verb,
    pub args: Vec<String>,
    pub max_retries: u32,
    pub step_timeout: Option<Duration>,
    pub label: Option<String>,
    /// Target label of `onFailure: goto:<label>`; validated forward-only.
    pub goto_on_failure: Option<String>,
    pub capture_as: Option<String>,
    pub template: Option<String>,
    pub patches: Vec<Patch>,
    pub working_directory: Option<String>,
    pub runtime_predicate: Option<RuntimePredicate>,
}

/// Compiler output: the flat operation list, resolved options, and the
/// compiled cleanup list.
#[derive(Debug, Clone)]
pub struct CompiledScript {
    pub ops: Vec<CompiledOp>,
    pub options: ScriptOptions,
    pub cleanup: Vec<CompiledOp>,
}

struct CaptureInfo {
    step_index: usize,
    /// Captures of process-spawning steps may never feed `ProcRun` args.
    tainted: bool,
}

struct CompileState<'a> {
    vars: &'a HashMap<String, String>,
    fragments: &'a FragmentRegistry,
    options: &'a ScriptOptions,
    captures: HashMap<String, CaptureInfo>,
    ops: Vec<CompiledOp>,
}

/// Compile a parsed script against a variable bag and fragment registry.
///
/// Expansion is deterministic: the same script and bag always yield the
/// same flat operation list. No script with a compile error ever reaches
/// the executor.
pub fn compile(
    script: &Script,
    vars: &HashMap<String, String>,
    fragments: &FragmentRegistry,
) -> Result<CompiledScript> {
    let ops = compile_list(&script.operations, vars, fragments, &script.options)?;
    let cleanup = compile_list(&script.cleanup, vars, fragments, &script.options)?;
    debug!(
        ops = ops.len(),
        cleanup = cleanup.len(),
        "script compiled"
    );
    Ok(CompiledScript {
        ops,
        options: script.options.clone(),
        cleanup,
    })
}

fn compile_list(
    operations: &[Operation],
    vars: &HashMap<String, String>,
    fragments: &FragmentRegistry,
    options: &ScriptOptions,
) -> Result<Vec<CompiledOp>> {
    let mut state = CompileState {
        vars,
        fragments,
        options,
        captures: HashMap::new(),
        ops: Vec::new(),
    };
    for op in operations {
        expand(op, 0, false, None, &mut state)?;
    }
    validate_labels(&state.ops)?;
    Ok(state.ops)
}

fn expand(
    op: &Operation,
    depth: usize,
    inside_foreach: bool,
    predicate: Option<&RuntimePredicate>,
    state: &mut CompileState<'_>,
) -> Result<()> {
    if depth > MAX_NESTING_DEPTH {
        return Err(Error::compile(
            op.verb.name(),
            format!("nesting deeper than {MAX_NESTING_DEPTH}"),
        ));
    }

    match op.verb {
        Verb::ForEach => expand_foreach(op, depth, inside_foreach, predicate, state),
        Verb::If => expand_if(op, depth, inside_foreach, predicate, state),
        Verb::Include => expand_include(op, depth, predicate, state),
        _ if op.verb.batch_unroll().is_some() => expand_batch(op, predicate, state),
        _ => push_primitive(op, predicate, state),
    }
}

fn expand_foreach(
    op: &Operation,
    depth: usize,
    inside_foreach: bool,
    predicate: Option<&RuntimePredicate>,
    state: &mut CompileState<'_>,
) -> Result<()> {
    if inside_foreach {
        return Err(Error::compile("ForEach", "nested ForEach is not allowed"));
    }
    let Some(spec) = &op.for_each else {
        return Err(Error::compile("ForEach", "missing forEach block"));
    };
    if spec.items.len() > MAX_FOREACH_ITEMS {
        return Err(Error::compile(
            "ForEach",
            format!("{} items exceeds the {MAX_FOREACH_ITEMS} cap", spec.items.len()),
        ));
    }
    if spec.body.verb == Verb::ForEach {
        return Err(Error::compile("ForEach", "nested ForEach is not allowed"));
    }
    for (index, item) in spec.items.iter().enumerate() {
        let mut body = (*spec.body).clone();
        for arg in &mut body.args {
            *arg = arg.replace("$ITEM", item).replace("$INDEX", &index.to_string());
        }
        // Unrolled copies would collide on a shared label.
        if index > 0 {
            body.label = None;
            body.capture_as = None;
        }
        expand(&body, depth + 1, true, predicate, state)?;
    }
    Ok(())
}

fn expand_if(
    op: &Operation,
    depth: usize,
    inside_foreach: bool,
    outer: Option<&RuntimePredicate>,
    state: &mut CompileState<'_>,
) -> Result<()> {
    let Some(spec) = &op.predicate else {
        return Err(Error::compile("If", "missing if block"));
    };
    if spec.kind.is_deferred() {
        let path = required_value(spec, "path")?;
        let runtime = match spec.kind {
            PredicateKind::FileExists => RuntimePredicate::FileExists(path),
            PredicateKind::DirExists => RuntimePredicate::DirExists(path),
            _ => unreachable!("is_deferred covers exactly these kinds"),
        };
        return expand(&spec.then, depth + 1, inside_foreach, Some(&runtime), state);
    }
    if evaluate_predicate(spec, state)? {
        expand(&spec.then, depth + 1, inside_foreach, outer, state)?;
    }
    Ok(())
}

fn required_value(spec: &PredicateSpec, what: &str) -> Result<String> {
    spec.value
        .clone()
        .ok_or_else(|| Error::compile("If", format!("{:?} predicate needs a {what}", spec.kind)))
}

fn required_name(spec: &PredicateSpec) -> Result<String> {
    spec.name
        .clone()
        .ok_or_else(|| Error::compile("If", format!("{:?} predicate needs a name", spec.kind)))
}

fn evaluate_predicate(spec: &PredicateSpec, state: &CompileState<'_>) -> Result<bool> {
    let prev = state.vars.get("PREV").map(String::as_str).unwrap_or("");
    Ok(match spec.kind {
        PredicateKind::PrevEmpty => prev.trim().is_empty(),
        PredicateKind::PrevContains => prev.contains(&required_value(spec, "value")?),
        PredicateKind::PrevStartsWith => prev.starts_with(&required_value(spec, "value")?),
        PredicateKind::PrevEndsWith => prev.ends_with(&required_value(spec, "value")?),
        PredicateKind::PrevEquals => prev == required_value(spec, "value")?,
        PredicateKind::PrevMatch => {
            let pattern = required_value(spec, "regex")?;
            let re = build_regex(&pattern)?;
            re.is_match(prev)
        },
        PredicateKind::PrevLineCount => {
            let expected: usize = required_value(spec, "count")?.parse().map_err(|_| {
                Error::compile("If", "PrevLineCount needs an integer value")
            })?;
            prev.lines().count() == expected
        },
        PredicateKind::CaptureEmpty => {
            let name = required_name(spec)?;
            state
                .vars
                .get(&name)
                .map(|v| v.trim().is_empty())
                .unwrap_or(true)
        },
        PredicateKind::CaptureContains => {
            let name = required_name(spec)?;
            let needle = required_value(spec, "value")?;
            state
                .vars
                .get(&name)
                .is_some_and(|v| v.contains(&needle))
        },
        PredicateKind::EnvEquals => {
            let name = required_name(spec)?;
            if !is_readable_env(&name) {
                return Err(Error::compile(
                    "If",
                    format!("env var {name:?} is not on the read allowlist"),
                ));
            }
            let expected = required_value(spec, "value")?;
            std::env::var(&name).map(|v| v == expected).unwrap_or(false)
        },
        PredicateKind::FileExists | PredicateKind::DirExists => {
            unreachable!("deferred predicates handled in expand_if")
        },
    })
}

/// Regex with bounded size; the regex crate has no backtracking, so bounding
/// the pattern and input bounds the work.
pub(crate) fn build_regex(pattern: &str) -> Result<regex::Regex> {
    if pattern.len() > 512 {
        return Err(Error::compile("If", "regex pattern longer than 512 chars"));
    }
    regex::RegexBuilder::new(pattern)
        .size_limit(1 << 20)
        .build()
        .map_err(|e| Error::compile("If", format!("invalid regex: {e}")))
}

fn expand_batch(
    op: &Operation,
    predicate: Option<&RuntimePredicate>,
    state: &mut CompileState<'_>,
) -> Result<()> {
    let Some((single, arity)) = op.verb.batch_unroll() else {
        unreachable!("caller checked batch_unroll");
    };
    if op.label.is_some() || op.capture_as.is_some() {
        return Err(Error::compile(
            op.verb.name(),
            "label and captureAs are not supported on batch verbs",
        ));
    }
    if op.args.is_empty() || op.args.len() % arity != 0 {
        return Err(Error::compile(
            op.verb.name(),
            format!("args must come in groups of {arity}"),
        ));
    }
    let entries = op.args.len() / arity;
    if entries > MAX_BATCH_ENTRIES {
        return Err(Error::compile(
            op.verb.name(),
            format!("{entries} entries exceeds the {MAX_BATCH_ENTRIES} cap"),
        ));
    }
    for chunk in op.args.chunks(arity) {
        let unrolled = Operation {
            verb: single,
            args: chunk.to_vec(),
            label: None,
            capture_as: None,
            for_each: None,
            predicate: None,
            ..op.clone()
        };
        push_primitive(&unrolled, predicate, state)?;
    }
    Ok(())
}

fn expand_include(
    op: &Operation,
    depth: usize,
    predicate: Option<&RuntimePredicate>,
    state: &mut CompileState<'_>,
) -> Result<()> {
    let Some(id) = op.args.first() else {
        return Err(Error::compile("Include", "missing fragment id"));
    };
    validate_fragment_id(id)?;
    let fragment = state.fragments.get(id)?.to_vec();
    for inner in &fragment {
        if inner.verb == Verb::Include {
            return Err(Error::compile("Include", "fragments cannot include fragments"));
        }
        expand(inner, depth + 1, false, predicate, state)?;
    }
    Ok(())
}

fn push_primitive(
    op: &Operation,
    predicate: Option<&RuntimePredicate>,
    state: &mut CompileState<'_>,
) -> Result<()> {
    if state.ops.len() >= MAX_EXPANDED_OPS {
        return Err(Error::compile(
            op.verb.name(),
            format!("expanded script exceeds {MAX_EXPANDED_OPS} operations"),
        ));
    }
    if op.verb.is_compile_only() {
        return Err(Error::compile(op.verb.name(), "not a primitive verb"));
    }

    let step_index = state.ops.len();
    let args = resolve_args(op, step_index, state)?;
    let working_directory = op
        .working_directory
        .as_ref()
        .map(|raw| resolve_one(raw, op.verb, step_index, state))
        .transpose()?;

    if let Some(label) = &op.label {
        validate_label(label)?;
    }
    let goto_on_failure = match &op.on_failure {
        None => None,
        Some(raw) => {
            let Some(target) = raw.strip_prefix("goto:") else {
                return Err(Error::compile(
                    op.verb.name(),
                    format!("onFailure {raw:?} must be goto:<label>"),
                ));
            };
            validate_label(target)?;
            Some(target.to_string())
        },
    };

    if let Some(name) = &op.capture_as {
        register_capture(name, op.verb, step_index, state)?;
    }

    state.ops.push(CompiledOp {
        verb: op.verb,
        args,
        max_retries: op.max_retries.unwrap_or(state.options.max_retries),
        step_timeout: op.step_timeout.map(|t| t.0),
        label: op.label.clone(),
        goto_on_failure,
        capture_as: op.capture_as.clone(),
        template: op.template.clone(),
        patches: op.patches.clone(),
        working_directory,
        runtime_predicate: predicate.cloned(),
    });
    Ok(())
}

fn register_capture(
    name: &str,
    verb: Verb,
    step_index: usize,
    state: &mut CompileState<'_>,
) -> Result<()> {
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        || name.chars().next().is_some_and(|c| c.is_ascii_digit())
    {
        return Err(Error::compile(
            verb.name(),
            format!("captureAs {name:?} is not a valid identifier"),
        ));
    }
    if RESERVED_VARIABLES.contains(&name) {
        return Err(Error::compile(
            verb.name(),
            format!("captureAs {name:?} shadows a reserved variable"),
        ));
    }
    if state.vars.contains_key(name) {
        return Err(Error::compile(
            verb.name(),
            format!("captureAs {name:?} shadows an existing variable"),
        ));
    }
    if state.captures.contains_key(name) {
        return Err(Error::compile(
            verb.name(),
            format!("captureAs {name:?} is already captured"),
        ));
    }
    if state.captures.len() >= MAX_CAPTURES {
        return Err(Error::compile(
            verb.name(),
            format!("more than {MAX_CAPTURES} captures"),
        ));
    }
    state.captures.insert(
        name.to_string(),
        CaptureInfo {
            step_index,
            tainted: verb.spawns_process(),
        },
    );
    Ok(())
}

/// Compile-time variable substitution over every arg. Bag variables are
/// inlined now; `$PREV` and capture references stay in place for the
/// executor, after their validity is proven here.
fn resolve_args(
    op: &Operation,
    step_index: usize,
    state: &CompileState<'_>,
) -> Result<Vec<String>> {
    let mut out = Vec::with_capacity(op.args.len());
    for arg in &op.args {
        out.push(resolve_one(arg, op.verb, step_index, state)?);
    }
    Ok(out)
}

fn resolve_one(
    arg: &str,
    verb: Verb,
    step_index: usize,
    state: &CompileState<'_>,
) -> Result<String> {
    let mut result = String::with_capacity(arg.len());
    let bytes = arg.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'$' {
            let ch_len = arg[i..].chars().next().map(char::len_utf8).unwrap_or(1);
            result.push_str(&arg[i..i + ch_len]);
            i += ch_len;
            continue;
        }
        let rest = &arg[i + 1..];
        let name_len = rest
            .char_indices()
            .take_while(|(_, c)| c.is_ascii_alphanumeric() || *c == '_')
            .map(|(idx, c)| idx + c.len_utf8())
            .last()
            .unwrap_or(0);
        if name_len == 0 {
            result.push('$');
            i += 1;
            continue;
        }
        let name = &rest[..name_len];
        i += 1 + name_len;

        if name == "PREV" {
            if !state.options.pipe_step_output {
                return Err(Error::compile(
                    verb.name(),
                    "$PREV requires pipeStepOutput: true",
                ));
            }
            if verb.spawns_process() {
                return Err(Error::compile(
                    verb.name(),
                    "$PREV may not appear in ProcRun args",
                ));
            }
            result.push_str("$PREV");
            continue;
        }
        if let Some(info) = state.captures.get(name) {
            if info.step_index >= step_index {
                return Err(Error::compile(
                    verb.name(),
                    format!("capture ${name} referenced before its step completes"),
                ));
            }
            if verb.spawns_process() && info.tainted {
                return Err(Error::compile(
                    verb.name(),
                    format!("capture ${name} holds process output and may not reach ProcRun"),
                ));
            }
            result.push('$');
            result.push_str(name);
            continue;
        }
        if let Some(value) = state.vars.get(name) {
            result.push_str(value);
            continue;
        }
        return Err(Error::compile(verb.name(), format!("unknown variable ${name}")));
    }
    Ok(result)
}

fn validate_label(label: &str) -> Result<()> {
    if label.is_empty() || label.len() > MAX_LABEL_LEN {
        return Err(Error::compile(
            "label",
            format!("label {label:?} must be 1..={MAX_LABEL_LEN} chars"),
        ));
    }
    if !label
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(Error::compile(
            "label",
            format!("label {label:?} has invalid characters"),
        ));
    }
    Ok(())
}

/// Post-expansion jump validation: unique labels, defined targets, and
/// strictly forward jumps — the jump graph is acyclic by construction.
fn validate_labels(ops: &[CompiledOp]) -> Result<()> {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    for (index, op) in ops.iter().enumerate() {
        if let Some(label) = &op.label {
            if positions.insert(label.as_str(), index).is_some() {
                return Err(Error::compile(
                    op.verb.name(),
                    format!("duplicate label {label:?}"),
                ));
            }
        }
    }
    for (index, op) in ops.iter().enumerate() {
        if let Some(target) = &op.goto_on_failure {
            let Some(&target_index) = positions.get(target.as_str()) else {
                return Err(Error::compile(
                    op.verb.name(),
                    format!("goto target {target:?} is not defined"),
                ));
            };
            if target_index <= index {
                return Err(Error::compile(
                    op.verb.name(),
                    format!("goto {target:?} must jump forward"),
                ));
            }
        }
    }
    Ok(())
}

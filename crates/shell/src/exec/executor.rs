use std::{collections::HashMap, path::PathBuf, time::Duration};

use {
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{
    error::{Error, Result},
    exec::verbs::{self, VerbCtx},
    safety,
    sandbox::TaskContainer,
    script::{CompiledOp, CompiledScript, FailureMode, RuntimePredicate, Verb},
};

/// Retry backoff doubles up to this ceiling.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Completed,
    Failed,
    /// Runtime predicate did not hold; the step never ran.
    Skipped,
}

/// Result of one executed (or skipped) step.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub index: usize,
    pub verb: Verb,
    pub status: StepStatus,
    pub attempts: u32,
    pub stdout: String,
    pub stderr: String,
    pub error: Option<String>,
}

/// Result of a whole script run. Runtime step failures live here; only
/// pre-execution and infrastructure failures surface as `Err` from
/// [`Executor::run`].
#[derive(Debug, Clone)]
pub struct ScriptOutcome {
    pub success: bool,
    pub steps: Vec<StepOutcome>,
    /// Stdout of the last completed step.
    pub final_output: String,
    pub captures: HashMap<String, String>,
    pub cleanup_ran: bool,
}

/// Runs a compiled script inside its task container. The container is
/// consumed — one executor, one invocation.
pub struct Executor {
    container: TaskContainer,
}

impl Executor {
    #[must_use]
    pub fn new(container: TaskContainer) -> Self {
        Self { container }
    }

    /// Execute the script under its wall-clock budget. Cancellation is
    /// observed at step boundaries and during retry delays.
    pub async fn run(
        self,
        script: CompiledScript,
        cancel: CancellationToken,
    ) -> Result<ScriptOutcome> {
        let budget = script.options.script_timeout.0;
        match tokio::time::timeout(budget, self.run_inner(script, cancel)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::message(format!(
                "script exceeded its {}s wall-clock budget",
                budget.as_secs()
            ))),
        }
    }

    async fn run_inner(
        self,
        script: CompiledScript,
        cancel: CancellationToken,
    ) -> Result<ScriptOutcome> {
        let options = &script.options;
        let label_positions: HashMap<&str, usize> = script
            .ops
            .iter()
            .enumerate()
            .filter_map(|(i, op)| op.label.as_deref().map(|l| (l, i)))
            .collect();

        let mut outcome = ScriptOutcome {
            success: true,
            steps: Vec::new(),
            final_output: String::new(),
            captures: HashMap::new(),
            cleanup_ran: false,
        };
        let mut prev: Option<String> = None;

        let mut index = 0;
        while index < script.ops.len() {
            if cancel.is_cancelled() {
                return Err(Error::message("script cancelled"));
            }
            let op = &script.ops[index];

            if let Some(predicate) = &op.runtime_predicate
                && !self.predicate_holds(predicate)
            {
                debug!(step = index, "runtime predicate false, step skipped");
                outcome.steps.push(StepOutcome {
                    index,
                    verb: op.verb,
                    status: StepStatus::Skipped,
                    attempts: 0,
                    stdout: String::new(),
                    stderr: String::new(),
                    error: None,
                });
                index += 1;
                continue;
            }

            let step = self
                .run_step(op, index, options, prev.as_deref(), &outcome.captures, &cancel)
                .await?;

            let failed = step.status == StepStatus::Failed;
            if step.status == StepStatus::Completed {
                if let Some(name) = &op.capture_as {
                    outcome.captures.insert(name.clone(), step.stdout.clone());
                }
                if options.pipe_step_output {
                    prev = Some(step.stdout.clone());
                }
                outcome.final_output = step.stdout.clone();
            }
            outcome.steps.push(step);

            if failed {
                if let Some(target) = &op.goto_on_failure {
                    // Forward-only by construction.
                    let target_index = label_positions[target.as_str()];
                    debug!(step = index, target = %target, "onFailure jump");
                    index = target_index;
                    continue;
                }
                match options.failure_mode {
                    FailureMode::ContinueOnError => {
                        index += 1;
                        continue;
                    },
                    FailureMode::StopOnFirstError => {
                        outcome.success = false;
                        break;
                    },
                    FailureMode::StopAndCleanup => {
                        outcome.success = false;
                        self.run_cleanup(&script, &mut outcome, prev.as_deref()).await;
                        break;
                    },
                }
            }
            index += 1;
        }

        outcome.success = outcome.success
            && outcome
                .steps
                .iter()
                .all(|s| s.status != StepStatus::Failed);
        info!(
            steps = outcome.steps.len(),
            success = outcome.success,
            "script finished"
        );
        Ok(outcome)
    }

    /// Cleanup failures never abort cleanup.
    async fn run_cleanup(
        &self,
        script: &CompiledScript,
        outcome: &mut ScriptOutcome,
        prev: Option<&str>,
    ) {
        outcome.cleanup_ran = true;
        for (offset, op) in script.cleanup.iter().enumerate() {
            let index = script.ops.len() + offset;
            match self
                .run_step(op, index, &script.options, prev, &outcome.captures, &CancellationToken::new())
                .await
            {
                Ok(step) => outcome.steps.push(step),
                Err(e) => {
                    warn!(step = index, error = %e, "cleanup step errored, continuing");
                    outcome.steps.push(StepOutcome {
                        index,
                        verb: op.verb,
                        status: StepStatus::Failed,
                        attempts: 1,
                        stdout: String::new(),
                        stderr: String::new(),
                        error: Some(e.to_string()),
                    });
                },
            }
        }
    }

    fn predicate_holds(&self, predicate: &RuntimePredicate) -> bool {
        let root = &self.container.workspace.sandbox_root;
        match predicate {
            RuntimePredicate::FileExists(path) => safety::resolve(path, root)
                .map(|p| p.is_file())
                .unwrap_or(false),
            RuntimePredicate::DirExists(path) => safety::resolve(path, root)
                .map(|p| p.is_dir())
                .unwrap_or(false),
        }
    }

    fn step_working_dir(&self, raw: Option<&str>) -> Result<PathBuf> {
        match raw {
            None => Ok(self.container.workspace.working_directory.clone()),
            Some(raw) => {
                let resolved =
                    safety::resolve(raw, &self.container.workspace.sandbox_root)?;
                if !resolved.is_dir() {
                    return Err(Error::message(format!(
                        "working directory {} does not exist",
                        resolved.display()
                    )));
                }
                Ok(resolved)
            },
        }
    }

    async fn run_step(
        &self,
        op: &CompiledOp,
        index: usize,
        options: &crate::script::ScriptOptions,
        prev: Option<&str>,
        captures: &HashMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<StepOutcome> {
        let args = substitute_runtime(&op.args, captures, prev, options.pipe_step_output);
        let raw_working_dir = op.working_directory.as_ref().map(|raw| {
            substitute_runtime(
                std::slice::from_ref(raw),
                captures,
                prev,
                options.pipe_step_output,
            )
            .swap_remove(0)
        });
        let working_dir = self.step_working_dir(raw_working_dir.as_deref())?;

        let timeout = op
            .step_timeout
            .map_or(options.step_timeout.0, |t| t.min(options.step_timeout.0));
        let max_attempts = op.max_retries.saturating_add(1);
        let mut delay = options.retry_delay.0;

        let ctx = VerbCtx {
            container: &self.container,
            working_dir: &working_dir,
            max_output_bytes: options.max_output_bytes,
            max_error_bytes: options.max_error_bytes,
        };

        let mut attempts = 0u32;
        let mut last_error: Option<Error> = None;
        while attempts < max_attempts {
            attempts += 1;

            // Captured values and $PREV may smuggle patterns the original
            // args did not carry, so the blacklist runs on the final args.
            let screened = self.container.gigablacklist.check_all(&args);

            let result = match screened {
                Err(e) => Err(e),
                Ok(()) => {
                    match tokio::time::timeout(
                        timeout,
                        verbs::dispatch(op.verb, &args, &op.patches, &ctx),
                    )
                    .await
                    {
                        Err(_) => Err(Error::StepTimeout {
                            step: index,
                            seconds: timeout.as_secs(),
                        }),
                        Ok(Err(e)) => Err(e),
                        Ok(Ok(output)) if output.exit_code != 0 => {
                            Err(Error::StepFailed {
                                step: index,
                                message: format!(
                                    "exit code {}: {}",
                                    output.exit_code,
                                    output.stderr.trim()
                                ),
                            })
                        },
                        Ok(Ok(output)) => Ok(output),
                    }
                },
            };

            match result {
                Ok(mut output) => {
                    truncate_with_marker(&mut output.stdout, options.max_output_bytes);
                    truncate_with_marker(&mut output.stderr, options.max_error_bytes);
                    return Ok(StepOutcome {
                        index,
                        verb: op.verb,
                        status: StepStatus::Completed,
                        attempts,
                        stdout: output.stdout,
                        stderr: output.stderr,
                        error: None,
                    });
                },
                Err(e) => {
                    let retryable = !e.is_safety_failure() && attempts < max_attempts;
                    warn!(step = index, verb = %op.verb, attempt = attempts, error = %e, retryable, "step failed");
                    last_error = Some(e);
                    if !retryable {
                        break;
                    }
                    tokio::select! {
                        () = cancel.cancelled() => return Err(Error::message("script cancelled")),
                        () = tokio::time::sleep(delay) => {},
                    }
                    delay = (delay * 2).min(MAX_RETRY_DELAY);
                },
            }
        }

        Ok(StepOutcome {
            index,
            verb: op.verb,
            status: StepStatus::Failed,
            attempts,
            stdout: String::new(),
            stderr: String::new(),
            error: last_error.map(|e| e.to_string()),
        })
    }
}

fn truncate_with_marker(output: &mut String, cap: usize) {
    if output.len() <= cap {
        return;
    }
    output.truncate(output.floor_char_boundary(cap));
    output.push_str("\n... [output truncated]");
}

/// Bind `$PREV` and capture references. Replacement text is emitted
/// verbatim — values are never re-scanned for further substitution.
fn substitute_runtime(
    args: &[String],
    captures: &HashMap<String, String>,
    prev: Option<&str>,
    pipe: bool,
) -> Vec<String> {
    args.iter()
        .map(|arg| {
            let mut out = String::with_capacity(arg.len());
            let mut rest = arg.as_str();
            while let Some(at) = rest.find('$') {
                out.push_str(&rest[..at]);
                rest = &rest[at + 1..];
                let name_len = rest
                    .char_indices()
                    .take_while(|(_, c)| c.is_ascii_alphanumeric() || *c == '_')
                    .map(|(idx, c)| idx + c.len_utf8())
                    .last()
                    .unwrap_or(0);
                let name = &rest[..name_len];
                if pipe && name == "PREV" {
                    out.push_str(prev.unwrap_or(""));
                } else if let Some(value) = captures.get(name) {
                    out.push_str(value);
                } else {
                    out.push('$');
                    out.push_str(name);
                }
                rest = &rest[name_len..];
            }
            out.push_str(rest);
            out
        })
        .collect()
}

use tracing::{debug, info};

use crate::{
    error::{Error, Result},
    safety::env::{ALLOWED_ENV_NAMES, read_process_env},
    script::Verb,
    templates,
};

use super::{VerbCtx, VerbOutput, arg};

fn truncate_with_marker(output: &mut String, cap: usize) {
    if output.len() <= cap {
        return;
    }
    output.truncate(output.floor_char_boundary(cap));
    output.push_str("\n... [output truncated]");
}

/// `ProcRun <binary> [args...]`
///
/// The only verb that spawns a process. Arguments are passed as an argument
/// list — no shell, no globbing, no string interpretation — after the
/// command-template whitelist accepts the exact invocation. The child sees
/// nothing of the parent env beyond the read allowlist.
pub async fn run(args: &[String], ctx: &VerbCtx<'_>) -> Result<VerbOutput> {
    let binary = arg(args, 0, Verb::ProcRun)?;
    let proc_args: Vec<String> = args[1..].to_vec();

    let matched = templates::validate(binary, &proc_args, &ctx.container.validation_ctx())?;
    info!(binary, template = matched, "proc run");

    let mut cmd = tokio::process::Command::new(binary);
    cmd.args(&proc_args)
        .current_dir(ctx.working_dir)
        .env_clear()
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true);
    for name in ALLOWED_ENV_NAMES {
        if let Ok(Some(value)) = read_process_env(name) {
            cmd.env(name, value);
        }
    }

    let output = cmd
        .output()
        .await
        .map_err(|e| Error::message(format!("failed to start {binary}: {e}")))?;

    let mut stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let mut stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    truncate_with_marker(&mut stdout, ctx.max_output_bytes);
    truncate_with_marker(&mut stderr, ctx.max_error_bytes);
    let exit_code = output.status.code().unwrap_or(-1);
    debug!(
        binary,
        exit_code,
        stdout_len = stdout.len(),
        stderr_len = stderr.len(),
        "proc done"
    );

    Ok(VerbOutput {
        stdout,
        stderr,
        exit_code,
    })
}

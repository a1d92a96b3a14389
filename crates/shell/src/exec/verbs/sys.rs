use sysinfo::System;

use crate::{
    error::{Error, Result},
    safety::env::{ALLOWED_ENV_NAMES, read_process_env},
    script::Verb,
};

use super::{VerbCtx, VerbOutput, arg};

pub fn run(verb: Verb, args: &[String], ctx: &VerbCtx<'_>) -> Result<VerbOutput> {
    let out = match verb {
        Verb::EnvGet => {
            let name = arg(args, 0, verb)?;
            read_process_env(name)?.unwrap_or_default()
        },
        Verb::EnvList => {
            // Only allowlisted names that are actually set.
            let mut lines: Vec<String> = Vec::new();
            for name in ALLOWED_ENV_NAMES {
                if let Ok(Some(value)) = read_process_env(name) {
                    lines.push(format!("{name}={value}"));
                }
            }
            lines.join("\n")
        },
        Verb::WhoAmI => ctx.container.workspace.run_as_user.clone(),
        Verb::HostName => hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .map_err(|e| Error::message(format!("cannot read hostname: {e}")))?,
        Verb::SysInfo => serde_json::json!({
            "os": System::name(),
            "kernel": System::kernel_version(),
            "osVersion": System::os_version(),
            "arch": std::env::consts::ARCH,
        })
        .to_string(),
        Verb::SysUptime => System::uptime().to_string(),
        Verb::SysMemory => {
            let mut system = System::new();
            system.refresh_memory();
            serde_json::json!({
                "totalBytes": system.total_memory(),
                "usedBytes": system.used_memory(),
                "availableBytes": system.available_memory(),
            })
            .to_string()
        },
        Verb::SysCpus => {
            let mut system = System::new();
            system.refresh_cpu_all();
            system.cpus().len().to_string()
        },
        Verb::SysDisks => {
            let disks = sysinfo::Disks::new_with_refreshed_list();
            let entries: Vec<serde_json::Value> = disks
                .iter()
                .map(|d| {
                    serde_json::json!({
                        "mountPoint": d.mount_point().to_string_lossy(),
                        "totalBytes": d.total_space(),
                        "availableBytes": d.available_space(),
                    })
                })
                .collect();
            serde_json::Value::Array(entries).to_string()
        },
        other => return Err(Error::message(format!("{other} is not a system verb"))),
    };
    Ok(VerbOutput::text(out))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::sandbox::{TaskContainer, container::seed_sandbox},
        sharpclaw_config::GlobalEnv,
        std::sync::Arc,
    };

    fn a(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    struct Fixture {
        _app: tempfile::TempDir,
        _sand: tempfile::TempDir,
        container: TaskContainer,
    }

    impl Fixture {
        fn new(env: &str) -> Self {
            let app = tempfile::tempdir().unwrap();
            let sand = tempfile::tempdir().unwrap();
            let registry = seed_sandbox(app.path(), "demo", sand.path(), env);
            let container =
                TaskContainer::create_with_global(&registry, "demo", Arc::new(GlobalEnv::default()))
                    .unwrap();
            Self {
                _app: app,
                _sand: sand,
                container,
            }
        }

        fn ctx(&self) -> VerbCtx<'_> {
            VerbCtx {
                container: &self.container,
                working_dir: &self.container.workspace.working_directory,
                max_output_bytes: 1 << 20,
                max_error_bytes: 1 << 18,
            }
        }
    }

    #[test]
    fn test_env_allowlist_enforced() {
        let f = Fixture::new("");
        assert!(run(Verb::EnvGet, &a(&["AWS_SECRET_ACCESS_KEY"]), &f.ctx()).is_err());
        // An allowlisted but unset var yields empty output, not an error.
        assert!(run(Verb::EnvGet, &a(&["DOTNET_ROOT"]), &f.ctx()).is_ok());
    }

    #[test]
    fn test_env_list_only_allowlisted() {
        let f = Fixture::new("");
        let out = run(Verb::EnvList, &a(&[]), &f.ctx()).unwrap();
        for line in out.stdout.lines() {
            let name = line.split('=').next().unwrap();
            assert!(ALLOWED_ENV_NAMES.contains(&name), "{name} leaked");
        }
    }

    #[test]
    fn test_whoami_uses_run_as() {
        let f = Fixture::new("MK8_RUN_AS=builder\n");
        let out = run(Verb::WhoAmI, &a(&[]), &f.ctx()).unwrap();
        assert_eq!(out.stdout, "builder");
    }

    #[test]
    fn test_sys_shapes() {
        let f = Fixture::new("");
        let mem = run(Verb::SysMemory, &a(&[]), &f.ctx()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&mem.stdout).unwrap();
        assert!(value["totalBytes"].as_u64().unwrap() > 0);
        let cpus = run(Verb::SysCpus, &a(&[]), &f.ctx()).unwrap();
        assert!(cpus.stdout.parse::<usize>().unwrap() >= 1);
    }
}

use crate::templates::{
    CommandTemplate, FlagSpec, ParamSlot, SlotKind,
    freetext::FreeTextRule,
    slot::UrlList,
};

/// The full registered template catalog. Fixed at compile time; runtime
/// input only widens slot vocabularies, never the catalog itself.
#[must_use]
pub fn catalog() -> Vec<CommandTemplate> {
    let mut templates = Vec::new();
    templates.extend(git_templates());
    templates.extend(dotnet_templates());
    templates
}

fn git_templates() -> Vec<CommandTemplate> {
    let read_path = || SlotKind::SandboxPath { write: false };
    let refname = || SlotKind::FreeText(FreeTextRule::GitTagName);

    vec![
        CommandTemplate {
            description: "git status",
            binary: "git",
            prefix: &["status"],
            flags: vec![
                FlagSpec::bare("--short"),
                FlagSpec::bare("--branch"),
                FlagSpec::bare("--porcelain"),
            ],
            params: vec![],
        },
        CommandTemplate {
            description: "git add",
            binary: "git",
            prefix: &["add"],
            flags: vec![],
            params: vec![ParamSlot::variadic("path", read_path(), true)],
        },
        CommandTemplate {
            description: "git commit",
            binary: "git",
            prefix: &["commit"],
            flags: vec![
                FlagSpec::bare("--all"),
                FlagSpec::with_value("-m", SlotKind::FreeText(FreeTextRule::Plain)),
            ],
            params: vec![],
        },
        CommandTemplate {
            description: "git checkout",
            binary: "git",
            prefix: &["checkout"],
            flags: vec![],
            params: vec![ParamSlot::required("ref", refname())],
        },
        CommandTemplate {
            description: "git switch",
            binary: "git",
            prefix: &["switch"],
            flags: vec![FlagSpec::bare("--create")],
            params: vec![ParamSlot::required("branch", refname())],
        },
        CommandTemplate {
            description: "git log",
            binary: "git",
            prefix: &["log"],
            flags: vec![
                FlagSpec::bare("--oneline"),
                FlagSpec::bare("--stat"),
                FlagSpec::with_value("-n", SlotKind::IntRange { min: 1, max: 1000 }),
            ],
            params: vec![],
        },
        CommandTemplate {
            description: "git diff",
            binary: "git",
            prefix: &["diff"],
            flags: vec![FlagSpec::bare("--stat"), FlagSpec::bare("--cached")],
            params: vec![ParamSlot::variadic("path", read_path(), false)],
        },
        CommandTemplate {
            description: "git branch",
            binary: "git",
            prefix: &["branch"],
            flags: vec![FlagSpec::bare("--list"), FlagSpec::bare("--all")],
            params: vec![ParamSlot::optional("name", refname())],
        },
        CommandTemplate {
            description: "git remote",
            binary: "git",
            prefix: &["remote"],
            flags: vec![FlagSpec::bare("-v")],
            params: vec![],
        },
        CommandTemplate {
            description: "git remote add",
            binary: "git",
            prefix: &["remote", "add"],
            flags: vec![],
            params: vec![
                ParamSlot::required("name", refname()),
                ParamSlot::required("url", SlotKind::AllowedUrl(UrlList::GitRemotes)),
            ],
        },
        CommandTemplate {
            description: "git clone",
            binary: "git",
            prefix: &["clone"],
            flags: vec![],
            params: vec![
                ParamSlot::required("url", SlotKind::AllowedUrl(UrlList::CloneUrls)),
                ParamSlot::optional("dir", SlotKind::SandboxPath { write: true }),
            ],
        },
        CommandTemplate {
            description: "git tag",
            binary: "git",
            prefix: &["tag"],
            flags: vec![],
            params: vec![
                ParamSlot::required("name", refname()),
                ParamSlot::optional("rev", refname()),
            ],
        },
        CommandTemplate {
            description: "git ls-files",
            binary: "git",
            prefix: &["ls-files"],
            flags: vec![FlagSpec::bare("--cached"), FlagSpec::bare("--others")],
            params: vec![],
        },
        CommandTemplate {
            description: "git rev-parse",
            binary: "git",
            prefix: &["rev-parse"],
            flags: vec![FlagSpec::bare("--short")],
            params: vec![ParamSlot::optional("rev", refname())],
        },
        CommandTemplate {
            description: "git describe",
            binary: "git",
            prefix: &["describe"],
            flags: vec![FlagSpec::bare("--tags"), FlagSpec::bare("--always")],
            params: vec![],
        },
        CommandTemplate {
            description: "git stash list",
            binary: "git",
            prefix: &["stash"],
            flags: vec![],
            params: vec![ParamSlot::optional(
                "subcommand",
                SlotKind::Choice(&["list", "show"]),
            )],
        },
        CommandTemplate {
            description: "git blame",
            binary: "git",
            prefix: &["blame"],
            flags: vec![],
            params: vec![ParamSlot::required("path", read_path())],
        },
        CommandTemplate {
            description: "git clean (dry run)",
            binary: "git",
            prefix: &["clean", "--dry-run"],
            flags: vec![],
            params: vec![],
        },
        CommandTemplate {
            description: "git count-objects",
            binary: "git",
            prefix: &["count-objects"],
            flags: vec![FlagSpec::bare("-v")],
            params: vec![],
        },
        CommandTemplate {
            description: "git cherry",
            binary: "git",
            prefix: &["cherry"],
            flags: vec![FlagSpec::bare("-v")],
            params: vec![],
        },
        CommandTemplate {
            description: "git shortlog",
            binary: "git",
            prefix: &["shortlog"],
            flags: vec![FlagSpec::bare("-s"), FlagSpec::bare("-n")],
            params: vec![],
        },
        CommandTemplate {
            description: "git rev-list count",
            binary: "git",
            prefix: &["rev-list", "--count"],
            flags: vec![],
            params: vec![ParamSlot::required("rev", refname())],
        },
    ]
}

fn dotnet_templates() -> Vec<CommandTemplate> {
    let configuration = || {
        FlagSpec::with_value(
            "--configuration",
            SlotKind::Choice(&["Debug", "Release"]),
        )
    };
    let project = || SlotKind::CompoundName;

    vec![
        CommandTemplate {
            description: "dotnet build",
            binary: "dotnet",
            prefix: &["build"],
            flags: vec![configuration(), FlagSpec::bare("--no-restore")],
            params: vec![ParamSlot::optional("project", project())],
        },
        CommandTemplate {
            description: "dotnet test",
            binary: "dotnet",
            prefix: &["test"],
            flags: vec![
                configuration(),
                FlagSpec::bare("--no-build"),
                FlagSpec::with_value("--filter", SlotKind::FreeText(FreeTextRule::Plain)),
            ],
            params: vec![ParamSlot::optional("project", project())],
        },
        CommandTemplate {
            description: "dotnet restore",
            binary: "dotnet",
            prefix: &["restore"],
            flags: vec![],
            params: vec![ParamSlot::optional("project", project())],
        },
        CommandTemplate {
            description: "dotnet run",
            binary: "dotnet",
            prefix: &["run"],
            flags: vec![
                configuration(),
                FlagSpec::with_value("--project", project()),
            ],
            params: vec![],
        },
        CommandTemplate {
            description: "dotnet ef migrations add",
            binary: "dotnet",
            prefix: &["ef", "migrations", "add"],
            flags: vec![FlagSpec::with_value("--project", project())],
            params: vec![ParamSlot::required(
                "name",
                SlotKind::FreeText(FreeTextRule::MigrationIdentifier),
            )],
        },
    ]
}

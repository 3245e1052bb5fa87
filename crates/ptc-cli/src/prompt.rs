//! System prompt for the `ptc` binary.

use std::path::Path;

use ptc_rs::agent::ptc_prompt_builder;
use ptc_rs::skills::Registry;

/// The library's default prompt plus a note about the workspace.
///
/// A skills directory inside the workspace is shown relative to it, since
/// that is how commands running there reach it.
pub fn cli_system_prompt(registry: &Registry, workspace: &Path, skills_dir: &Path) -> String {
    let skills = skills_dir.strip_prefix(workspace).unwrap_or(skills_dir);
    ptc_prompt_builder(registry, skills)
        .section(
            "Workspace",
            format!(
                "Commands run in `{}`. Files you create are written there. \
                 Keep your work inside it.",
                workspace.display()
            ),
        )
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_names_workspace() {
        let prompt = cli_system_prompt(&Registry::empty(), Path::new("/work"), Path::new("/work/skills"));
        assert!(prompt.contains("## Workspace"));
        assert!(prompt.contains("`/work`"));
    }

    #[test]
    fn skills_dir_is_relative_to_workspace() {
        let registry = crate::tools::builtin_functions(Path::new("/work"))
            .into_iter()
            .fold(Registry::builder(), |b, f| b.local(f))
            .build()
            .unwrap();
        let inside = cli_system_prompt(&registry, Path::new("/work"), Path::new("/work/skills"));
        assert!(inside.contains("`cat skills/SKILL.md`"));
        let outside = cli_system_prompt(&registry, Path::new("/work"), Path::new("/opt/skills"));
        assert!(outside.contains("`cat /opt/skills/SKILL.md`"));
    }
}

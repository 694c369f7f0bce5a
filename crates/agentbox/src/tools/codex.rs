use super::ToolParams;
use crate::model::SandboxMode;

pub(super) const DESCRIPTION: &str = "Ask Codex to review code: quality, likely bugs, and whether the \
requirement is met, ending with a clear verdict (pass, suggest changes, or must fix). Codex only \
reviews and never edits, so the default sandbox is read-only.";

/// `codex exec --json`; the trailing `-` makes it read the prompt from stdin.
pub(super) fn argv(params: &ToolParams, sandbox: SandboxMode) -> Vec<String> {
    let mut argv: Vec<String> = vec!["codex".into(), "exec".into(), "--json".into()];
    let yolo = params.yolo.unwrap_or(false);
    if yolo {
        argv.push("--dangerously-bypass-approvals-and-sandbox".into());
    } else {
        argv.push("--sandbox".into());
        argv.push(sandbox.as_str().into());
    }
    if params.skip_git_repo_check.unwrap_or(true) {
        argv.push("--skip-git-repo-check".into());
    }
    if !params.model.is_empty() {
        argv.push("-m".into());
        argv.push(params.model.clone());
    }
    if !params.profile.is_empty() {
        argv.push("-p".into());
        argv.push(params.profile.clone());
    }
    for image in &params.image {
        argv.push("-i".into());
        argv.push(image.display().to_string());
    }
    if let Some(session) = params.session() {
        argv.push("resume".into());
        argv.push(session.to_string());
    }
    argv.push("-".into());
    argv
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn defaults_run_sandboxed_outside_git() {
        let argv = argv(&ToolParams::new("x", "/tmp"), SandboxMode::ReadOnly);
        assert_eq!(
            argv,
            ["codex", "exec", "--json", "--sandbox", "read-only", "--skip-git-repo-check", "-"]
        );
    }

    #[test]
    fn options_and_resume() {
        let mut params = ToolParams::new("x", "/tmp");
        params.model = "gpt-5".into();
        params.profile = "work".into();
        params.image = vec![PathBuf::from("a.png"), PathBuf::from("b.png")];
        params.session_id = "t-1".into();
        params.skip_git_repo_check = Some(false);
        params.yolo = Some(true);
        let argv = argv(&params, SandboxMode::ReadOnly);
        assert!(!argv.contains(&"--sandbox".to_string()));
        assert!(!argv.contains(&"--skip-git-repo-check".to_string()));
        assert_eq!(argv.iter().filter(|a| *a == "-i").count(), 2);
        assert_eq!(&argv[argv.len() - 3..], ["resume", "t-1", "-"]);
    }
}

// ─── Replace Script ───
// The running executable cannot overwrite itself. A small detached script
// waits for this process to exit, swaps `<exe>.new` into place, restarts the
// launcher and deletes itself.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplacePlan {
    pub pid: u32,
    /// Executable being replaced; also the one restarted.
    pub current_exe: PathBuf,
    pub new_exe: PathBuf,
}

pub fn script_file_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "launcher-update.bat"
    } else {
        "launcher-update.sh"
    }
}

pub fn render(plan: &ReplacePlan) -> String {
    if cfg!(target_os = "windows") {
        render_batch(plan)
    } else {
        render_sh(plan)
    }
}

/// Shell command that runs the script written at `script_path`.
pub fn launch_command(script_path: &Path) -> String {
    if cfg!(target_os = "windows") {
        format!("\"{}\"", script_path.display())
    } else {
        format!("sh {}", sh_quote(&script_path.to_string_lossy()))
    }
}

pub(crate) fn render_batch(plan: &ReplacePlan) -> String {
    let exe = plan.current_exe.display();
    let new_exe = plan.new_exe.display();
    // `ren` takes a bare file name as its target.
    let exe_path = plan.current_exe.to_string_lossy();
    let exe_name = exe_path.rsplit(|c: char| c == '\\' || c == '/').next().unwrap_or_default();

    [
        "@echo off".to_string(),
        ":wait".to_string(),
        format!(
            "tasklist /FI \"PID eq {}\" 2>NUL | find \"{}\" >NUL",
            plan.pid, plan.pid
        ),
        "if not errorlevel 1 (".to_string(),
        "    timeout /t 1 /nobreak >NUL".to_string(),
        "    goto wait".to_string(),
        ")".to_string(),
        format!("del /F /Q \"{exe}\""),
        format!("ren \"{new_exe}\" \"{exe_name}\""),
        format!("start \"\" \"{exe}\""),
        "(goto) 2>nul & del \"%~f0\"".to_string(),
        String::new(),
    ]
    .join("\r\n")
}

pub(crate) fn render_sh(plan: &ReplacePlan) -> String {
    let exe = sh_quote(&plan.current_exe.to_string_lossy());
    let new_exe = sh_quote(&plan.new_exe.to_string_lossy());

    [
        "#!/bin/sh".to_string(),
        format!("while kill -0 {} 2>/dev/null; do sleep 1; done", plan.pid),
        format!("rm -f {exe}"),
        format!("mv {new_exe} {exe}"),
        format!("chmod +x {exe}"),
        format!("nohup {exe} >/dev/null 2>&1 &"),
        "rm -f \"$0\"".to_string(),
        String::new(),
    ]
    .join("\n")
}

fn sh_quote(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> ReplacePlan {
        ReplacePlan {
            pid: 4711,
            current_exe: PathBuf::from("/opt/launchpad/launchpad"),
            new_exe: PathBuf::from("/opt/launchpad/launchpad.new"),
        }
    }

    #[test]
    fn sh_script_waits_swaps_restarts_and_cleans_up() {
        let script = render_sh(&plan());
        let lines: Vec<&str> = script.lines().collect();

        assert_eq!(lines[0], "#!/bin/sh");
        assert_eq!(lines[1], "while kill -0 4711 2>/dev/null; do sleep 1; done");
        assert_eq!(lines[2], "rm -f '/opt/launchpad/launchpad'");
        assert_eq!(
            lines[3],
            "mv '/opt/launchpad/launchpad.new' '/opt/launchpad/launchpad'"
        );
        assert!(lines[5].starts_with("nohup '/opt/launchpad/launchpad'"));
        assert_eq!(lines.last(), Some(&"rm -f \"$0\""));
    }

    #[test]
    fn batch_script_renames_new_build_over_old_name() {
        let plan = ReplacePlan {
            pid: 4711,
            current_exe: PathBuf::from(r"C:\Games\Launcher\launcher.exe"),
            new_exe: PathBuf::from(r"C:\Games\Launcher\launcher.exe.new"),
        };
        let script = render_batch(&plan);

        assert!(script.starts_with("@echo off\r\n"));
        assert!(script.contains("tasklist /FI \"PID eq 4711\""));
        assert!(script.contains(r#"ren "C:\Games\Launcher\launcher.exe.new" "launcher.exe""#));
        assert!(script.contains(r#"start "" "C:\Games\Launcher\launcher.exe""#));
        assert!(script.contains("del \"%~f0\""));
    }

    #[test]
    fn sh_quote_survives_single_quotes() {
        assert_eq!(sh_quote("/tmp/it's here"), r"'/tmp/it'\''s here'");
    }
}

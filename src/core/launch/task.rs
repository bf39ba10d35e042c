// ─── Launch Task ───
// Spawns game clients and the self-update replace script.

use std::path::Path;
use std::process::{Command, Stdio};

#[cfg(target_os = "windows")]
use std::os::windows::process::CommandExt;
#[cfg(unix)]
use std::os::unix::process::CommandExt as _;

use tracing::{debug, info};

use crate::core::error::{UpdaterError, UpdaterResult};

use super::ProcessSpawner;

/// Spawns through the platform shell, so manifest `startCmd` strings may
/// carry arguments.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSpawner;

impl ProcessSpawner for SystemSpawner {
    fn spawn(&self, command: &str, cwd: &Path, detached: bool) -> UpdaterResult<u32> {
        if command.trim().is_empty() {
            return Err(UpdaterError::Spawn {
                command: command.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
            });
        }

        let mut cmd = shell_command(command);
        cmd.current_dir(cwd);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::null());
        configure_platform_spawn(&mut cmd, detached);

        info!("Spawning {:?} in {:?} (detached: {})", command, cwd, detached);
        debug!("Command (copy/paste): {}", format_command_for_logs(&cmd));

        let child = cmd.spawn().map_err(|source| UpdaterError::Spawn {
            command: command.to_string(),
            source,
        })?;
        // Dropping `Child` neither waits for nor kills the process.
        Ok(child.id())
    }
}

#[cfg(target_os = "windows")]
fn shell_command(command: &str) -> Command {
    // `/S` makes cmd strip exactly the outer pair of quotes. Passed raw, the
    // quotes inside `command` reach cmd as written instead of being escaped.
    let mut cmd = Command::new("cmd");
    cmd.args(["/S", "/C"]).raw_arg(format!("\"{command}\""));
    cmd
}

#[cfg(not(target_os = "windows"))]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

fn configure_platform_spawn(cmd: &mut Command, detached: bool) {
    #[cfg(target_os = "windows")]
    {
        const CREATE_NEW_CONSOLE: u32 = 0x0000_0010;
        const DETACHED_PROCESS: u32 = 0x0000_0008;
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
        if detached {
            cmd.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
        } else {
            cmd.creation_flags(CREATE_NEW_CONSOLE);
        }
    }

    #[cfg(unix)]
    {
        // Own process group: the child survives the launcher exiting and
        // ignores signals aimed at the launcher's terminal.
        if detached {
            cmd.process_group(0);
        }
    }
}

fn format_command_for_logs(cmd: &Command) -> String {
    let program = shell_escape(&cmd.get_program().to_string_lossy());
    let args = cmd
        .get_args()
        .map(|arg| shell_escape(&arg.to_string_lossy()))
        .collect::<Vec<_>>()
        .join(" ");

    if args.is_empty() {
        program
    } else {
        format!("{} {}", program, args)
    }
}

fn shell_escape(raw: &str) -> String {
    if raw.is_empty() {
        return "\"\"".to_string();
    }

    if raw.chars().all(|ch| {
        ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '/' | ':' | '\\' | '=')
    }) {
        return raw.to_string();
    }

    format!("\"{}\"", raw.replace('"', "\\\""))
}

//! Speech-to-text capture behind an injectable interface.
//!
//! A device reports what it heard through an unbounded channel. The
//! conversation container drains that channel from the UI loop, so devices
//! never touch conversation state directly.

use std::io;
use std::process::Stdio;

use tokio::process::Command;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Events a capture device emits during one recognition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceEvent {
    /// A recognized utterance.
    Transcript(String),
    /// The device failed. The payload is for logs only.
    Error(String),
    /// Capture ended on its own.
    End,
}

pub trait VoiceCapture: Send {
    fn is_available(&self) -> bool {
        true
    }

    /// Begin a single recognition attempt. Events for this attempt go to
    /// `events`; the device sends `End` last unless it is stopped first.
    fn start(&mut self, events: UnboundedSender<VoiceEvent>) -> io::Result<()>;

    /// Abandon the current attempt. No events follow.
    fn stop(&mut self);
}

/// Runs an external speech-to-text command that records one utterance and
/// prints the transcript on stdout.
///
/// On unix the command runs in its own process group so that stopping also
/// reaches every process of a pipeline, not just the wrapping shell.
pub struct CommandVoiceCapture {
    command: String,
    task: Option<JoinHandle<()>>,
    process_group: Option<u32>,
}

impl CommandVoiceCapture {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            task: None,
            process_group: None,
        }
    }

    fn shell_command(&self) -> Command {
        #[cfg(windows)]
        let mut cmd = {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(&self.command);
            cmd
        };
        #[cfg(not(windows))]
        let mut cmd = {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(&self.command).process_group(0);
            cmd
        };
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

impl VoiceCapture for CommandVoiceCapture {
    fn is_available(&self) -> bool {
        !self.command.trim().is_empty()
    }

    fn start(&mut self, events: UnboundedSender<VoiceEvent>) -> io::Result<()> {
        self.stop();

        let child = self.shell_command().spawn()?;
        // With `process_group(0)` the group id is the shell's pid.
        self.process_group = child.id();
        debug!(command = %self.command, pid = ?self.process_group, "voice capture started");

        self.task = Some(tokio::spawn(async move {
            match child.wait_with_output().await {
                Ok(output) if output.status.success() => {
                    let transcript = String::from_utf8_lossy(&output.stdout).trim().to_string();
                    if !transcript.is_empty() {
                        let _ = events.send(VoiceEvent::Transcript(transcript));
                    }
                }
                Ok(output) => {
                    warn!(status = %output.status, "voice command failed");
                    let _ = events.send(VoiceEvent::Error(format!(
                        "voice command exited with {}",
                        output.status
                    )));
                }
                Err(e) => {
                    warn!(error = %e, "voice command could not be awaited");
                    let _ = events.send(VoiceEvent::Error(e.to_string()));
                }
            }
            let _ = events.send(VoiceEvent::End);
        }));

        Ok(())
    }

    fn stop(&mut self) {
        let group = self.process_group.take();
        let Some(task) = self.task.take() else {
            return;
        };
        let running = !task.is_finished();
        // Dropping the aborted future drops the child, which kills the shell.
        task.abort();
        if running {
            if let Some(pgid) = group {
                kill_process_group(pgid);
            }
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    let result = std::process::Command::new("kill")
        .arg("-KILL")
        .arg("--")
        .arg(format!("-{}", pgid))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    match result {
        Ok(status) if status.success() => debug!(pgid, "voice command stopped"),
        Ok(status) => debug!(pgid, %status, "voice command already gone"),
        Err(e) => warn!(error = %e, pgid, "failed to stop voice command"),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) {}

impl Drop for CommandVoiceCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

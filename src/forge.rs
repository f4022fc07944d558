use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use tracing::{info, warn};

use crate::config::ForgeConfig;
use crate::error::{Result, UnibosError};

const STOP_GRACE: Duration = Duration::from_millis(500);
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForgeStatus {
    Stopped,
    Running { pid: u32, since: DateTime<Local> },
    Exited { code: Option<i32> },
    Failed(String),
}

impl ForgeStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }

    pub fn summary(&self) -> String {
        match self {
            Self::Stopped => "stopped".to_string(),
            Self::Running { pid, since } => {
                format!("running (pid {pid}, since {})", since.format("%H:%M:%S"))
            }
            Self::Exited { code: Some(code) } => format!("exited with code {code}"),
            Self::Exited { code: None } => "terminated by signal".to_string(),
            Self::Failed(reason) => format!("failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ForgeCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub url: String,
    pub log_lines: usize,
}

impl ForgeCommand {
    pub fn from_config(config: &ForgeConfig, working_dir: PathBuf) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            working_dir,
            url: config.url.clone(),
            log_lines: config.log_lines.max(1),
        }
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

pub struct BackendForge {
    command: ForgeCommand,
    child: Option<Child>,
    status: ForgeStatus,
    log: VecDeque<String>,
    line_tx: Sender<String>,
    line_rx: Receiver<String>,
}

impl BackendForge {
    pub fn new(command: ForgeCommand) -> Self {
        let (line_tx, line_rx) = mpsc::channel();
        Self {
            command,
            child: None,
            status: ForgeStatus::Stopped,
            log: VecDeque::new(),
            line_tx,
            line_rx,
        }
    }

    pub fn command(&self) -> &ForgeCommand {
        &self.command
    }

    pub fn status(&self) -> &ForgeStatus {
        &self.status
    }

    pub fn log(&self) -> impl Iterator<Item = &String> {
        self.log.iter()
    }

    pub fn log_len(&self) -> usize {
        self.log.len()
    }

    pub fn start(&mut self) -> Result<u32> {
        self.poll();
        if let Some(child) = &self.child {
            return Err(UnibosError::ForgeAlreadyRunning(child.id()));
        }
        let spawned = Command::new(&self.command.program)
            .args(&self.command.args)
            .current_dir(&self.command.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(source) => {
                self.status = ForgeStatus::Failed(source.to_string());
                return Err(UnibosError::Spawn {
                    program: self.command.program.clone(),
                    source,
                });
            }
        };

        if let Some(stdout) = child.stdout.take() {
            spawn_reader(stdout, self.line_tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_reader(stderr, self.line_tx.clone());
        }
        let pid = child.id();
        info!(pid, command = %self.command.command_line(), "backend started");
        self.push_line(format!("[forge] started: {}", self.command.command_line()));
        self.status = ForgeStatus::Running {
            pid,
            since: Local::now(),
        };
        self.child = Some(child);
        Ok(pid)
    }

    pub fn stop(&mut self) -> Result<()> {
        self.poll();
        let Some(mut child) = self.child.take() else {
            return Err(UnibosError::ForgeNotRunning);
        };
        let code = terminate_group(&mut child).and_then(|status| status.code());
        info!(pid = child.id(), "backend stopped");
        self.push_line("[forge] stopped".to_string());
        self.status = match code {
            Some(code) => ForgeStatus::Exited { code: Some(code) },
            None => ForgeStatus::Stopped,
        };
        Ok(())
    }

    pub fn restart(&mut self) -> Result<u32> {
        if self.child.is_some() {
            self.stop()?;
        }
        self.start()
    }

    /// Pulls pending output into the log and reaps the child if it exited.
    pub fn poll(&mut self) {
        while let Ok(line) = self.line_rx.try_recv() {
            self.push_line(line);
        }
        let exited = match self.child.as_mut().map(Child::try_wait) {
            Some(Ok(Some(status))) => Some(status.code()),
            Some(Err(err)) => {
                warn!("failed to poll backend: {err}");
                None
            }
            _ => None,
        };
        if let Some(code) = exited {
            self.child = None;
            self.status = ForgeStatus::Exited { code };
            self.push_line(format!("[forge] process exited ({})", self.status.summary()));
            info!(?code, "backend exited");
        }
    }

    fn push_line(&mut self, line: String) {
        self.log.push_back(line);
        while self.log.len() > self.command.log_lines {
            self.log.pop_front();
        }
    }
}

impl Drop for BackendForge {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            terminate_group(&mut child);
        }
    }
}

/// The backend runs as the leader of its own process group, so servers that
/// fork workers (Django's autoreloader) go down with it. SIGTERM first, then
/// SIGKILL for whatever is left after the grace period.
fn terminate_group(child: &mut Child) -> Option<ExitStatus> {
    let Ok(pgid) = libc::pid_t::try_from(child.id()) else {
        let _ = child.kill();
        return child.wait().ok();
    };
    if !signal_group(pgid, libc::SIGTERM) {
        warn!(pgid, "failed to signal backend process group");
    }
    let deadline = Instant::now() + STOP_GRACE;
    let mut status = None;
    loop {
        if status.is_none() {
            status = child.try_wait().ok().flatten();
        }
        // The leader is reaped first; afterwards only descendants keep the group alive.
        if status.is_some() && !signal_group(pgid, 0) {
            return status;
        }
        if Instant::now() >= deadline {
            break;
        }
        thread::sleep(STOP_POLL_INTERVAL);
    }
    signal_group(pgid, libc::SIGKILL);
    status.or_else(|| child.wait().ok())
}

fn signal_group(pgid: libc::pid_t, signal: libc::c_int) -> bool {
    if pgid <= 1 {
        return false;
    }
    // SAFETY: kill(2) has no memory-safety preconditions; a negative pid
    // addresses the process group.
    unsafe { libc::kill(-pgid, signal) == 0 }
}

fn spawn_reader<R: Read + Send + 'static>(reader: R, tx: Sender<String>) {
    thread::spawn(move || {
        for line in BufReader::new(reader).lines().map_while(std::result::Result::ok) {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
}

#[cfg(test)]
#[path = "../tests/unit/forge_tests.rs"]
mod tests;

// src/system/process.rs

use crate::constants::{DEFAULT_TERM, PTY_COLS, PTY_ROWS, READ_CHUNK_SIZE};
use portable_pty::{Child, ChildKiller, CommandBuilder, MasterPty, PtySize, native_pty_system};
use std::collections::BTreeMap;
use std::fmt;
use std::io::{ErrorKind, Read, Write};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Interpreter '{program}' could not be started: {reason}")]
    Spawn { program: String, reason: String },
    #[error("Failed to set up the interpreter's terminal: {0}")]
    Terminal(String),
    #[error("The interpreter's input stream is closed.")]
    StdinClosed,
    #[error("Failed to write to the interpreter: {0}")]
    Write(#[source] std::io::Error),
    #[error("Failed to deliver an interrupt to process {pid}: {reason}")]
    Signal { pid: u32, reason: String },
}

impl ProcessError {
    /// True when the error means the child is gone and its terminal no longer accepts input.
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::StdinClosed => true,
            Self::Write(e) => e.kind() == ErrorKind::BrokenPipe || is_hangup(e),
            _ => false,
        }
    }
}

#[cfg(unix)]
fn is_hangup(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(nix::libc::EIO)
}

#[cfg(not(unix))]
fn is_hangup(_e: &std::io::Error) -> bool {
    false
}

/// Everything needed to launch the interpreter, resolved from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub working_dir: Option<PathBuf>,
}

impl ProcessSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            working_dir: None,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

/// Result of one bounded wait for child output.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    Data(Vec<u8>),
    /// Nothing arrived within the wait.
    Pending,
    /// The terminal hung up: every process holding it has exited.
    Closed,
}

/// The running interpreter, attached to a pseudo-terminal.
///
/// stdout and stderr share the terminal, so the single reader thread sees their bytes in the
/// order they were written. The channel disconnects when the terminal hangs up, which is how
/// end-of-stream is detected. Echo and newline translation are turned off before the child
/// starts, so exactly what the interpreter prints comes back.
pub struct ProcessHandle {
    master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
    writer: Option<Box<dyn Write + Send>>,
    output: Receiver<Vec<u8>>,
    pid: u32,
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.pid)
            .field("writer_open", &self.writer.is_some())
            .finish_non_exhaustive()
    }
}

impl ProcessHandle {
    /// Opens a pseudo-terminal and spawns the interpreter on it.
    pub fn spawn(spec: &ProcessSpec) -> Result<Self, ProcessError> {
        let pair = native_pty_system()
            .openpty(PtySize {
                rows: PTY_ROWS,
                cols: PTY_COLS,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| ProcessError::Terminal(e.to_string()))?;

        #[cfg(unix)]
        configure_terminal(&*pair.master)?;

        let mut command = CommandBuilder::new(&spec.program);
        command.args(&spec.args);
        if !spec.env.contains_key("TERM") {
            command.env("TERM", DEFAULT_TERM);
        }
        for (key, value) in &spec.env {
            command.env(key, value);
        }
        // Without an explicit directory the child would start in the user's home.
        match &spec.working_dir {
            Some(dir) => command.cwd(dunce::simplified(dir)),
            None => {
                if let Ok(dir) = std::env::current_dir() {
                    command.cwd(dir);
                }
            }
        }

        let spawn_error = |reason: String| ProcessError::Spawn {
            program: spec.program.clone(),
            reason,
        };
        let mut child = pair
            .slave
            .spawn_command(command)
            .map_err(|e| spawn_error(e.to_string()))?;
        // The terminal only hangs up once no process holds the slave side, this one included.
        drop(pair.slave);

        let Some(pid) = child.process_id() else {
            child.kill().ok();
            return Err(spawn_error("the process id is unknown".to_string()));
        };
        log::debug!(
            "Spawned interpreter '{}' {:?} (PID: {}).",
            spec.program,
            spec.args,
            pid
        );

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| ProcessError::Terminal(e.to_string()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| ProcessError::Terminal(e.to_string()))?;

        let (sender, output) = mpsc::channel();
        spawn_reader(reader, sender);

        Ok(Self {
            master: pair.master,
            child,
            writer: Some(writer),
            output,
            pid,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Writes `line` followed by a line terminator.
    pub fn send_line(&mut self, line: &str) -> Result<(), ProcessError> {
        let writer = self.writer.as_mut().ok_or(ProcessError::StdinClosed)?;
        writer
            .write_all(line.as_bytes())
            .and_then(|()| writer.write_all(b"\n"))
            .and_then(|()| writer.flush())
            .map_err(ProcessError::Write)
    }

    /// Waits up to `timeout` for the next output chunk.
    pub fn read(&self, timeout: Duration) -> ReadOutcome {
        match self.output.recv_timeout(timeout) {
            Ok(chunk) => ReadOutcome::Data(chunk),
            Err(RecvTimeoutError::Timeout) => ReadOutcome::Pending,
            Err(RecvTimeoutError::Disconnected) => ReadOutcome::Closed,
        }
    }

    /// Sends SIGINT to the terminal's foreground process group, like Ctrl+C would.
    #[cfg(unix)]
    pub fn send_interrupt(&mut self) -> Result<(), ProcessError> {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        let pid = self.pid;
        let group = match self.master.process_group_leader() {
            Some(leader) => leader,
            None => i32::try_from(pid).map_err(|e| ProcessError::Signal {
                pid,
                reason: e.to_string(),
            })?,
        };
        log::debug!("Sending SIGINT to process group {}.", group);
        killpg(Pid::from_raw(group), Signal::SIGINT).map_err(|e| ProcessError::Signal {
            pid,
            reason: e.to_string(),
        })
    }

    /// Types the interrupt character into the terminal.
    #[cfg(not(unix))]
    pub fn send_interrupt(&mut self) -> Result<(), ProcessError> {
        log::debug!("Writing Ctrl+C to the terminal of process {}.", self.pid);
        let writer = self.writer.as_mut().ok_or(ProcessError::StdinClosed)?;
        writer
            .write_all(b"\x03")
            .and_then(|()| writer.flush())
            .map_err(ProcessError::Write)
    }

    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Closes the input side, kills the process group and reaps the child.
    pub fn terminate(&mut self) {
        self.writer.take();
        if self.is_alive() {
            log::debug!("Terminating interpreter (PID: {})...", self.pid);
            self.kill();
        }
        // The reader thread is not joined: a grandchild may still hold the terminal open.
        self.child.wait().ok();
    }

    #[cfg(unix)]
    fn kill(&mut self) {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        // The child leads its own session, so its pid is also its process group id.
        let killed_group = i32::try_from(self.pid)
            .ok()
            .map(|raw| killpg(Pid::from_raw(raw), Signal::SIGKILL).is_ok())
            .unwrap_or(false);
        if !killed_group {
            if let Err(e) = self.child.kill() {
                log::warn!("Failed to kill interpreter {}: {}", self.pid, e);
            }
        }
    }

    #[cfg(not(unix))]
    fn kill(&mut self) {
        if let Err(e) = self.child.kill() {
            log::warn!("Failed to kill interpreter {}: {}", self.pid, e);
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Turns off echo and output newline translation, so the terminal passes the interpreter's
/// bytes through unchanged and sent code is not read back.
#[cfg(unix)]
fn configure_terminal(master: &dyn MasterPty) -> Result<(), ProcessError> {
    use nix::sys::termios::{LocalFlags, OutputFlags, SetArg, tcgetattr, tcsetattr};
    use std::fs::OpenOptions;
    use std::os::unix::fs::OpenOptionsExt;

    let Some(tty) = master.tty_name() else {
        log::warn!("Terminal has no device name; keeping its default modes.");
        return Ok(());
    };
    let terminal = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(nix::libc::O_NOCTTY)
        .open(&tty)
        .map_err(|e| ProcessError::Terminal(format!("{}: {}", tty.display(), e)))?;

    let mut termios = tcgetattr(&terminal).map_err(|e| ProcessError::Terminal(e.to_string()))?;
    termios.local_flags.remove(LocalFlags::ECHO);
    termios.output_flags.remove(OutputFlags::ONLCR);
    tcsetattr(&terminal, SetArg::TCSANOW, &termios)
        .map_err(|e| ProcessError::Terminal(e.to_string()))
}

fn spawn_reader(mut source: Box<dyn Read + Send>, sender: Sender<Vec<u8>>) {
    thread::spawn(move || {
        let mut buf = [0u8; READ_CHUNK_SIZE];
        loop {
            match source.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    let chunk = buf.get(..n).map(<[u8]>::to_vec).unwrap_or_default();
                    if sender.send(chunk).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                // Linux reports a hung-up terminal as EIO.
                Err(e) => {
                    log::trace!("Interpreter terminal reader stopped: {}", e);
                    break;
                }
            }
        }
        log::trace!("Interpreter terminal reached end of stream.");
    });
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;

    fn read_until_closed(handle: &ProcessHandle) -> String {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut collected = Vec::new();
        while Instant::now() < deadline {
            match handle.read(Duration::from_millis(100)) {
                ReadOutcome::Data(chunk) => collected.extend(chunk),
                ReadOutcome::Pending => continue,
                ReadOutcome::Closed => return String::from_utf8(collected).unwrap(),
            }
        }
        panic!("child output never closed");
    }

    fn read_until(handle: &ProcessHandle, needle: &str) -> String {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut collected = Vec::new();
        while Instant::now() < deadline {
            if let ReadOutcome::Data(chunk) = handle.read(Duration::from_millis(100)) {
                collected.extend(chunk);
                let text = String::from_utf8_lossy(&collected).into_owned();
                if text.contains(needle) {
                    return text;
                }
            }
        }
        panic!("never saw {needle:?}");
    }

    #[test]
    fn test_stdout_and_stderr_keep_their_order() {
        let spec = ProcessSpec::new("sh").args(["-c", "echo a; echo b >&2; echo c"]);
        let handle = ProcessHandle::spawn(&spec).unwrap();
        assert_eq!(read_until_closed(&handle), "a\nb\nc\n");
    }

    #[test]
    fn test_child_runs_on_a_terminal() {
        let spec = ProcessSpec::new("sh").args(["-c", "test -t 0 && test -t 1 && test -t 2 && echo tty"]);
        let handle = ProcessHandle::spawn(&spec).unwrap();
        assert_eq!(read_until_closed(&handle), "tty\n");
    }

    #[test]
    fn test_sent_line_is_not_echoed() {
        let spec = ProcessSpec::new("sh").args(["-c", "read -r line; echo \"got $line\""]);
        let mut handle = ProcessHandle::spawn(&spec).unwrap();
        handle.send_line("hello").unwrap();
        assert_eq!(read_until_closed(&handle), "got hello\n");
    }

    #[test]
    fn test_env_and_working_dir_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        let mut spec = ProcessSpec::new("sh").args(["-c", "echo \"$IREPL_TEST_VAR $TERM\"; pwd"]);
        spec.env
            .insert("IREPL_TEST_VAR".to_string(), "value".to_string());
        spec.working_dir = Some(dir.path().to_path_buf());

        let handle = ProcessHandle::spawn(&spec).unwrap();
        let output = read_until_closed(&handle);
        let canonical = dir.path().canonicalize().unwrap();
        assert!(output.starts_with(&format!("value {DEFAULT_TERM}\n")));
        assert!(output.trim_end().ends_with(&*canonical.to_string_lossy()));
    }

    #[test]
    fn test_interrupt_reaches_the_running_command() {
        let spec = ProcessSpec::new("sh").args([
            "-c",
            "trap 'echo caught; exit 0' INT; echo ready; while :; do sleep 0.1; done",
        ]);
        let mut handle = ProcessHandle::spawn(&spec).unwrap();
        read_until(&handle, "ready");
        handle.send_interrupt().unwrap();
        assert!(read_until_closed(&handle).contains("caught"));
    }

    #[test]
    fn test_spawn_failure_reports_program() {
        let spec = ProcessSpec::new("/nonexistent/irepl-interpreter");
        let err = ProcessHandle::spawn(&spec).unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { ref program, .. } if program.contains("irepl-interpreter")));
    }

    #[test]
    fn test_terminate_stops_a_long_running_child() {
        let spec = ProcessSpec::new("sh").args(["-c", "sleep 30"]);
        let mut handle = ProcessHandle::spawn(&spec).unwrap();
        assert!(handle.is_alive());
        handle.terminate();
        assert!(!handle.is_alive());
        assert!(handle.send_line("x").unwrap_err().is_disconnect());
    }
}

use std::collections::BTreeSet;
use std::io::{BufReader, Read};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::command::Invocation;
use crate::error::{Error, Result};
use crate::log_sanitize::sanitize_log_line;

/// Result of one external process run. Captured streams are kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs a synthesized invocation to completion.
pub trait CommandRunner {
    fn run(&self, inv: &Invocation) -> Result<ProcessOutput>;
}

/// Spawns real processes. Interactive invocations inherit the terminal;
/// others have stdout/stderr captured in full.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    // Process group ids of running captured children; each leads its own group.
    running: Arc<Mutex<BTreeSet<u32>>>,
}

impl SystemRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill every process started by this runner that is still running.
    pub fn kill_running(&self) {
        let pgids: Vec<u32> = self
            .running
            .lock()
            .ok()
            .map(|g| g.iter().copied().collect())
            .unwrap_or_default();
        for pgid in pgids {
            tracing::info!(pgid, "killing build process group");
            kill_pgroup(pgid, false);
            kill_pgroup(pgid, true);
        }
    }

    fn register(&self, pgid: u32) {
        if let Ok(mut g) = self.running.lock() {
            g.insert(pgid);
        }
    }

    fn unregister(&self, pgid: u32) {
        if let Ok(mut g) = self.running.lock() {
            g.remove(&pgid);
        }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, inv: &Invocation) -> Result<ProcessOutput> {
        let mut cmd = Command::new(&inv.program);
        cmd.args(&inv.args);

        // Interactive runs stay in the terminal's foreground group so they can
        // read the tty and receive Ctrl-C directly.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            if !inv.interactive {
                unsafe {
                    cmd.pre_exec(|| {
                        if libc::setpgid(0, 0) != 0 {
                            return Err(std::io::Error::last_os_error());
                        }
                        Ok(())
                    });
                }
            }
        }

        if inv.interactive {
            cmd.stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit());
        } else {
            cmd.stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::msg(format!("failed to start {}: {e}", inv.program)))?;
        let pgid = (!inv.interactive).then(|| child.id());
        if let Some(pgid) = pgid {
            self.register(pgid);
        }

        let out_reader = child
            .stdout
            .take()
            .map(|s| std::thread::spawn(move || collect_stream(s, "stdout")));
        let err_reader = child
            .stderr
            .take()
            .map(|s| std::thread::spawn(move || collect_stream(s, "stderr")));

        let status = child.wait();
        if let Some(pgid) = pgid {
            self.unregister(pgid);
        }
        let status = status.map_err(|e| Error::msg(format!("wait failed: {e}")))?;

        Ok(ProcessOutput {
            code: status.code(),
            stdout: join_reader(out_reader),
            stderr: join_reader(err_reader),
        })
    }
}

fn join_reader(handle: Option<JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

// Keeps every byte and logs each complete line at debug level.
fn collect_stream<R: Read>(reader: R, stream: &'static str) -> String {
    let mut r = BufReader::new(reader);
    let mut buf = [0u8; 8192];
    let mut all = Vec::new();
    let mut pending = Vec::with_capacity(1024);

    loop {
        let n = match r.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(_) => break,
        };
        all.extend_from_slice(&buf[..n]);
        for b in &buf[..n] {
            if *b == b'\n' || *b == b'\r' {
                log_line(stream, &pending);
                pending.clear();
            } else {
                pending.push(*b);
            }
        }
    }
    log_line(stream, &pending);

    String::from_utf8_lossy(&all).into_owned()
}

fn log_line(stream: &'static str, raw: &[u8]) {
    if raw.is_empty() {
        return;
    }
    let line = sanitize_log_line(&String::from_utf8_lossy(raw));
    if !line.is_empty() {
        tracing::debug!(target: "mpbuild::process", stream, "{line}");
    }
}

fn kill_pgroup(pgid: u32, force: bool) {
    #[cfg(unix)]
    {
        let sig = if force { libc::SIGKILL } else { libc::SIGTERM };
        // Negative PID targets the whole process group.
        let _ = unsafe { libc::kill(-(pgid as i32), sig) };
    }
    #[cfg(not(unix))]
    {
        let _ = (pgid, force);
    }
}

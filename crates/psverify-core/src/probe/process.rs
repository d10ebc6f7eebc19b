//! Server process control for the live probe.
//!
//! `ServerGuard` owns the launched handle and stops it when dropped, so
//! every exit path of a probe run (early return, error, panic unwind)
//! terminates the server and waits a bounded time for it.

use std::io;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::ProbeError;
use crate::util::process::wait_with_deadline;

pub trait ServerHandle {
    fn terminate(&mut self) -> io::Result<()>;

    /// `Ok(true)` once the process has exited, `Ok(false)` on timeout.
    fn wait_timeout(&mut self, timeout: Duration) -> io::Result<bool>;
}

pub trait ProcessLauncher {
    fn launch(&self, program: &str, args: &[String]) -> Result<Box<dyn ServerHandle>, ProbeError>;
}

/// Launches real processes with all stdio detached.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdLauncher;

impl ProcessLauncher for StdLauncher {
    fn launch(&self, program: &str, args: &[String]) -> Result<Box<dyn ServerHandle>, ProbeError> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| ProbeError::Launch {
                program: program.to_string(),
                source,
            })?;
        debug!(program, pid = child.id(), "server started");
        Ok(Box::new(ChildHandle { child }))
    }
}

pub struct ChildHandle {
    child: Child,
}

impl ServerHandle for ChildHandle {
    fn terminate(&mut self) -> io::Result<()> {
        if self.child.try_wait()?.is_some() {
            return Ok(());
        }
        self.child.kill()
    }

    fn wait_timeout(&mut self, timeout: Duration) -> io::Result<bool> {
        Ok(wait_with_deadline(&mut self.child, timeout)?.is_some())
    }
}

pub struct ServerGuard {
    handle: Box<dyn ServerHandle>,
    shutdown_timeout: Duration,
}

impl ServerGuard {
    pub fn new(handle: Box<dyn ServerHandle>, shutdown_timeout: Duration) -> Self {
        Self {
            handle,
            shutdown_timeout,
        }
    }
}

impl Drop for ServerGuard {
    fn drop(&mut self) {
        if let Err(e) = self.handle.terminate() {
            warn!(error = %e, "failed to terminate server");
        }
        match self.handle.wait_timeout(self.shutdown_timeout) {
            Ok(true) => debug!("server stopped"),
            Ok(false) => warn!(
                timeout_ms = self.shutdown_timeout.as_millis() as u64,
                "server did not exit in time"
            ),
            Err(e) => warn!(error = %e, "failed to wait for server"),
        }
    }
}

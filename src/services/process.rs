//! Browser process lifecycle control.
//!
//! Before a profile is touched its browser must be closed. [`ensure_closed`]
//! drives the lifecycle `Unknown → Running → Terminating → Closed` (or
//! `TimeoutExceeded`), using a [`ProcessController`] to query the OS process
//! table and to terminate processes. The poll loop in [`await_closed`] is the
//! only blocking point and is bounded by both its own timeout and the caller's
//! [`RunControl`].

use crate::models::BrowserKind;
use crate::services::control::RunControl;
use crate::services::discovery::TargetOs;
use std::future::Future;
use std::io;
use std::process::{Output, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::{Instant, timeout};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessLifecycleState {
    Unknown,
    Running,
    Terminating,
    Closed,
    TimeoutExceeded,
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("process did not close in time ({browser} still running after {timeout:?})")]
    TimeoutExceeded {
        browser: BrowserKind,
        timeout: Duration,
    },

    #[error("run cancelled while waiting for {0} to close")]
    Cancelled(BrowserKind),

    #[error("could not confirm {browser} is closed: {source}")]
    ListingFailed {
        browser: BrowserKind,
        #[source]
        source: io::Error,
    },

    #[error("process command failed: {0}")]
    Command(#[from] io::Error),
}

/// Process names per browser, as they appear in the OS process table.
pub fn process_names(browser: BrowserKind, os: TargetOs) -> &'static [&'static str] {
    use BrowserKind::*;

    match os {
        TargetOs::Windows => match browser {
            Chrome => &["chrome.exe"],
            Chromium => &["chromium.exe", "chrome.exe"],
            Edge => &["msedge.exe"],
            Brave => &["brave.exe"],
            Opera => &["opera.exe", "launcher.exe"],
            Vivaldi => &["vivaldi.exe"],
            Firefox => &["firefox.exe"],
            LibreWolf => &["librewolf.exe"],
            Safari => &[],
        },
        TargetOs::MacOs => match browser {
            Chrome => &["Google Chrome", "Google Chrome Helper"],
            Chromium => &["Chromium", "Chromium Helper"],
            Edge => &["Microsoft Edge", "Microsoft Edge Helper"],
            Brave => &["Brave Browser", "Brave Browser Helper"],
            Opera => &["Opera", "Opera Helper"],
            Vivaldi => &["Vivaldi", "Vivaldi Helper"],
            Firefox => &["firefox", "plugin-container"],
            LibreWolf => &["librewolf"],
            Safari => &["Safari", "com.apple.WebKit.WebContent"],
        },
        TargetOs::Linux => match browser {
            Chrome => &["chrome", "google-chrome"],
            Chromium => &["chromium", "chromium-browser"],
            Edge => &["msedge", "microsoft-edge"],
            Brave => &["brave", "brave-browser"],
            Opera => &["opera"],
            Vivaldi => &["vivaldi-bin", "vivaldi"],
            Firefox => &["firefox", "firefox-bin"],
            LibreWolf => &["librewolf", "librewolf-bin"],
            Safari => &[],
        },
    }
}

/// Queries and terminates browser processes.
///
/// Termination is best effort: terminating a process that is already gone is
/// not an error. A listing that cannot be completed is an error, never "closed".
pub trait ProcessController: Send + Sync {
    fn is_running(
        &self,
        browser: BrowserKind,
    ) -> impl Future<Output = Result<bool, ProcessError>> + Send;

    /// Graceful termination of every matching process, a short wait, then a forced pass.
    fn terminate(&self, browser: BrowserKind) -> impl Future<Output = ()> + Send;
}

/// [`ProcessController`] backed by the platform's process listing and kill commands.
///
/// - Windows: `tasklist` / `taskkill`
/// - macOS, Linux: `pgrep -x` / `pkill -TERM|-KILL -x`
#[derive(Debug, Clone)]
pub struct SystemProcessController {
    os: TargetOs,
    command_timeout: Duration,
    graceful_wait: Duration,
}

impl SystemProcessController {
    pub fn new(graceful_wait: Duration) -> Self {
        Self {
            os: TargetOs::current(),
            command_timeout: Duration::from_secs(5),
            graceful_wait,
        }
    }

    async fn run(&self, program: &str, args: &[&str]) -> Result<Output, ProcessError> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let output = timeout(self.command_timeout, cmd.output())
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("{} did not finish within {:?}", program, self.command_timeout),
                )
            })??;

        Ok(output)
    }

    async fn is_name_running(&self, name: &str) -> Result<bool, ProcessError> {
        match self.os {
            TargetOs::Windows => {
                let filter = format!("IMAGENAME eq {}", name);
                let output = self
                    .run("tasklist", &["/FO", "CSV", "/NH", "/FI", &filter])
                    .await?;
                let listing = String::from_utf8_lossy(&output.stdout).to_ascii_lowercase();
                Ok(listing.contains(&format!("\"{}\"", name.to_ascii_lowercase())))
            }
            TargetOs::MacOs | TargetOs::Linux => {
                let output = self.run("pgrep", &["-x", name]).await?;
                Ok(output.status.success())
            }
        }
    }

    async fn kill_name(&self, name: &str, forced: bool) -> Result<(), ProcessError> {
        match self.os {
            TargetOs::Windows => {
                let mut args = vec!["/IM", name, "/T"];
                if forced {
                    args.insert(0, "/F");
                }
                self.run("taskkill", &args).await?;
            }
            TargetOs::MacOs | TargetOs::Linux => {
                let signal = if forced { "-KILL" } else { "-TERM" };
                self.run("pkill", &[signal, "-x", name]).await?;
            }
        }
        Ok(())
    }
}

impl ProcessController for SystemProcessController {
    async fn is_running(&self, browser: BrowserKind) -> Result<bool, ProcessError> {
        let mut failure = None;
        for name in process_names(browser, self.os) {
            match self.is_name_running(name).await {
                Ok(true) => {
                    tracing::debug!(%browser, process = name, "Process is running");
                    return Ok(true);
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(%browser, process = name, "Process listing failed: {}", e);
                    failure.get_or_insert(e);
                }
            }
        }

        match failure {
            None => Ok(false),
            Some(ProcessError::Command(source)) => {
                Err(ProcessError::ListingFailed { browser, source })
            }
            Some(e) => Err(e),
        }
    }

    async fn terminate(&self, browser: BrowserKind) {
        let names = process_names(browser, self.os);

        for name in names {
            if let Err(e) = self.kill_name(name, false).await {
                tracing::debug!(%browser, process = name, "Graceful termination failed: {}", e);
            }
        }

        tokio::time::sleep(self.graceful_wait).await;

        for name in names {
            if let Err(e) = self.kill_name(name, true).await {
                tracing::debug!(%browser, process = name, "Forced termination failed: {}", e);
            }
        }
    }
}

/// Poll `is_running` every `poll_interval` until it reports closed.
///
/// Fails with [`ProcessError::TimeoutExceeded`] once `limit` elapses and with
/// [`ProcessError::Cancelled`] as soon as `control` is cancelled.
pub async fn await_closed<P: ProcessController + ?Sized>(
    controller: &P,
    browser: BrowserKind,
    limit: Duration,
    poll_interval: Duration,
    control: &RunControl,
) -> Result<(), ProcessError> {
    let deadline = Instant::now() + limit;

    loop {
        if control.is_cancelled() {
            return Err(ProcessError::Cancelled(browser));
        }

        if !controller.is_running(browser).await? {
            return Ok(());
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(ProcessError::TimeoutExceeded {
                browser,
                timeout: limit,
            });
        }

        tokio::select! {
            _ = tokio::time::sleep(poll_interval.min(deadline - now)) => {}
            _ = control.cancelled() => return Err(ProcessError::Cancelled(browser)),
        }
    }
}

/// Tracks one browser's lifecycle state and logs every transition.
#[derive(Debug)]
pub struct ProcessLifecycle {
    browser: BrowserKind,
    state: ProcessLifecycleState,
    terminated: bool,
}

impl ProcessLifecycle {
    pub fn new(browser: BrowserKind) -> Self {
        Self {
            browser,
            state: ProcessLifecycleState::Unknown,
            terminated: false,
        }
    }

    pub fn state(&self) -> ProcessLifecycleState {
        self.state
    }

    /// Whether a termination was issued.
    pub fn terminated(&self) -> bool {
        self.terminated
    }

    fn transition(&mut self, next: ProcessLifecycleState) {
        tracing::debug!(browser = %self.browser, from = ?self.state, to = ?next, "Process state");
        self.state = next;
    }

    /// Make sure the browser is not running, terminating it if necessary.
    ///
    /// Returns the terminal state: `Closed` on success. On failure the state is
    /// left at `TimeoutExceeded` (or `Terminating` when cancelled) and the error
    /// is returned.
    pub async fn ensure_closed<P: ProcessController + ?Sized>(
        &mut self,
        controller: &P,
        limit: Duration,
        poll_interval: Duration,
        control: &RunControl,
    ) -> Result<ProcessLifecycleState, ProcessError> {
        if !controller.is_running(self.browser).await? {
            self.transition(ProcessLifecycleState::Closed);
            return Ok(self.state);
        }

        self.transition(ProcessLifecycleState::Running);
        tracing::info!(browser = %self.browser, "Browser is running, terminating it");

        self.transition(ProcessLifecycleState::Terminating);
        self.terminated = true;
        tokio::select! {
            _ = controller.terminate(self.browser) => {}
            _ = control.cancelled() => return Err(ProcessError::Cancelled(self.browser)),
        }

        match await_closed(controller, self.browser, limit, poll_interval, control).await {
            Ok(()) => {
                self.transition(ProcessLifecycleState::Closed);
                Ok(self.state)
            }
            Err(e @ ProcessError::TimeoutExceeded { .. }) => {
                self.transition(ProcessLifecycleState::TimeoutExceeded);
                tracing::warn!(browser = %self.browser, "{}", e);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}

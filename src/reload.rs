// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Sidebar reload.
//!
//! Finder does not watch store files. Edits only show up after the shared
//! file list daemon restarts, and on some systems only after Finder itself
//! restarts. Both restarts are done by terminating the process, after which
//! launchd brings it back with fresh state.

use crate::config::ReloadSettings;

use std::{
    ffi::OsStr,
    fmt::{Display, Formatter, Result as FmtResult},
    process::Command,
};
use tracing::{debug, info, instrument, warn};

/// Outcome of signalling a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Process was running and got terminated.
    Terminated,

    /// No process with that name was running.
    NotRunning,
}

impl Display for Signal {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(match self {
            Self::Terminated => "restarted",
            Self::NotRunning => "not running",
        })
    }
}

/// Terminate processes by name.
pub trait ProcessSignaller {
    /// Terminate every process named `process`.
    ///
    /// # Errors
    ///
    /// - Return [`ReloadError::Signal`] if signal could not be delivered.
    fn terminate(&self, process: &str) -> Result<Signal>;
}

/// Signal processes through `killall`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Killall;

impl ProcessSignaller for Killall {
    fn terminate(&self, process: &str) -> Result<Signal> {
        syscall_killall(process)
    }
}

/// Processes touched by a reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadReport {
    /// Daemon outcome, none if it could not be signalled.
    pub daemon: Option<Signal>,

    /// Finder outcome, none if it was left alone.
    pub finder: Option<Signal>,
}

/// Restart processes so the sidebar picks up store changes.
#[derive(Debug, Clone)]
pub struct Reloader<S = Killall> {
    signaller: S,
    settings: ReloadSettings,
}

impl Reloader<Killall> {
    /// Construct new reloader that signals through `killall`.
    pub fn new(settings: ReloadSettings) -> Self {
        Self::with_signaller(Killall, settings)
    }
}

impl<S: ProcessSignaller> Reloader<S> {
    /// Construct new reloader with custom process signaller.
    pub fn with_signaller(signaller: S, settings: ReloadSettings) -> Self {
        Self {
            signaller,
            settings,
        }
    }

    /// Restart the shared file list daemon, and Finder if forced.
    ///
    /// Failing to signal the daemon is not fatal. Finder gets restarted
    /// instead so the change still becomes visible.
    ///
    /// # Errors
    ///
    /// - Return [`ReloadError::Signal`] if Finder needed a restart but could
    ///   not be signalled.
    #[instrument(skip(self), level = "debug")]
    pub fn reload(&self, force: bool) -> Result<ReloadReport> {
        let force = force || self.settings.always_force;

        let daemon = match self.signaller.terminate(&self.settings.daemon) {
            Ok(signal) => {
                debug!("{} {signal}", self.settings.daemon);
                Some(signal)
            }
            Err(err) => {
                warn!("{err}, fall back to restarting {}", self.settings.finder);
                None
            }
        };

        let finder = if force || daemon.is_none() {
            let signal = self.signaller.terminate(&self.settings.finder)?;
            debug!("{} {signal}", self.settings.finder);
            Some(signal)
        } else {
            None
        };

        info!("reloaded sidebar");
        Ok(ReloadReport { daemon, finder })
    }

    pub fn settings(&self) -> &ReloadSettings {
        &self.settings
    }
}

fn syscall_killall(process: impl AsRef<OsStr>) -> Result<Signal> {
    let output = Command::new("killall")
        .arg(process.as_ref())
        .output()
        .map_err(|err| ReloadError::Signal {
            process: process.as_ref().to_string_lossy().into_owned(),
            source: err,
        })?;

    if output.status.success() {
        return Ok(Signal::Terminated);
    }

    let stderr = String::from_utf8_lossy(output.stderr.as_slice());

    // INVARIANT: Missing process is success, macOS and psmisc word it differently.
    if stderr.contains("No matching processes") || stderr.contains("no process found") {
        return Ok(Signal::NotRunning);
    }

    let message = stderr.trim_end();
    Err(ReloadError::Signal {
        process: process.as_ref().to_string_lossy().into_owned(),
        source: std::io::Error::other(format!("command \"killall\" failed: {message}")),
    })
}

/// Reload error types.
#[derive(Debug, thiserror::Error)]
pub enum ReloadError {
    /// Failed to signal process.
    #[error("failed to signal {process:?}")]
    Signal {
        process: String,
        #[source]
        source: std::io::Error,
    },
}

/// Friendly result alias :3
pub type Result<T, E = ReloadError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::{cell::RefCell, collections::HashMap};

    #[derive(Default)]
    struct FakeSignaller {
        outcomes: HashMap<&'static str, Option<Signal>>,
        calls: RefCell<Vec<String>>,
    }

    impl FakeSignaller {
        fn with(mut self, process: &'static str, outcome: Option<Signal>) -> Self {
            self.outcomes.insert(process, outcome);
            self
        }
    }

    impl ProcessSignaller for &FakeSignaller {
        fn terminate(&self, process: &str) -> Result<Signal> {
            self.calls.borrow_mut().push(process.into());
            match self.outcomes.get(process).copied().flatten() {
                Some(signal) => Ok(signal),
                None => Err(ReloadError::Signal {
                    process: process.into(),
                    source: std::io::Error::other("operation not permitted"),
                }),
            }
        }
    }

    #[test]
    fn reload_only_touches_daemon() -> anyhow::Result<()> {
        let fake = FakeSignaller::default().with("sharedfilelistd", Some(Signal::Terminated));
        let report = Reloader::with_signaller(&fake, ReloadSettings::default()).reload(false)?;

        assert_eq!(
            report,
            ReloadReport {
                daemon: Some(Signal::Terminated),
                finder: None
            }
        );
        assert_eq!(*fake.calls.borrow(), vec!["sharedfilelistd".to_string()]);

        Ok(())
    }

    #[test]
    fn forced_reload_restarts_finder() -> anyhow::Result<()> {
        let fake = FakeSignaller::default()
            .with("sharedfilelistd", Some(Signal::NotRunning))
            .with("Finder", Some(Signal::Terminated));
        let report = Reloader::with_signaller(&fake, ReloadSettings::default()).reload(true)?;

        assert_eq!(
            report,
            ReloadReport {
                daemon: Some(Signal::NotRunning),
                finder: Some(Signal::Terminated)
            }
        );

        Ok(())
    }

    #[test]
    fn daemon_failure_falls_back_to_finder() -> anyhow::Result<()> {
        let fake = FakeSignaller::default().with("Finder", Some(Signal::Terminated));
        let report = Reloader::with_signaller(&fake, ReloadSettings::default()).reload(false)?;

        assert_eq!(report.daemon, None);
        assert_eq!(report.finder, Some(Signal::Terminated));
        assert_eq!(
            *fake.calls.borrow(),
            vec!["sharedfilelistd".to_string(), "Finder".to_string()]
        );

        Ok(())
    }

    #[test]
    fn always_force_setting_escalates() -> anyhow::Result<()> {
        let fake = FakeSignaller::default()
            .with("sharedfilelistd", Some(Signal::Terminated))
            .with("Finder", Some(Signal::NotRunning));
        let settings = ReloadSettings {
            always_force: true,
            ..Default::default()
        };
        let report = Reloader::with_signaller(&fake, settings).reload(false)?;

        assert_eq!(report.finder, Some(Signal::NotRunning));

        Ok(())
    }

    #[test]
    fn finder_failure_is_error() {
        let fake = FakeSignaller::default();
        let result = Reloader::with_signaller(&fake, ReloadSettings::default()).reload(false);
        assert!(matches!(result, Err(ReloadError::Signal { process, .. }) if process == "Finder"));
    }
}

//! Narrow capability for invoking external diagnostic commands.
//!
//! Interface-resolution fallbacks and process attribution shell out to
//! `ip` and `ss`, both consumed as line-oriented text. The capability is a
//! single "run this command, return its stdout" operation so unit tests can
//! inject canned output instead of requiring a live system.

use std::{io, process::Command};

use tracing::trace;

/// Candidate install paths for `ip`, tried in order. Service managers often
/// run with a minimal PATH that misses sbin directories.
pub const IP_COMMAND_PATHS: &[&str] = &["ip", "/usr/bin/ip", "/bin/ip", "/sbin/ip", "/usr/sbin/ip"];

/// Candidate install paths for `ss`.
pub const SS_COMMAND_PATHS: &[&str] = &["ss", "/usr/bin/ss", "/bin/ss", "/sbin/ss", "/usr/sbin/ss"];

pub trait DiagnosticRunner: Send + Sync {
    /// Run `program` with `args` and return its standard output as text.
    ///
    /// # Errors
    ///
    /// Returns [`io::Error`] if the program cannot be spawned or exits
    /// unsuccessfully.
    fn run(&self, program: &str, args: &[&str]) -> io::Result<String>;
}

/// Production runner backed by [`std::process::Command`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl DiagnosticRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> io::Result<String> {
        let output = Command::new(program).args(args).output()?;
        if !output.status.success() {
            return Err(io::Error::other(format!(
                "{program} exited with {}",
                output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Run `args` against each candidate path, returning the first success.
///
/// Returns `None` when no candidate works; callers degrade rather than
/// fail, so this logs at trace only.
pub fn run_first(
    runner: &dyn DiagnosticRunner,
    candidates: &[&str],
    args: &[&str],
) -> Option<String> {
    for program in candidates {
        match runner.run(program, args) {
            Ok(output) => {
                trace!(
                    event.name = "diag.command_ok",
                    process.command = %program,
                    "diagnostic command succeeded"
                );
                return Some(output);
            }
            Err(error) => {
                trace!(
                    event.name = "diag.command_failed",
                    process.command = %program,
                    error = %error,
                    "diagnostic command candidate failed"
                );
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Runner that records invocations and fails for all but one program.
    struct PickyRunner {
        accepts: &'static str,
        calls: Mutex<Vec<String>>,
    }

    impl DiagnosticRunner for PickyRunner {
        fn run(&self, program: &str, _args: &[&str]) -> io::Result<String> {
            self.calls.lock().unwrap().push(program.to_owned());
            if program == self.accepts {
                Ok("output".to_owned())
            } else {
                Err(io::Error::new(io::ErrorKind::NotFound, "no such file"))
            }
        }
    }

    #[test]
    fn run_first_walks_candidates_in_order() {
        let runner = PickyRunner {
            accepts: "/sbin/ip",
            calls: Mutex::new(Vec::new()),
        };
        let output = run_first(&runner, IP_COMMAND_PATHS, &["-4", "addr", "show"]);
        assert_eq!(output.as_deref(), Some("output"));
        assert_eq!(
            *runner.calls.lock().unwrap(),
            vec!["ip", "/usr/bin/ip", "/bin/ip", "/sbin/ip"]
        );
    }

    #[test]
    fn run_first_returns_none_when_all_fail() {
        let runner = PickyRunner {
            accepts: "nothing",
            calls: Mutex::new(Vec::new()),
        };
        assert!(run_first(&runner, SS_COMMAND_PATHS, &["-tulnp"]).is_none());
    }
}

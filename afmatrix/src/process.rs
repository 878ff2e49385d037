use std::{
    collections::VecDeque,
    ffi::OsStr,
    fmt,
    io::{self, BufRead, BufReader, Read},
    num::NonZeroI32,
    process,
    sync::{Mutex, PoisonError},
    thread,
    time::Duration,
};

use log::{debug, info};

use crate::cancellation::Cancellation;

/// How often a running child is checked for completion and cancellation.
const POLLING_INTERVAL: Duration = Duration::from_millis(200);

/// Number of trailing output lines kept as diagnostics.
const TAIL_LINES: usize = 40;

pub struct Command(process::Command);

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Command {
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self(process::Command::new(program))
    }

    pub fn args<'a, I>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = &'a OsStr>,
    {
        self.0.args(args);
        self
    }

    pub fn program(&self) -> &OsStr {
        self.0.get_program()
    }

    pub fn arguments(&self) -> impl Iterator<Item = &OsStr> {
        self.0.get_args()
    }

    /// Runs the command to completion while forwarding its output to the log, prefixed by `label`. The child is killed
    /// when `cancellation` is triggered. The last lines of output are kept for diagnostics.
    pub fn run_logged(mut self, label: &str, cancellation: &Cancellation) -> Result<Completed, Error> {
        if log::log_enabled!(log::Level::Debug) {
            debug!("running `{command:?}`...", command = &self.0);
        }

        let mut child = match self
            .0
            .stdin(process::Stdio::null())
            .stdout(process::Stdio::piped())
            .stderr(process::Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(error) => {
                return Err(Error {
                    command: self,
                    kind: error.into(),
                })
            }
        };

        let tail = Mutex::new(VecDeque::with_capacity(TAIL_LINES));
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let waited = thread::scope(|scope| {
            if let Some(stdout) = stdout {
                scope.spawn(|| forward_lines(stdout, label, &tail));
            }
            if let Some(stderr) = stderr {
                scope.spawn(|| forward_lines(stderr, label, &tail));
            }

            loop {
                match child.try_wait() {
                    Ok(Some(status)) => break Ok(status),
                    Ok(None) => {}
                    Err(error) => break Err(ErrorKind::from(error)),
                }
                if cancellation.is_cancelled() {
                    debug!("killing `{command:?}`", command = &self.0);
                    // The child may have exited in the meantime, which is fine.
                    let _ = child.kill();
                    let _ = child.wait();
                    break Err(ErrorKind::Cancelled);
                }
                thread::sleep(POLLING_INTERVAL);
            }
        });

        let tail = tail
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .into_iter()
            .collect::<Vec<_>>()
            .join("\n");

        match waited {
            Ok(status) => Ok(Completed {
                command: self,
                status,
                tail,
            }),
            Err(kind) => Err(Error {
                command: self,
                kind,
            }),
        }
    }
}

// Reads until EOF even when a line is not valid UTF-8, since a child writing to a closed pipe is killed by SIGPIPE.
fn forward_lines(stream: impl Read, label: &str, tail: &Mutex<VecDeque<String>>) {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {}
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => {
                debug!("[{label}] stopped reading output: {error}");
                break;
            }
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\n', '\r']);
        info!("[{label}] {line}");
        let mut tail = tail.lock().unwrap_or_else(PoisonError::into_inner);
        if tail.len() == TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line.to_owned());
    }
}

#[derive(Debug)]
pub struct Completed {
    command: Command,
    status: process::ExitStatus,
    /// The last lines the command printed.
    pub tail: String,
}

impl Completed {
    pub fn require_success(self) -> Result<Completed, Error> {
        if self.status.success() {
            Ok(self)
        } else {
            let Completed {
                command,
                status,
                tail,
            } = self;
            Err(Error {
                command,
                kind: ErrorKind::NonZeroExitStatus {
                    code: status.code().and_then(NonZeroI32::new),
                    tail,
                },
            })
        }
    }
}

#[derive(Debug)]
pub enum ErrorKind {
    NotFound,
    PermissionDenied,
    Io(io::Error),
    NonZeroExitStatus {
        code: Option<NonZeroI32>,
        tail: String,
    },
    Cancelled,
}

impl From<io::Error> for ErrorKind {
    fn from(value: io::Error) -> Self {
        match value.kind() {
            io::ErrorKind::NotFound => ErrorKind::NotFound,
            io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            _ => ErrorKind::Io(value),
        }
    }
}

#[derive(Debug)]
pub struct Error {
    pub command: Command,
    pub kind: ErrorKind,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let program = self.command.0.get_program().to_string_lossy();
        write!(f, "failed to run `{program}`: ")?;
        match &self.kind {
            ErrorKind::NotFound => {
                write!(f, "the `{program}` command is required but not available on your system, please install it")
            }
            ErrorKind::PermissionDenied => {
                write!(f, "the `{program}` command is available but does not have the right permissions, please make sure the binary is executable")
            }
            ErrorKind::Io(error) => write!(f, "{error}"),
            ErrorKind::NonZeroExitStatus { code, tail } => {
                match code {
                    Some(code) => write!(f, "exited with non-zero exit code `{code}`")?,
                    None => write!(f, "did not run successfully")?,
                }
                if !tail.is_empty() {
                    write!(f, "\n{tail}")?;
                }
                Ok(())
            }
            ErrorKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::error::Error for Error {}

/// Creates a new [`Command`] and supplies the provided arguments, if any, while calling
/// [`std::convert::AsRef::as_ref`] on each.
macro_rules! command {
    ($program:expr, $($arg:expr),* $(,)?) => {
        $crate::process::args!($crate::process::Command::new($program), $($arg,)*)
    };
}

/// Calls [`Command::args`] on the provided [`Command`] while calling [`std::convert::AsRef::as_ref`]
/// on each argument.
macro_rules! args {
    ($program:expr, $($arg:expr),+ $(,)?) => {
        $program.args([
            $(::std::convert::AsRef::<::std::ffi::OsStr>::as_ref(&$arg),)*
        ])
    }
}

pub(crate) use args;
pub(crate) use command;

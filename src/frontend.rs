//! Interactive front end contract and the console implementation.
use std::{
    io::{self, Write},
    os::fd::AsFd,
};

use nix::{
    errno::Errno,
    poll::{PollFd, PollFlags, PollTimeout, poll},
    unistd::read,
};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumString};
use tracing::{debug, info, warn};

use crate::{
    constants::SESSION_FILE_NAME,
    context::{AppContext, FrontendOptions},
    error::{FrontendError, StateError},
    runloop::LoopControl,
    service::ServiceHandle,
    state::StateStore,
};

/// What the lifecycle needs from the interactive front end.
///
/// `init` and `resume_session_if_possible` run on the first main loop turn,
/// never before the loop is live. Dropping the front end is its destructor and
/// always happens before the service is destroyed.
pub trait Frontend {
    /// Deferred initialization.
    fn init(&mut self) -> Result<(), FrontendError>;

    /// Restores the previous session when one was recorded.
    fn resume_session_if_possible(&mut self);

    /// Handles pending input without blocking.
    fn process_events(&mut self) -> LoopControl;
}

/// Result of polling a line source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// A complete line, without its terminator.
    Line(String),
    /// Nothing complete yet.
    Pending,
    /// Input is closed.
    Closed,
}

/// Non-blocking line input.
pub trait LineSource {
    /// Returns the next complete line if one is available.
    fn next_line(&mut self) -> LineEvent;
}

/// Stdin, read with `poll(2)` so the main loop never blocks on the terminal.
#[derive(Debug, Default)]
pub struct StdinLines {
    pending: Vec<u8>,
    closed: bool,
}

impl StdinLines {
    fn take_line(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|b| *b == b'\n')?;
        let raw: Vec<u8> = self.pending.drain(..=end).collect();
        let line = String::from_utf8_lossy(&raw[..end]);
        Some(line.trim_end_matches('\r').to_string())
    }

    fn take_remainder(&mut self) -> LineEvent {
        if self.pending.is_empty() {
            return LineEvent::Closed;
        }
        let raw = std::mem::take(&mut self.pending);
        LineEvent::Line(String::from_utf8_lossy(&raw).trim_end().to_string())
    }

    fn fill(&mut self) {
        let stdin = io::stdin();
        let mut fds = [PollFd::new(stdin.as_fd(), PollFlags::POLLIN)];
        match poll(&mut fds, PollTimeout::from(0u16)) {
            Ok(ready) if ready > 0 => {}
            _ => return,
        }

        let mut chunk = [0u8; 1024];
        match read(libc::STDIN_FILENO, &mut chunk) {
            Ok(0) => self.closed = true,
            Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
            Err(Errno::EAGAIN | Errno::EINTR) => {}
            Err(err) => {
                warn!("Reading stdin failed, treating input as closed: {err}");
                self.closed = true;
            }
        }
    }
}

impl LineSource for StdinLines {
    fn next_line(&mut self) -> LineEvent {
        if let Some(line) = self.take_line() {
            return LineEvent::Line(line);
        }
        if !self.closed {
            self.fill();
        }
        match self.take_line() {
            Some(line) => LineEvent::Line(line),
            None if self.closed => self.take_remainder(),
            None => LineEvent::Pending,
        }
    }
}

/// Which screen the console shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum View {
    /// Banner.
    #[default]
    Welcome,
    /// Service status.
    Status,
    /// Command list.
    Help,
}

/// Persisted console session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontendSession {
    /// View shown at exit.
    pub last_view: String,
    /// Commands handled during the session.
    pub commands: u64,
}

/// Line-oriented terminal front end.
pub struct ConsoleFrontend {
    banner: String,
    options: FrontendOptions,
    service: Option<ServiceHandle>,
    input: Box<dyn LineSource>,
    output: Box<dyn Write>,
    session: StateStore<FrontendSession>,
    view: View,
    commands: u64,
}

impl ConsoleFrontend {
    /// Console over arbitrary input and output.
    pub fn new(
        ctx: &AppContext,
        service: Option<ServiceHandle>,
        input: Box<dyn LineSource>,
        output: Box<dyn Write>,
    ) -> Self {
        Self {
            banner: ctx.banner(),
            options: ctx.frontend.clone(),
            service,
            input,
            output,
            session: StateStore::new(ctx.frontend.data_dir.join(SESSION_FILE_NAME)),
            view: View::default(),
            commands: 0,
        }
    }

    /// Console on the process's stdin and stdout.
    pub fn stdio(ctx: &AppContext, service: Option<ServiceHandle>) -> Self {
        Self::new(
            ctx,
            service,
            Box::new(StdinLines::default()),
            Box::new(io::stdout()),
        )
    }

    fn switch_view(&mut self, view: View) {
        if self.options.debug_buffer_switches && view != self.view {
            debug!("Switching view {} -> {}", self.view.as_ref(), view.as_ref());
        }
        self.view = view;
    }

    fn print_status(&mut self) -> io::Result<()> {
        let status = match &self.service {
            None => None,
            Some(handle) => match handle.upgrade() {
                Some(service) => Some(service.borrow().status()),
                None => {
                    return writeln!(self.output, "service is gone");
                }
            },
        };

        match status {
            None => writeln!(self.output, "no local service in this process"),
            Some(status) => {
                if self.options.debug_model {
                    debug!("Service model: {status:?}");
                }
                match status.listen_addr {
                    Some(addr) => writeln!(
                        self.output,
                        "listening on {addr}, {} known session(s)",
                        status.sessions
                    ),
                    None => writeln!(self.output, "service is not listening"),
                }
            }
        }
    }

    fn handle_command(&mut self, command: &str) -> io::Result<LoopControl> {
        self.commands += 1;
        match command {
            "quit" | "exit" => return Ok(LoopControl::Quit(0)),
            "status" => {
                self.switch_view(View::Status);
                self.print_status()?;
            }
            "help" => {
                self.switch_view(View::Help);
                writeln!(self.output, "commands: status, help, quit")?;
            }
            other => writeln!(self.output, "unknown command '{other}' (try 'help')")?,
        }
        self.output.flush()?;
        Ok(LoopControl::Continue)
    }
}

impl Frontend for ConsoleFrontend {
    fn init(&mut self) -> Result<(), FrontendError> {
        writeln!(self.output, "{}", self.banner)?;
        match &self.service {
            None => writeln!(self.output, "no local service in this process")?,
            Some(handle) => {
                let service = handle.upgrade().ok_or(FrontendError::ServiceUnavailable)?;
                let status = service.borrow().status();
                if let Some(addr) = status.listen_addr {
                    writeln!(self.output, "service listening on {addr}")?;
                }
            }
        }
        writeln!(self.output, "type 'help' for commands")?;
        self.output.flush()?;
        Ok(())
    }

    fn resume_session_if_possible(&mut self) {
        match self.session.load() {
            Ok(session) => {
                let view = session.last_view.parse().unwrap_or_default();
                info!(
                    "Resuming previous session ({} command(s), view '{}')",
                    session.commands, session.last_view
                );
                self.switch_view(view);
            }
            Err(StateError::NotFound(_)) => debug!("No previous front end session"),
            Err(err) => warn!("Couldn't resume previous session: {err}"),
        }
    }

    fn process_events(&mut self) -> LoopControl {
        loop {
            let line = match self.input.next_line() {
                LineEvent::Line(line) => line,
                LineEvent::Pending => return LoopControl::Continue,
                LineEvent::Closed => {
                    debug!("Input closed; leaving main loop");
                    return LoopControl::Quit(0);
                }
            };

            let command = line.trim();
            if command.is_empty() {
                continue;
            }
            match self.handle_command(command) {
                Ok(LoopControl::Continue) => {}
                Ok(quit) => return quit,
                Err(err) => warn!("Console output failed: {err}"),
            }
        }
    }
}

impl Drop for ConsoleFrontend {
    fn drop(&mut self) {
        let session = FrontendSession {
            last_view: self.view.as_ref().to_string(),
            commands: self.commands,
        };
        if let Err(err) = self.session.save(&session) {
            warn!("Couldn't record front end session: {err}");
        }
    }
}

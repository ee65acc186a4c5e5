//! The main event loop.
//!
//! Each turn checks the shutdown flag first, then gives the handler a turn, then
//! sleeps on the wakeup pipe for at most one tick. A signal arriving mid-sleep
//! writes to the pipe, so the loop notices it without waiting out the tick.
use std::time::Duration;

use nix::{
    errno::Errno,
    poll::{PollFd, PollFlags, PollTimeout, poll},
};
use tracing::{debug, info, warn};

use crate::signals::SignalRouter;

/// What the loop does after a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    /// Keep going.
    Continue,
    /// Leave the loop with this exit code.
    Quit(i32),
}

/// Work driven by [`MainLoop`].
pub trait LoopHandler {
    /// Runs once, on the first turn, after the loop is live.
    fn started(&mut self) -> LoopControl {
        LoopControl::Continue
    }

    /// One turn of work. Must not block for longer than a tick.
    fn turn(&mut self) -> LoopControl;
}

/// Single-threaded loop that exits on a shutdown request or when the handler
/// asks it to.
pub struct MainLoop<'a> {
    router: &'a SignalRouter,
    tick: Duration,
}

impl<'a> MainLoop<'a> {
    /// Loop woken by `router` and ticking every `tick`.
    pub fn new(router: &'a SignalRouter, tick: Duration) -> Self {
        Self { router, tick }
    }

    /// Runs until shutdown is requested or the handler quits. A signal-driven
    /// exit returns 0.
    pub fn run(&self, handler: &mut dyn LoopHandler) -> i32 {
        let flag = self.router.flag();
        let mut started = false;
        debug!("Main loop ticking every {:?}", self.tick);

        loop {
            if let Some(signal) = flag.requested_signal() {
                info!("Caught signal {signal} - exiting.");
                return 0;
            }

            let control = if started {
                handler.turn()
            } else {
                started = true;
                match handler.started() {
                    LoopControl::Continue => handler.turn(),
                    quit => quit,
                }
            };
            if let LoopControl::Quit(code) = control {
                debug!("Main loop finished with exit code {code}");
                return code;
            }

            if flag.is_requested() {
                continue;
            }
            self.wait();
        }
    }

    fn wait(&self) {
        let pipe = self.router.pipe();
        let millis = u16::try_from(self.tick.as_millis()).unwrap_or(u16::MAX);
        let mut fds = [PollFd::new(pipe.reader(), PollFlags::POLLIN)];

        match poll(&mut fds, PollTimeout::from(millis)) {
            Ok(0) | Err(Errno::EINTR) => {}
            Ok(_) => pipe.drain(),
            Err(err) => warn!("Waiting on wakeup pipe failed: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::ShutdownFlag;
    use std::{
        thread,
        time::{Duration, Instant},
    };

    fn leaked_flag() -> &'static ShutdownFlag {
        Box::leak(Box::new(ShutdownFlag::new()))
    }

    #[derive(Default)]
    struct Counter {
        started: usize,
        turns: usize,
        quit_after: Option<usize>,
        request_after: Option<(usize, &'static ShutdownFlag)>,
    }

    impl LoopHandler for Counter {
        fn started(&mut self) -> LoopControl {
            self.started += 1;
            LoopControl::Continue
        }

        fn turn(&mut self) -> LoopControl {
            self.turns += 1;
            if let Some((after, flag)) = self.request_after
                && self.turns >= after
            {
                flag.request(libc::SIGINT);
                flag.request(libc::SIGINT);
            }
            match self.quit_after {
                Some(after) if self.turns >= after => LoopControl::Quit(7),
                _ => LoopControl::Continue,
            }
        }
    }

    #[test]
    fn handler_quit_returns_its_code() {
        let router = SignalRouter::detached(leaked_flag()).unwrap();
        let mut counter = Counter {
            quit_after: Some(3),
            ..Counter::default()
        };

        let code = MainLoop::new(&router, Duration::from_millis(1)).run(&mut counter);
        assert_eq!(code, 7);
        assert_eq!(counter.started, 1);
        assert_eq!(counter.turns, 3);
    }

    #[test]
    fn requested_flag_exits_with_zero_before_any_turn() {
        let flag = leaked_flag();
        let router = SignalRouter::detached(flag).unwrap();
        flag.request(libc::SIGTERM);

        let mut counter = Counter::default();
        let code = MainLoop::new(&router, Duration::from_millis(1)).run(&mut counter);
        assert_eq!(code, 0);
        assert_eq!(counter.turns, 0);
    }

    #[test]
    fn repeated_requests_exit_once() {
        let flag = leaked_flag();
        let router = SignalRouter::detached(flag).unwrap();
        let mut counter = Counter {
            request_after: Some((2, flag)),
            ..Counter::default()
        };

        let code = MainLoop::new(&router, Duration::from_millis(1)).run(&mut counter);
        assert_eq!(code, 0);
        assert_eq!(counter.turns, 2);
    }

    #[test]
    fn wakeup_cuts_the_tick_short() {
        let flag = leaked_flag();
        let router = SignalRouter::detached(flag).unwrap();
        let waker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            flag.request(libc::SIGINT);
        });

        let started = Instant::now();
        let mut counter = Counter::default();
        let code = MainLoop::new(&router, Duration::from_secs(30)).run(&mut counter);
        waker.join().unwrap();

        assert_eq!(code, 0);
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}

//! Process lifecycle: install signal routing, bring subsystems up in order, run
//! the main loop, then persist state and tear down in reverse order.
//!
//! ```text
//! Uninitialized --install--> SubsystemsUp --loop--> Running --exit--> SubsystemsDown
//! ```
use std::{cell::RefCell, collections::VecDeque, rc::Rc};

use tracing::{debug, error, info, warn};

use crate::{
    constants::STARTUP_FAILURE_EXIT_CODE,
    context::AppContext,
    error::{FrontendError, LifecycleError, ServiceError, StateError},
    frontend::{ConsoleFrontend, Frontend},
    runloop::{LoopControl, LoopHandler, MainLoop},
    service::{HeadlessService, ServiceHandle, SharedService},
    signals::{FaultKind, SignalRouter},
};

/// Where the orchestrator is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    /// Nothing has happened yet.
    Uninitialized,
    /// Handlers installed and subsystems constructed.
    SubsystemsUp,
    /// Main loop running.
    Running,
    /// Subsystems released.
    SubsystemsDown,
}

/// Builds the subsystems for a run mode. Each method is called at most once per
/// orchestrator.
pub trait SubsystemFactory {
    /// Constructs the networked service.
    fn create_service(&self, ctx: &AppContext) -> Result<SharedService, ServiceError>;

    /// Constructs the interactive front end. `service` is set when the mode also
    /// runs a service in this process.
    fn create_frontend(
        &self,
        ctx: &AppContext,
        service: Option<ServiceHandle>,
    ) -> Result<Box<dyn Frontend>, FrontendError>;
}

/// [`HeadlessService`] and a [`ConsoleFrontend`] on stdio.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSubsystems;

impl SubsystemFactory for DefaultSubsystems {
    fn create_service(&self, ctx: &AppContext) -> Result<SharedService, ServiceError> {
        let service: SharedService = Rc::new(RefCell::new(HeadlessService::bind(&ctx.service)?));
        Ok(service)
    }

    fn create_frontend(
        &self,
        ctx: &AppContext,
        service: Option<ServiceHandle>,
    ) -> Result<Box<dyn Frontend>, FrontendError> {
        Ok(Box::new(ConsoleFrontend::stdio(ctx, service)))
    }
}

/// Work queued before the loop starts and run on its first turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeferredTask {
    InitFrontend,
    ResumeSession,
    RaiseFault(FaultKind),
}

/// Loop handler over the live subsystems.
struct Running<'s> {
    service: Option<&'s SharedService>,
    frontend: Option<&'s mut Box<dyn Frontend>>,
    deferred: VecDeque<DeferredTask>,
}

impl Running<'_> {
    fn run_deferred(&mut self, task: DeferredTask) -> LoopControl {
        match (task, self.frontend.as_mut()) {
            (DeferredTask::InitFrontend, Some(frontend)) => {
                if let Err(err) = frontend.init() {
                    error!("Front end failed to start: {err}");
                    return LoopControl::Quit(STARTUP_FAILURE_EXIT_CODE);
                }
            }
            (DeferredTask::ResumeSession, Some(frontend)) => {
                frontend.resume_session_if_possible();
            }
            (DeferredTask::RaiseFault(kind), _) => {
                warn!("Raising {kind} fault on request");
                if let Err(err) = kind.raise() {
                    warn!("Couldn't raise {kind}: {err}");
                }
            }
            (_, None) => {}
        }
        LoopControl::Continue
    }
}

impl LoopHandler for Running<'_> {
    fn started(&mut self) -> LoopControl {
        while let Some(task) = self.deferred.pop_front() {
            debug!("Running deferred task {task:?}");
            if let LoopControl::Quit(code) = self.run_deferred(task) {
                return LoopControl::Quit(code);
            }
        }
        LoopControl::Continue
    }

    fn turn(&mut self) -> LoopControl {
        if let Some(service) = self.service
            && let Err(err) = service.borrow_mut().poll()
        {
            warn!("Service poll failed: {err}");
        }
        match self.frontend.as_mut() {
            Some(frontend) => frontend.process_events(),
            None => LoopControl::Continue,
        }
    }
}

/// Drives one run of the process lifecycle.
pub struct Orchestrator<'a, F: SubsystemFactory> {
    ctx: &'a AppContext,
    factory: F,
    router: SignalRouter,
    phase: LifecyclePhase,
    service: Option<SharedService>,
    frontend: Option<Box<dyn Frontend>>,
}

impl<'a, F: SubsystemFactory> Orchestrator<'a, F> {
    /// Orchestrator for `ctx`, building subsystems with `factory` and woken by
    /// `router`.
    pub fn new(ctx: &'a AppContext, factory: F, router: SignalRouter) -> Self {
        Self {
            ctx,
            factory,
            router,
            phase: LifecyclePhase::Uninitialized,
            service: None,
            frontend: None,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> LifecyclePhase {
        self.phase
    }

    /// Runs the whole lifecycle and returns the process exit code. Errors are
    /// returned only when startup fails; whatever was constructed is torn down
    /// first.
    pub fn run(&mut self) -> Result<i32, LifecycleError> {
        if self.phase != LifecyclePhase::Uninitialized {
            return Err(LifecycleError::AlreadyRan);
        }

        if let Err(err) = self.start() {
            self.teardown();
            return Err(err);
        }
        self.restore();

        self.phase = LifecyclePhase::Running;
        info!("Entering main loop in {} mode", self.ctx.mode);
        let deferred = self.deferred_tasks();
        let mut running = Running {
            service: self.service.as_ref(),
            frontend: self.frontend.as_mut(),
            deferred,
        };
        let code = MainLoop::new(&self.router, self.ctx.tick).run(&mut running);

        self.save();
        self.teardown();
        info!("Exiting with code {code}");
        Ok(code)
    }

    fn start(&mut self) -> Result<(), LifecycleError> {
        self.router.install_handlers()?;

        if self.ctx.mode.runs_service() {
            self.service = Some(self.factory.create_service(self.ctx)?);
            debug!("Service constructed");
        }
        if self.ctx.mode.runs_frontend() {
            let handle = self.service.as_ref().map(Rc::downgrade);
            self.frontend = Some(self.factory.create_frontend(self.ctx, handle)?);
            debug!("Front end constructed");
        }

        self.phase = LifecyclePhase::SubsystemsUp;
        Ok(())
    }

    fn restore(&mut self) {
        let Some(service) = &self.service else {
            return;
        };
        if !self.ctx.service.restore {
            info!("Not restoring service state (--norestore)");
            return;
        }
        match service.borrow_mut().restore_state() {
            Ok(()) => {}
            Err(StateError::NotFound(path)) => {
                warn!("No saved state at {}; starting fresh", path.display())
            }
            Err(err) => warn!("Couldn't restore service state; starting fresh: {err}"),
        }
    }

    fn deferred_tasks(&self) -> VecDeque<DeferredTask> {
        let mut tasks = VecDeque::new();
        if self.frontend.is_some() {
            tasks.push_back(DeferredTask::InitFrontend);
            tasks.push_back(DeferredTask::ResumeSession);
        }
        if let Some(kind) = self.ctx.raise_fault {
            tasks.push_back(DeferredTask::RaiseFault(kind));
        }
        tasks
    }

    fn save(&mut self) {
        if let Some(service) = &self.service
            && let Err(err) = service.borrow_mut().save_state()
        {
            warn!("Couldn't save service state: {err}");
        }
    }

    /// Front end first, then the service.
    fn teardown(&mut self) {
        if let Some(frontend) = self.frontend.take() {
            drop(frontend);
            debug!("Front end dropped");
        }
        if let Some(service) = self.service.take() {
            service.borrow_mut().destroy();
            debug!("Service destroyed");
        }
        self.phase = LifecyclePhase::SubsystemsDown;
    }
}

impl<F: SubsystemFactory> Drop for Orchestrator<'_, F> {
    fn drop(&mut self) {
        if self.service.is_some() || self.frontend.is_some() {
            self.teardown();
        }
    }
}

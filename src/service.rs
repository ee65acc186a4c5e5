//! Headless service contract and the default implementation.
use std::{
    cell::RefCell,
    io,
    net::{Ipv4Addr, SocketAddr, TcpListener},
    rc::{Rc, Weak},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    constants::STATE_FILE_NAME,
    context::ServiceOptions,
    error::{ServiceError, StateError},
    state::StateStore,
};

/// Snapshot of the service for the front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    /// Bound listen address, once listening.
    pub listen_addr: Option<SocketAddr>,
    /// Number of known peers.
    pub sessions: usize,
}

/// What the lifecycle needs from the networked service.
///
/// The orchestrator constructs the service exactly once, calls
/// [`restore_state`](Service::restore_state) before the main loop unless restoring
/// is disabled, [`save_state`](Service::save_state) after it, and
/// [`destroy`](Service::destroy) only after the front end is gone.
pub trait Service {
    /// Loads persisted state. Failure is tolerated by the caller.
    fn restore_state(&mut self) -> Result<(), StateError>;

    /// Persists state. Failure is tolerated by the caller.
    fn save_state(&mut self) -> Result<(), StateError>;

    /// Work for one main loop turn. Must not block.
    fn poll(&mut self) -> Result<(), ServiceError> {
        Ok(())
    }

    /// Current status.
    fn status(&self) -> ServiceStatus;

    /// Releases sockets and other resources.
    fn destroy(&mut self);
}

/// Owning handle kept by the orchestrator.
pub type SharedService = Rc<RefCell<dyn Service>>;

/// Back-reference handed to the front end.
pub type ServiceHandle = Weak<RefCell<dyn Service>>;

/// One peer that has connected to the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Peer IP address.
    pub peer: String,
    /// First connection time.
    pub first_seen: DateTime<Utc>,
    /// Most recent connection time.
    pub last_seen: DateTime<Utc>,
    /// Number of connections accepted from this peer.
    pub connections: u64,
}

/// Persisted service state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRegistry {
    sessions: Vec<SessionRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    saved_at: Option<DateTime<Utc>>,
}

impl SessionRegistry {
    /// Notes a connection from `peer` at `now`.
    pub fn record(&mut self, peer: &str, now: DateTime<Utc>) {
        match self.sessions.iter_mut().find(|s| s.peer == peer) {
            Some(session) => {
                session.last_seen = now;
                session.connections += 1;
            }
            None => self.sessions.push(SessionRecord {
                peer: peer.to_string(),
                first_seen: now,
                last_seen: now,
                connections: 1,
            }),
        }
    }

    /// Known peers.
    pub fn sessions(&self) -> &[SessionRecord] {
        &self.sessions
    }

    /// When this registry was last persisted.
    pub fn saved_at(&self) -> Option<DateTime<Utc>> {
        self.saved_at
    }
}

/// Default service: accepts TCP connections and tracks the peers it has seen.
/// It speaks no protocol; accepted connections are closed straight away.
#[derive(Debug)]
pub struct HeadlessService {
    listener: Option<TcpListener>,
    store: StateStore<SessionRegistry>,
    registry: SessionRegistry,
}

impl HeadlessService {
    /// Binds the listener on all interfaces.
    pub fn bind(options: &ServiceOptions) -> Result<Self, ServiceError> {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, options.port))
            .map_err(|source| ServiceError::Bind {
                port: options.port,
                source,
            })?;
        listener.set_nonblocking(true)?;
        info!("Service listening on {}", listener.local_addr()?);

        Ok(Self {
            listener: Some(listener),
            store: StateStore::new(options.data_dir.join(STATE_FILE_NAME)),
            registry: SessionRegistry::default(),
        })
    }

    /// Persisted and live session data.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }
}

impl Service for HeadlessService {
    fn restore_state(&mut self) -> Result<(), StateError> {
        self.registry = self.store.load()?;
        info!(
            "Restored {} session(s) from {}",
            self.registry.sessions.len(),
            self.store.path().display()
        );
        Ok(())
    }

    fn save_state(&mut self) -> Result<(), StateError> {
        self.registry.saved_at = Some(Utc::now());
        self.store.save(&self.registry)?;
        info!("Saved service state to {}", self.store.path().display());
        Ok(())
    }

    fn poll(&mut self) -> Result<(), ServiceError> {
        let Some(listener) = self.listener.as_ref() else {
            return Ok(());
        };

        loop {
            match listener.accept() {
                Ok((stream, peer)) => {
                    debug!("Accepted connection from {peer}");
                    self.registry.record(&peer.ip().to_string(), Utc::now());
                    drop(stream);
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn status(&self) -> ServiceStatus {
        ServiceStatus {
            listen_addr: self
                .listener
                .as_ref()
                .and_then(|listener| listener.local_addr().ok()),
            sessions: self.registry.sessions.len(),
        }
    }

    fn destroy(&mut self) {
        if self.listener.take().is_some() {
            info!("Service stopped listening");
        }
    }
}

//! Relay leg connection state machine
//!
//! Wraps one media engine transport and tracks whether the client side of
//! the leg ever finished its secure-channel handshake.

use crate::config::PeerConfig;
use crate::engine::{DtlsState, IceState, MediaTransport, TransportSignal};
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Span};
use uuid::Uuid;

/// Relay leg connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created, waiting for the client to finish the handshake
    Connecting,
    /// Secure channel established
    Connected,
    /// Closed by request, transport failure or timeout. Terminal.
    Closed,
}

/// Handle returned by [`PeerConnection::add_listener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Connection state listener
pub type StateListener = Arc<dyn Fn(ConnectionState) + Send + Sync>;

/// Connection state machine of one relay leg
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct PeerConnection {
    inner: Arc<PeerInner>,
}

struct PeerInner {
    /// Unique identifier for this connection instance
    connection_id: Uuid,

    /// Leg name used in log output
    name: String,

    state: Mutex<ConnectionState>,

    listeners: Mutex<Vec<(ListenerId, StateListener)>>,
    next_listener_id: AtomicU64,

    /// Engine transport, released exactly once on close
    transport: Arc<dyn MediaTransport>,

    connect_timeout: Duration,

    /// Signal/timeout watcher spawned by `start()`
    watcher: Mutex<Option<JoinHandle<()>>>,

    created_at: Instant,
    connected_at: Mutex<Option<Instant>>,

    span: Span,
}

impl PeerConnection {
    /// Create a new connection state machine around `transport`
    ///
    /// The machine starts in `Connecting`. Nothing is watched until
    /// [`start`](Self::start) is called.
    pub fn new(
        name: impl Into<String>,
        transport: Arc<dyn MediaTransport>,
        config: &PeerConfig,
        parent: &Span,
    ) -> Self {
        let name = name.into();
        let transport_id = transport.id();
        let span = info_span!(parent: parent, "peer", name = %name, transport = %transport_id);

        debug!(parent: &span, "Creating relay peer connection");

        Self {
            inner: Arc::new(PeerInner {
                connection_id: Uuid::new_v4(),
                name,
                state: Mutex::new(ConnectionState::Connecting),
                listeners: Mutex::new(Vec::new()),
                next_listener_id: AtomicU64::new(0),
                transport,
                connect_timeout: config.connect_timeout(),
                watcher: Mutex::new(None),
                created_at: Instant::now(),
                connected_at: Mutex::new(None),
                span,
            }),
        }
    }

    /// Get the connection ID
    pub fn connection_id(&self) -> Uuid {
        self.inner.connection_id
    }

    /// Get the leg name
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Get the engine transport id
    pub fn transport_id(&self) -> String {
        self.inner.transport.id()
    }

    /// Logging span of this leg
    pub fn span(&self) -> &Span {
        &self.inner.span
    }

    /// Get the current connection state
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    /// Whether the terminal state was reached
    pub fn is_closed(&self) -> bool {
        self.state() == ConnectionState::Closed
    }

    /// Time since the connection was established
    pub fn connection_duration(&self) -> Option<Duration> {
        self.inner.connected_at.lock().map(|at| at.elapsed())
    }

    /// Time since the state machine was created
    pub fn age(&self) -> Duration {
        self.inner.created_at.elapsed()
    }

    /// Watch transport signals and arm the connect timeout
    ///
    /// Must be called from within a tokio runtime. Calling it again, or on a
    /// closed connection, does nothing.
    pub fn start(&self) {
        if self.is_closed() {
            debug!(parent: &self.inner.span, "start() on closed peer ignored");
            return;
        }

        let mut watcher = self.inner.watcher.lock();
        if watcher.is_some() {
            debug!(parent: &self.inner.span, "Peer already started");
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        let mut signals = self.inner.transport.subscribe();
        let timeout = self.inner.connect_timeout;

        *watcher = Some(tokio::spawn(async move {
            let deadline = tokio::time::sleep(timeout);
            tokio::pin!(deadline);

            let mut timeout_armed = true;
            let mut signals_open = true;

            while timeout_armed || signals_open {
                tokio::select! {
                    _ = &mut deadline, if timeout_armed => {
                        timeout_armed = false;
                        let Some(inner) = weak.upgrade() else { return };
                        if inner.state() == ConnectionState::Connecting {
                            warn!(
                                parent: &inner.span,
                                "Peer failed to connect within {:?}. Forcing close.",
                                timeout
                            );
                            inner.close();
                        }
                    }
                    signal = signals.recv(), if signals_open => {
                        let Some(inner) = weak.upgrade() else { return };
                        match signal {
                            Ok(signal) => inner.on_transport_signal(signal),
                            Err(RecvError::Lagged(skipped)) => {
                                warn!(parent: &inner.span, "Missed {} transport signals", skipped);
                            }
                            Err(RecvError::Closed) => {
                                debug!(parent: &inner.span, "Transport signal stream ended");
                                signals_open = false;
                            }
                        }
                        if inner.state() == ConnectionState::Connected {
                            timeout_armed = false;
                        }
                    }
                }

                match weak.upgrade() {
                    Some(inner) if !inner.is_closed() => {}
                    _ => return,
                }
            }
        }));
    }

    /// Feed a lower-layer transport signal into the state machine
    pub fn on_transport_signal(&self, signal: TransportSignal) {
        self.inner.on_transport_signal(signal);
    }

    /// Close the leg
    ///
    /// Idempotent: only the first call releases the transport and notifies
    /// listeners.
    pub fn close(&self) {
        self.inner.close();
    }

    /// Register a state listener
    ///
    /// Returns `None` if the connection is already closed; the listener is
    /// then dropped without being called.
    pub fn add_listener<F>(&self, listener: F) -> Option<ListenerId>
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        // state lock held so a concurrent close() cannot slip between the
        // check and the insert
        let state = self.inner.state.lock();
        if *state == ConnectionState::Closed {
            return None;
        }

        let id = ListenerId(self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.inner.listeners.lock().push((id, Arc::new(listener)));
        Some(id)
    }

    /// Remove a previously registered state listener
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    /// Number of registered state listeners
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }
}

impl PeerInner {
    fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    fn is_closed(&self) -> bool {
        self.state() == ConnectionState::Closed
    }

    fn on_transport_signal(&self, signal: TransportSignal) {
        debug!(parent: &self.span, "{}", signal);

        match signal {
            TransportSignal::Ice(IceState::Disconnected | IceState::Closed) => {
                if !self.is_closed() {
                    warn!(parent: &self.span, "Transport {}, closing peer", signal);
                    self.close();
                }
            }
            TransportSignal::Dtls(DtlsState::Failed | DtlsState::Closed) => {
                if !self.is_closed() {
                    warn!(parent: &self.span, "Transport {}, closing peer", signal);
                    self.close();
                }
            }
            TransportSignal::Dtls(DtlsState::Connected) => {
                self.mark_connected();
            }
            _ => {}
        }
    }

    fn mark_connected(&self) {
        {
            let mut state = self.state.lock();
            if *state != ConnectionState::Connecting {
                return;
            }
            *state = ConnectionState::Connected;
        }

        *self.connected_at.lock() = Some(Instant::now());
        info!(parent: &self.span, "Peer connected after {:?}", self.created_at.elapsed());

        let listeners: Vec<StateListener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        self.notify(ConnectionState::Connected, &listeners);
    }

    fn close(&self) {
        {
            let mut state = self.state.lock();
            if *state == ConnectionState::Closed {
                return;
            }
            *state = ConnectionState::Closed;
        }

        info!(parent: &self.span, "close()");

        if let Some(watcher) = self.watcher.lock().take() {
            watcher.abort();
        }

        self.transport.close();

        // Taking the list both snapshots and clears it; add_listener refuses
        // new entries once Closed is set.
        let listeners: Vec<StateListener> = std::mem::take(&mut *self.listeners.lock())
            .into_iter()
            .map(|(_, listener)| listener)
            .collect();
        self.notify(ConnectionState::Closed, &listeners);
    }

    fn notify(&self, state: ConnectionState, listeners: &[StateListener]) {
        for listener in listeners {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| listener(state))) {
                warn!(
                    parent: &self.span,
                    "Error in connection state listener: {}",
                    panic_message(panic.as_ref())
                );
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

//! Signal relay: forward every signal this process receives to the delegated child.
//!
//! One listener task per catchable signal pushes into a bounded channel; a
//! single relay task drains it in receipt order and forwards through a
//! `Forwarder`. The controller ends the relay by sending `RelayEvent::ChildExited`
//! on the same channel, so anything queued behind that message is dropped.
//!
//! Signals are dropped when:
//!   - the child has not been spawned yet (or was already reaped), see `ChildSlot`
//!   - they belong to the runtime itself (`is_runtime_signal`)

use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{log_debug, log_trace};

/// Capacity of the relay channel.
const RELAY_QUEUE: usize = 64;

/// Serializes tests that listen for or raise real process signals; every
/// running relay would otherwise forward another test's signal to its child.
#[cfg(test)]
pub(crate) static OS_SIGNALS: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEvent {
    /// A raw signal number received by this process.
    Signal(i32),
    /// Completion notification: stop relaying.
    ChildExited,
}

/// Pid of the delegated child as seen by the relay; 0 when there is none.
#[derive(Debug, Clone, Default)]
pub struct ChildSlot(Arc<AtomicI32>);

impl ChildSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, pid: u32) {
        self.0.store(pid as i32, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(0, Ordering::SeqCst);
    }

    pub fn get(&self) -> Option<i32> {
        match self.0.load(Ordering::SeqCst) {
            0 => None,
            pid => Some(pid),
        }
    }
}

/// Delivers a signal to a process.
pub trait Forwarder: Send + Sync + 'static {
    fn forward(&self, pid: i32, signal: i32) -> std::io::Result<()>;
}

/* ---- Signal sets ---- */

#[cfg(unix)]
mod sets {
    use nix::sys::signal::Signal;

    /// Signals a process cannot (or must not) install async handlers for.
    const NOT_SUBSCRIBABLE: &[Signal] = &[
        Signal::SIGKILL,
        Signal::SIGSTOP,
        Signal::SIGILL,
        Signal::SIGFPE,
        Signal::SIGSEGV,
        Signal::SIGBUS,
        Signal::SIGTRAP,
        Signal::SIGSYS,
    ];

    /// Preemption signal used internally by cooperative schedulers.
    const RUNTIME: &[Signal] = &[Signal::SIGURG];

    pub fn subscribed() -> Vec<i32> {
        Signal::iterator()
            .filter(|s| !NOT_SUBSCRIBABLE.contains(s))
            .map(|s| s as i32)
            .collect()
    }

    pub fn is_runtime_signal(raw: i32) -> bool {
        RUNTIME.iter().any(|s| *s as i32 == raw)
    }
}

#[cfg(not(unix))]
mod sets {
    pub fn subscribed() -> Vec<i32> {
        Vec::new()
    }

    pub fn is_runtime_signal(_raw: i32) -> bool {
        false
    }
}

pub use sets::{is_runtime_signal, subscribed};

/* ---- Forwarders ---- */

/// Forwarder calling `kill(2)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct KillForwarder;

#[cfg(unix)]
impl Forwarder for KillForwarder {
    fn forward(&self, pid: i32, signal: i32) -> std::io::Result<()> {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let sig = Signal::try_from(signal).map_err(std::io::Error::from)?;
        kill(Pid::from_raw(pid), sig).map_err(std::io::Error::from)
    }
}

#[cfg(not(unix))]
impl Forwarder for KillForwarder {
    fn forward(&self, _pid: i32, _signal: i32) -> std::io::Result<()> {
        Err(std::io::ErrorKind::Unsupported.into())
    }
}

/* ---- Relay ---- */

pub struct SignalRelay {
    tx: mpsc::Sender<RelayEvent>,
    task: JoinHandle<usize>,
    listeners: Vec<JoinHandle<()>>,
}

impl SignalRelay {
    /// Start the relay loop without subscribing to any OS signal. Events are
    /// injected through `sender()`.
    pub fn spawn(child: ChildSlot, forwarder: impl Forwarder) -> Self {
        let (tx, rx) = mpsc::channel(RELAY_QUEUE);
        let task = tokio::spawn(relay_loop(rx, child, forwarder));
        Self {
            tx,
            task,
            listeners: Vec::new(),
        }
    }

    /// Start the relay and subscribe it to every catchable signal.
    pub fn start(child: ChildSlot, forwarder: impl Forwarder) -> Self {
        let mut relay = Self::spawn(child, forwarder);
        relay.listeners = subscribe_all(&relay.tx);
        log_trace!("signal relay listening on {} signals", relay.listeners.len());
        relay
    }

    pub fn sender(&self) -> mpsc::Sender<RelayEvent> {
        self.tx.clone()
    }

    /// Send the completion notification and wait for the relay to finish.
    /// Returns the number of signals forwarded.
    pub async fn stop(self) -> usize {
        let _ = self.tx.send(RelayEvent::ChildExited).await;
        let forwarded = self.task.await.unwrap_or(0);
        for l in &self.listeners {
            l.abort();
        }
        log_trace!("signal relay stopped after forwarding {forwarded} signal(s)");
        forwarded
    }
}

async fn relay_loop(
    mut rx: mpsc::Receiver<RelayEvent>,
    child: ChildSlot,
    forwarder: impl Forwarder,
) -> usize {
    let mut forwarded = 0;
    while let Some(event) = rx.recv().await {
        let sig = match event {
            RelayEvent::ChildExited => break,
            RelayEvent::Signal(sig) => sig,
        };
        let Some(pid) = child.get() else {
            log_trace!("signal {sig} received with no child running, dropped");
            continue;
        };
        if is_runtime_signal(sig) {
            continue;
        }
        match forwarder.forward(pid, sig) {
            Ok(()) => forwarded += 1,
            Err(e) => log_debug!("forwarding signal {sig} to pid {pid} failed: {e}"),
        }
    }
    forwarded
}

#[cfg(unix)]
fn subscribe_all(tx: &mpsc::Sender<RelayEvent>) -> Vec<JoinHandle<()>> {
    use tokio::signal::unix::{SignalKind, signal};

    subscribed()
        .into_iter()
        .filter_map(|raw| match signal(SignalKind::from_raw(raw)) {
            Ok(mut stream) => {
                let tx = tx.clone();
                Some(tokio::spawn(async move {
                    while stream.recv().await.is_some() {
                        if tx.send(RelayEvent::Signal(raw)).await.is_err() {
                            break;
                        }
                    }
                }))
            }
            Err(e) => {
                log_debug!("cannot listen for signal {raw}: {e}");
                None
            }
        })
        .collect()
}

#[cfg(not(unix))]
fn subscribe_all(_tx: &mpsc::Sender<RelayEvent>) -> Vec<JoinHandle<()>> {
    Vec::new()
}

/* ---- Tests ---- */

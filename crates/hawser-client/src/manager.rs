//! Logical connection ownership: backoff, candidate promotion, seamless
//! hand-over.
//!
//! The manager owns a sequence of connection instances with strictly
//! increasing ids. A candidate's `open` is surfaced to the application as
//! [`ManagerEvent::CandidateReady`] together with a one-shot [`Promotion`]
//! grant; promotion happens only inside [`Promotion::ready`], and only when
//! the candidate's id is greater than the currently active id — a stale
//! `ready` from a superseded candidate is silently ignored. At most one
//! instance is active at any time, and the active id never decreases.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hawser_core::envelope::Inbound;

use crate::config::ManagerConfig;
use crate::error::ClientError;
use crate::instance::{InstanceEvent, InstanceHandle, spawn_instance};

/// Grace window after a promotion before the attempt counter resets.
const ATTEMPT_RESET_GRACE: Duration = Duration::from_secs(10);

/// Notifications surfaced to the owning application.
#[derive(Debug)]
pub enum ManagerEvent {
    /// A candidate connection opened. The application may run its greeting
    /// handshake on `instance`, then call [`Promotion::ready`] to promote.
    CandidateReady {
        /// Handle to the candidate instance.
        instance: InstanceHandle,
        /// One-shot promotion grant.
        promote: Promotion,
    },
    /// A candidate was promoted to the active connection.
    Promoted {
        /// Handle to the now-active instance.
        instance: InstanceHandle,
    },
    /// Inbound frame from the active connection.
    Message {
        /// Parsed or raw frame.
        frame: Inbound,
    },
    /// Transport error on the active connection.
    ConnectionError {
        /// What went wrong.
        error: ClientError,
    },
    /// The active connection closed.
    Disconnected {
        /// Id of the instance that was active.
        id: u64,
    },
}

/// One-shot promotion grant for a newly opened candidate.
///
/// Dropping the grant without calling [`ready`](Self::ready) leaves the
/// candidate unpromoted; it keeps running until it closes or is superseded.
#[derive(Debug)]
pub struct Promotion {
    id: u64,
    commands: mpsc::UnboundedSender<Command>,
}

impl Promotion {
    /// Promote the candidate to active.
    ///
    /// Ignored if a newer instance was promoted since this grant was issued.
    pub fn ready(self) {
        let _ = self.commands.send(Command::Promote(self.id));
    }
}

#[derive(Debug)]
enum Command {
    /// Schedule the next attempt through the backoff table.
    StartAttempt,
    /// The backoff delay elapsed; dial now.
    SpawnNow,
    /// A promotion grant was exercised for this instance id.
    Promote(u64),
    /// The post-promotion grace window elapsed.
    ResetAttempts,
}

/// State shared between the manager handle and its driver task.
#[derive(Debug, Default)]
struct Shared {
    active: Option<InstanceHandle>,
    connected: bool,
    tracked: usize,
}

/// Maintains exactly one logical active connection across repeated attempts.
pub struct ConnectionManager {
    commands: mpsc::UnboundedSender<Command>,
    shared: Arc<Mutex<Shared>>,
    cancel: CancellationToken,
}

impl ConnectionManager {
    /// Spawn a manager; returns the handle and its event stream.
    ///
    /// No attempt is made until [`start`](Self::start) is called.
    pub fn spawn(config: ManagerConfig) -> (Self, mpsc::UnboundedReceiver<ManagerEvent>) {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (events, event_rx) = mpsc::unbounded_channel();
        let (instance_tx, instance_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Mutex::new(Shared::default()));
        let cancel = CancellationToken::new();

        let driver = Driver {
            config,
            events,
            commands: commands.clone(),
            instance_tx,
            shared: Arc::clone(&shared),
            cancel: cancel.clone(),
            attempts: 0,
            next_id: 0,
            active_id: 0,
            instances: HashMap::new(),
            reconnect_timer: None,
            grace_timer: None,
            seamless_timer: None,
        };
        drop(tokio::spawn(driver.run(command_rx, instance_rx)));

        (
            Self {
                commands,
                shared,
                cancel,
            },
            event_rx,
        )
    }

    /// Schedule the next connection attempt through the backoff table.
    ///
    /// Replaces any attempt already pending.
    pub fn start(&self) {
        let _ = self.commands.send(Command::StartAttempt);
    }

    /// Handle to the currently active instance, if any.
    pub fn active(&self) -> Option<InstanceHandle> {
        self.shared.lock().active.clone()
    }

    /// Whether an instance is currently promoted and serving.
    pub fn is_connected(&self) -> bool {
        self.shared.lock().connected
    }

    /// Number of instances currently tracked: the active one plus any live
    /// candidates.
    pub fn tracked_instances(&self) -> usize {
        self.shared.lock().tracked
    }

    /// Cancel every timer and destroy every tracked instance.
    pub fn destroy(&self) {
        self.cancel.cancel();
    }
}

struct Driver {
    config: ManagerConfig,
    events: mpsc::UnboundedSender<ManagerEvent>,
    commands: mpsc::UnboundedSender<Command>,
    instance_tx: mpsc::UnboundedSender<InstanceEvent>,
    shared: Arc<Mutex<Shared>>,
    cancel: CancellationToken,
    attempts: u32,
    next_id: u64,
    active_id: u64,
    instances: HashMap<u64, InstanceHandle>,
    reconnect_timer: Option<CancellationToken>,
    grace_timer: Option<CancellationToken>,
    seamless_timer: Option<CancellationToken>,
}

impl Driver {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut instance_events: mpsc::UnboundedReceiver<InstanceEvent>,
    ) {
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    self.teardown();
                    return;
                }
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        self.teardown();
                        return;
                    }
                },
                event = instance_events.recv() => {
                    // The driver holds a sender, so the channel stays open.
                    if let Some(event) = event {
                        self.handle_instance_event(event);
                    }
                }
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::StartAttempt => self.start_new_instance(),
            Command::SpawnNow => self.make_new_instance(),
            Command::Promote(id) => self.promote(id),
            Command::ResetAttempts => {
                debug!("attempt counter reset after grace window");
                self.attempts = 0;
            }
        }
    }

    /// Schedule the next attempt after `backoff(attempts)`, replacing any
    /// pending attempt timer.
    fn start_new_instance(&mut self) {
        let delay = self.config.backoff.delay_for(self.attempts);
        debug!(attempts = self.attempts, ?delay, "scheduling connection attempt");
        schedule_command(
            &self.commands,
            &self.cancel,
            &mut self.reconnect_timer,
            delay,
            Command::SpawnNow,
        );
    }

    /// Issue the next instance id and dial.
    fn make_new_instance(&mut self) {
        self.attempts += 1;
        self.next_id += 1;
        let id = self.next_id;
        let handle = spawn_instance(id, self.config.clone(), self.instance_tx.clone());
        let _ = self.instances.insert(id, handle);
        self.sync_tracked();
    }

    fn promote(&mut self, id: u64) {
        if id <= self.active_id {
            debug!(
                candidate = id,
                active = self.active_id,
                "stale promotion ignored"
            );
            return;
        }
        let Some(handle) = self.instances.get(&id).cloned() else {
            // The candidate died between its grant and this call.
            debug!(candidate = id, "promotion for evicted instance ignored");
            return;
        };

        // Retire the previous active instance, if any.
        if self.active_id != 0 {
            if let Some(previous) = self.instances.remove(&self.active_id) {
                previous.destroy();
            }
        }

        self.active_id = id;
        {
            let mut shared = self.shared.lock();
            shared.active = Some(handle.clone());
            shared.connected = true;
            shared.tracked = self.instances.len();
        }

        // Debounced: a fresh promotion restarts the grace window.
        schedule_command(
            &self.commands,
            &self.cancel,
            &mut self.grace_timer,
            ATTEMPT_RESET_GRACE,
            Command::ResetAttempts,
        );

        // Proactive rotation while the promoted instance keeps serving.
        if let Some(interval) = self.config.seamless_reconnect_interval() {
            schedule_command(
                &self.commands,
                &self.cancel,
                &mut self.seamless_timer,
                interval,
                Command::StartAttempt,
            );
        }

        if self.config.log_actions {
            info!(instance = id, "instance promoted to active");
        }
        let _ = self.events.send(ManagerEvent::Promoted { instance: handle });
    }

    fn handle_instance_event(&mut self, event: InstanceEvent) {
        match event {
            InstanceEvent::Open { id } => {
                if id > self.active_id {
                    if let Some(handle) = self.instances.get(&id).cloned() {
                        let _ = self.events.send(ManagerEvent::CandidateReady {
                            instance: handle,
                            promote: Promotion {
                                id,
                                commands: self.commands.clone(),
                            },
                        });
                    }
                }
            }
            InstanceEvent::Message { id, frame } => {
                if id == self.active_id {
                    let _ = self.events.send(ManagerEvent::Message { frame });
                }
            }
            InstanceEvent::Error { id, error } => {
                if id == self.active_id {
                    let _ = self.events.send(ManagerEvent::ConnectionError { error });
                } else {
                    debug!(instance = id, %error, "error from non-active instance");
                }
            }
            InstanceEvent::Closed { id } => self.handle_closed(id),
        }
    }

    fn handle_closed(&mut self, id: u64) {
        if id > self.active_id {
            // An unpromoted candidate died; retry without disturbing the
            // active connection or resetting backoff.
            if let Some(handle) = self.instances.remove(&id) {
                handle.destroy();
                self.sync_tracked();
                self.start_new_instance();
            }
        } else if id == self.active_id && self.instances.remove(&id).is_some() {
            warn!(instance = id, "active connection closed");
            cancel_timer(&mut self.grace_timer);
            cancel_timer(&mut self.seamless_timer);
            {
                let mut shared = self.shared.lock();
                shared.active = None;
                shared.connected = false;
                shared.tracked = self.instances.len();
            }
            let _ = self.events.send(ManagerEvent::Disconnected { id });
            if self.config.auto_reconnect {
                self.start_new_instance();
            }
        } else if self.instances.remove(&id).is_some() {
            // A superseded candidate died; drop its entry without touching
            // the active connection.
            debug!(instance = id, "superseded candidate evicted");
            self.sync_tracked();
        }
    }

    fn sync_tracked(&self) {
        self.shared.lock().tracked = self.instances.len();
    }

    fn teardown(&mut self) {
        cancel_timer(&mut self.reconnect_timer);
        cancel_timer(&mut self.grace_timer);
        cancel_timer(&mut self.seamless_timer);
        for (_, handle) in self.instances.drain() {
            handle.destroy();
        }
        let mut shared = self.shared.lock();
        shared.active = None;
        shared.connected = false;
        shared.tracked = 0;
    }
}

/// Arm a one-shot timer that sends `command` after `after`, replacing any
/// timer already in `slot`.
fn schedule_command(
    commands: &mpsc::UnboundedSender<Command>,
    parent: &CancellationToken,
    slot: &mut Option<CancellationToken>,
    after: Duration,
    command: Command,
) {
    let token = parent.child_token();
    if let Some(previous) = slot.replace(token.clone()) {
        previous.cancel();
    }
    let commands = commands.clone();
    drop(tokio::spawn(async move {
        tokio::select! {
            () = token.cancelled() => {}
            () = tokio::time::sleep(after) => {
                let _ = commands.send(command);
            }
        }
    }));
}

/// Cancel and clear a timer slot.
fn cancel_timer(slot: &mut Option<CancellationToken>) {
    if let Some(token) = slot.take() {
        token.cancel();
    }
}

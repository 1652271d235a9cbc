// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The dispatcher: all routing state, owned by a single thread.
//!
//! Every mutating operation takes the current time as `now`. The dispatcher never reads a
//! clock itself, which keeps routing deterministic under test and lets
//! [`DispatcherThread`](crate::DispatcherThread) drive it from a real one.

mod gestures;
mod keys;
mod motion;

use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use hashbrown::HashMap;
use kurbo::{Affine, Point};
use smallvec::SmallVec;
use tracing::{debug, info, warn};
use understory_window_registry::{
    DisplayId, ProcessId, Token, UserId, WindowDescriptor, WindowRegistry,
};

use crate::config::DispatcherConfig;
use crate::connection::{Connection, ConnectionKind, DispatchedEvent, InputChannel};
use crate::error::DispatcherError;
use crate::event::{DeviceId, InputEvent, MotionAction, MotionEvent, PolicyFlags};
use crate::focus::{FocusChange, FocusResolver, Focusability, FocusedApplication};
use crate::hover::HoverState;
use crate::injection::{InjectionId, InjectionResult, InjectionSync, Injections};
use crate::policy::{DispatchPolicy, DispatchTracer};
use crate::supervisor::Supervisor;
use crate::target::{DispatchMode, TargetFlags};
use crate::touch_state::{TouchState, TouchedWindowInfo};

use self::keys::KeyQueue;

/// Routes input events to window connections.
///
/// See the [crate documentation](crate) for the routing model.
pub struct Dispatcher<P: DispatchPolicy> {
    config: DispatcherConfig,
    policy: P,
    tracer: Option<Box<dyn DispatchTracer>>,
    registry: WindowRegistry,
    connections: HashMap<Token, Connection>,
    touch: HashMap<DisplayId, TouchState>,
    hover: HashMap<(DisplayId, DeviceId), HoverState>,
    focus: FocusResolver,
    focused_apps: HashMap<DisplayId, FocusedApplication>,
    pointer_capture: HashMap<DisplayId, Token>,
    keys: KeyQueue,
    supervisor: Supervisor,
    injections: Injections,
    /// Injection that entries enqueued by the event being routed belong to.
    current_injection: Option<InjectionId>,
}

impl<P: DispatchPolicy> core::fmt::Debug for Dispatcher<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("connections", &self.connections)
            .field("touch", &self.touch)
            .field("hover", &self.hover)
            .field("focus", &self.focus)
            .field("focused_apps", &self.focused_apps)
            .field("pointer_capture", &self.pointer_capture)
            .field("keys", &self.keys)
            .field("supervisor", &self.supervisor)
            .field("injections", &self.injections)
            .finish_non_exhaustive()
    }
}

impl<P: DispatchPolicy> Dispatcher<P> {
    /// Create a dispatcher with no windows and no connections.
    pub fn new(config: DispatcherConfig, policy: P) -> Self {
        Self {
            config,
            policy,
            tracer: None,
            registry: WindowRegistry::new(),
            connections: HashMap::new(),
            touch: HashMap::new(),
            hover: HashMap::new(),
            focus: FocusResolver::default(),
            focused_apps: HashMap::new(),
            pointer_capture: HashMap::new(),
            keys: KeyQueue::default(),
            supervisor: Supervisor::default(),
            injections: Injections::default(),
            current_injection: None,
        }
    }

    /// The configuration.
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// The policy collaborator.
    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// The policy collaborator, mutably.
    pub fn policy_mut(&mut self) -> &mut P {
        &mut self.policy
    }

    /// The current window snapshots.
    pub fn registry(&self) -> &WindowRegistry {
        &self.registry
    }

    /// Install a hook that observes every transmitted entry.
    pub fn set_tracer(&mut self, tracer: Box<dyn DispatchTracer>) {
        self.tracer = Some(tracer);
    }

    // --- Connections -------------------------------------------------------------------

    /// Register the input channel of a window.
    ///
    /// `timeout` overrides the configured acknowledgment timeout; a window descriptor's own
    /// `dispatch_timeout` takes precedence over both.
    pub fn register_window_connection(
        &mut self,
        token: Token,
        name: impl Into<String>,
        channel: Box<dyn InputChannel>,
        timeout: Option<Duration>,
    ) -> Result<(), DispatcherError> {
        self.register(token, name.into(), ConnectionKind::Window, None, timeout, channel)
    }

    /// Register a headless monitor that observes every touch gesture on `display`.
    pub fn register_monitor(
        &mut self,
        token: Token,
        name: impl Into<String>,
        display: DisplayId,
        pid: Option<ProcessId>,
        channel: Box<dyn InputChannel>,
    ) -> Result<(), DispatcherError> {
        self.register(
            token,
            name.into(),
            ConnectionKind::Monitor { display },
            pid,
            None,
            channel,
        )
    }

    fn register(
        &mut self,
        token: Token,
        name: String,
        kind: ConnectionKind,
        pid: Option<ProcessId>,
        timeout: Option<Duration>,
        channel: Box<dyn InputChannel>,
    ) -> Result<(), DispatcherError> {
        if self.connections.contains_key(&token) {
            return Err(DispatcherError::AlreadyRegistered(token));
        }
        debug!(token = ?token, name = %name, kind = ?kind, "registered connection");
        self.connections
            .insert(token, Connection::new(token, name, kind, pid, timeout, channel));
        Ok(())
    }

    /// Remove a connection, dropping its queued entries and all routing state that refers
    /// to it. Returns `false` if no such connection exists.
    pub fn unregister_connection(&mut self, token: Token, now: Instant) -> bool {
        self.abort_connection(token, now, false)
    }

    /// Returns `true` while `token` is in an unresponsive episode.
    pub fn is_unresponsive(&self, token: Token) -> bool {
        self.supervisor.is_unresponsive(token)
    }

    // --- Windows and focus -------------------------------------------------------------

    /// Replace the window list of `display` (topmost first).
    ///
    /// Receivers that disappeared get `Cancel` for their pointers and `HoverExit` for
    /// their hover, if their connection is still alive. Focus is then re-evaluated.
    ///
    /// # Panics
    ///
    /// Panics if `windows` contains the same token twice.
    pub fn update_windows(
        &mut self,
        display: DisplayId,
        windows: Vec<WindowDescriptor>,
        now: Instant,
    ) {
        let update = self.registry.update_windows(display, windows);
        for removed in &update.removed {
            let display_id = display;
            debug!(token = ?removed.token, name = %removed.name, display_id = ?display_id, "window removed");
            self.cancel_receiver_on_display(display, removed.token, now);
        }
        self.refresh_transforms(display);

        let change = self
            .focus
            .windows_changed(display, self.registry.windows(display));
        if let Some(change) = change {
            self.apply_focus_change(change, now);
        }
        self.dispatch_pending_keys(now);
    }

    /// Set the transform from device coordinates into the logical space of `display`.
    pub fn set_display_transform(&mut self, display: DisplayId, transform: Affine) {
        self.registry.set_display_transform(display, transform);
    }

    /// Request key focus for `token` on `display`; `None` clears focus.
    pub fn set_focused_window(&mut self, display: DisplayId, token: Option<Token>, now: Instant) {
        let change = self
            .focus
            .request(display, token, self.registry.windows(display));
        if let Some(change) = change {
            self.apply_focus_change(change, now);
        }
        self.dispatch_pending_keys(now);
    }

    /// Set (or clear) the application that owns focus on `display`.
    pub fn set_focused_application(
        &mut self,
        display: DisplayId,
        application: Option<FocusedApplication>,
        now: Instant,
    ) {
        match application {
            Some(app) => {
                self.focused_apps.insert(display, app);
            }
            None => {
                self.focused_apps.remove(&display);
                self.keys.no_focus_deadlines.remove(&display);
            }
        }
        self.dispatch_pending_keys(now);
    }

    /// The window holding key focus on `display`.
    pub fn focused_window(&self, display: DisplayId) -> Option<Token> {
        self.focus.focused(display)
    }

    /// Outcome of the last evaluation of the focus request of `display`.
    pub fn focus_request_result(&self, display: DisplayId) -> Option<Focusability> {
        self.focus.last_result(display)
    }

    fn apply_focus_change(&mut self, change: FocusChange, now: Instant) {
        debug!(
            display_id = ?change.display,
            old = ?change.old,
            new = ?change.new,
            reason = %change.reason,
            "focus changed"
        );
        if let Some(old) = change.old {
            self.cancel_keys(old, now);
        }
        if let Some(&captured) = self.pointer_capture.get(&change.display)
            && Some(captured) != change.new
        {
            debug!(token = ?captured, "releasing pointer capture after focus change");
            self.pointer_capture.remove(&change.display);
        }
        self.policy.notify_focus_changed(&change);
    }

    /// Route mouse motion on the requester's display straight to it (or stop doing so).
    ///
    /// # Panics
    ///
    /// Panics if `token` does not hold focus on any display.
    pub fn request_pointer_capture(&mut self, token: Token, enabled: bool) {
        let Some(display) = self.focus.display_of(token) else {
            panic!("pointer capture requested by {token:?}, which does not hold focus");
        };
        if enabled {
            let display_id = display;
            debug!(token = ?token, display_id = ?display_id, "pointer capture enabled");
            self.pointer_capture.insert(display, token);
        } else if self.pointer_capture.get(&display) == Some(&token) {
            let display_id = display;
            debug!(token = ?token, display_id = ?display_id, "pointer capture disabled");
            self.pointer_capture.remove(&display);
        }
    }

    /// The window capturing the pointer on `display`.
    pub fn pointer_capture(&self, display: DisplayId) -> Option<Token> {
        self.pointer_capture.get(&display).copied()
    }

    // --- Events ------------------------------------------------------------------------

    /// Route a motion event from the device-event source.
    pub fn notify_motion(&mut self, event: MotionEvent, now: Instant) {
        self.process_motion(event, now);
    }

    /// Inject an event.
    ///
    /// The returned receiver yields exactly one [`InjectionResult`] once the result is known
    /// for `sync`. When `target_uid` is set, events that would reach a window owned by
    /// another user are rejected with [`InjectionResult::TargetMismatch`].
    pub fn inject(
        &mut self,
        mut event: InputEvent,
        sync: InjectionSync,
        target_uid: Option<UserId>,
        now: Instant,
    ) -> Receiver<InjectionResult> {
        let (id, rx) = self.injections.begin(sync);
        *event.policy_flags_mut() |= PolicyFlags::INJECTED;
        if let Some(uid) = target_uid
            && self.targets_other_user(&event, uid)
        {
            warn!(uid = ?uid, "rejecting injected event aimed at another user's window");
            self.injections.resolve(id, InjectionResult::TargetMismatch);
            return rx;
        }
        match event {
            InputEvent::Motion(motion) => {
                self.current_injection = Some(id);
                self.process_motion(motion, now);
                self.current_injection = None;
                self.injections.targeted(id);
            }
            InputEvent::Key(key) => self.queue_key(key, Some(id), now),
        }
        rx
    }

    fn targets_other_user(&self, event: &InputEvent, uid: UserId) -> bool {
        let foreign = |w: &WindowDescriptor| w.owner.uid != uid;
        match event {
            InputEvent::Key(key) => self
                .focus
                .focused(key.display_id)
                .and_then(|t| self.registry.find_on(key.display_id, t))
                .is_some_and(foreign),
            InputEvent::Motion(motion) => {
                let display = motion.display_id;
                let starts = matches!(
                    motion.action,
                    MotionAction::Down
                        | MotionAction::PointerDown(_)
                        | MotionAction::HoverEnter
                        | MotionAction::HoverMove
                        | MotionAction::Scroll
                );
                if starts {
                    let Some(pointer) = motion.action_pointer() else {
                        return false;
                    };
                    let pt = self.registry.to_display_space(display, pointer.position);
                    self.registry
                        .hit_test(display, pt, motion.is_stylus())
                        .is_some_and(foreign)
                } else {
                    self.touch.get(&display).is_some_and(|state| {
                        state
                            .foreground_for(motion.device_id)
                            .filter_map(|w| self.registry.find_on(display, w.token))
                            .any(foreign)
                    })
                }
            }
        }
    }

    /// Acknowledge entry `seq` of connection `token`.
    pub fn finish(&mut self, token: Token, seq: u32, now: Instant) {
        let Some(conn) = self.connections.get_mut(&token) else {
            debug!(token = ?token, seq, "finished signal for an unknown connection");
            return;
        };
        let Some((entry, sent_at)) = conn.acknowledge(seq) else {
            warn!(
                token = ?token,
                seq,
                expected = ?conn.in_flight_seq(),
                "ignoring finished signal that does not match the entry in flight"
            );
            return;
        };
        debug!(
            token = ?token,
            seq,
            latency = ?now.saturating_duration_since(sent_at),
            "entry finished"
        );
        self.supervisor.disarm(token);
        if let Some(id) = entry.injection {
            self.injections.entry_finished(id, false);
        }
        self.start_dispatch(token, now);

        let idle = self.connections.get(&token).is_some_and(Connection::is_idle);
        if idle && self.supervisor.mark_responsive(token) {
            let pid = self.pid_of(token);
            info!(token = ?token, pid = ?pid, "connection is responsive again");
            self.policy.notify_window_responsive(token, pid);
        }
        self.dispatch_pending_keys(now);
    }

    // --- Time --------------------------------------------------------------------------

    /// Handle every deadline due at `now`.
    pub fn process_timeouts(&mut self, now: Instant) {
        for token in self.supervisor.expired(now) {
            self.on_dispatch_timeout(token, now);
        }
        self.process_key_timeouts(now);
    }

    /// Earliest instant at which [`process_timeouts`](Self::process_timeouts) has work.
    pub fn next_wakeup(&mut self) -> Option<Instant> {
        [self.supervisor.next_deadline(), self.keys.next_deadline()]
            .into_iter()
            .flatten()
            .min()
    }

    fn on_dispatch_timeout(&mut self, token: Token, now: Instant) {
        let Some(conn) = self.connections.get(&token) else {
            return;
        };
        if self.supervisor.mark_unresponsive(token) {
            let reason = format!(
                "{} is not responding: entry {:?} was not acknowledged within {:?}",
                conn.name,
                conn.in_flight_seq(),
                self.timeout_for(token)
            );
            let pid = self.pid_of(token);
            info!(token = ?token, pid = ?pid, reason = %reason, "connection is unresponsive");
            self.policy.notify_window_unresponsive(token, pid, &reason);
        }
        self.cancel_connection_state(token, now);
    }

    // --- Queries -----------------------------------------------------------------------

    /// Receivers holding pointers on `display`.
    pub fn touched_windows(&self, display: DisplayId) -> Vec<TouchedWindowInfo> {
        self.touch
            .get(&display)
            .map(|s| s.windows.iter().map(|w| w.info()).collect())
            .unwrap_or_default()
    }

    /// The foreground window hovered by `device` on `display`.
    pub fn hovered_window(&self, display: DisplayId, device: DeviceId) -> Option<Token> {
        self.hover
            .get(&(display, device))
            .and_then(HoverState::foreground)
    }

    // --- Dispatch pipeline -------------------------------------------------------------

    /// Queue a motion for `token`, rewritten for `mode` and mapped through `transform`.
    fn deliver_motion(
        &mut self,
        token: Token,
        mut event: MotionEvent,
        mode: DispatchMode,
        flags: TargetFlags,
        transform: Affine,
        now: Instant,
    ) {
        mode.apply(&mut event);
        event.transform(transform);
        if flags.contains(TargetFlags::ZERO_COORDS) {
            for p in &mut event.pointers {
                p.position = Point::ZERO;
            }
        }
        event.flags |= flags.motion_flags();
        self.enqueue(token, DispatchedEvent::Motion(event), flags, self.current_injection, now);
    }

    fn enqueue(
        &mut self,
        token: Token,
        event: DispatchedEvent,
        flags: TargetFlags,
        injection: Option<InjectionId>,
        now: Instant,
    ) {
        let Some(conn) = self.connections.get_mut(&token) else {
            debug!(token = ?token, "dropping entry for a receiver without a connection");
            return;
        };
        let seq = conn.enqueue(event, flags, injection);
        debug!(token = ?token, seq, "entry enqueued");
        if let Some(id) = injection {
            self.injections.entry_enqueued(id);
        }
        self.start_dispatch(token, now);
    }

    /// Transmit the next entry of `token` if it has nothing in flight.
    fn start_dispatch(&mut self, token: Token, now: Instant) {
        let timeout = self.timeout_for(token);
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };
        let (err, entry) = match conn.transmit_next(now) {
            Ok(Some(entry)) => {
                debug!(token = ?token, seq = entry.seq, "entry sent");
                if let Some(tracer) = &mut self.tracer {
                    tracer.trace_dispatch(token, entry);
                }
                self.supervisor.arm(token, now + timeout);
                return;
            }
            Ok(None) => return,
            Err(failure) => failure,
        };
        warn!(token = ?token, seq = entry.seq, error = %err, "input channel is broken");
        if let Some(id) = entry.injection {
            self.injections.entry_finished(id, true);
        }
        self.abort_connection(token, now, true);
    }

    fn timeout_for(&self, token: Token) -> Duration {
        self.registry
            .find(token)
            .and_then(|w| w.dispatch_timeout)
            .or_else(|| self.connections.get(&token).and_then(|c| c.timeout))
            .unwrap_or(self.config.default_dispatch_timeout)
    }

    fn pid_of(&self, token: Token) -> Option<ProcessId> {
        match self.connections.get(&token) {
            Some(conn) if matches!(conn.kind, ConnectionKind::Monitor { .. }) => conn.pid,
            _ => self.registry.find(token).map(|w| w.owner.pid),
        }
    }

    /// Tear down a connection. Returns `false` if it did not exist.
    fn abort_connection(&mut self, token: Token, now: Instant, broken: bool) -> bool {
        let pid = self.pid_of(token);
        let Some(mut conn) = self.connections.remove(&token) else {
            return false;
        };
        debug!(token = ?token, name = %conn.name, broken, "removing connection");
        for entry in conn.drain() {
            if let Some(id) = entry.injection {
                self.injections.entry_finished(id, true);
            }
        }
        self.supervisor.disarm(token);
        let displays: SmallVec<[DisplayId; 2]> = self.touch.keys().copied().collect();
        for display in displays {
            self.cancel_receiver_on_display(display, token, now);
        }
        self.pointer_capture.retain(|_, t| *t != token);

        if self.supervisor.mark_responsive(token) {
            info!(token = ?token, pid = ?pid, "unresponsive connection was removed");
            self.policy.notify_window_responsive(token, pid);
        }
        if broken {
            self.policy.notify_input_channel_broken(token);
        }
        self.dispatch_pending_keys(now);
        true
    }

    /// Cancel everything `token` currently receives: touches, hover, and held keys.
    fn cancel_connection_state(&mut self, token: Token, now: Instant) {
        let displays: SmallVec<[DisplayId; 2]> = self
            .touch
            .keys()
            .chain(self.hover.keys().map(|(d, _)| d))
            .copied()
            .collect();
        for display in displays {
            self.cancel_receiver_on_display(display, token, now);
        }
        self.cancel_keys(token, now);
    }

    fn cancel_keys(&mut self, token: Token, now: Instant) {
        let Some(conn) = self.connections.get(&token) else {
            return;
        };
        for key in conn.synthesize_key_cancels(now) {
            debug!(token = ?token, key_code = key.key_code, "canceling held key");
            self.enqueue(token, DispatchedEvent::Key(key), TargetFlags::empty(), None, now);
        }
    }

    /// Refresh cached display-to-window transforms after a window update.
    fn refresh_transforms(&mut self, display: DisplayId) {
        let registry = &self.registry;
        if let Some(state) = self.touch.get_mut(&display) {
            for w in &mut state.windows {
                if let Some(desc) = registry.find_on(display, w.token) {
                    w.transform = desc.transform;
                }
            }
        }
        for ((d, _), hover) in &mut self.hover {
            if *d != display {
                continue;
            }
            for w in &mut hover.windows {
                if let Some(desc) = registry.find_on(display, w.token) {
                    w.transform = desc.transform;
                }
            }
        }
    }

    /// Returns `true` if events can be delivered to `window` right now.
    fn can_deliver(&self, window: &WindowDescriptor) -> bool {
        window.receives_input()
            && self
                .connections
                .get(&window.token)
                .is_some_and(|c| c.kind == ConnectionKind::Window)
    }
}

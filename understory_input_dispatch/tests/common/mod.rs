// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shared harness for dispatcher scenario tests: fake channels, a recording policy and a
//! manually advanced clock.

#![allow(
    missing_docs,
    dead_code,
    unreachable_pub,
    reason = "Integration-test helper module; each test binary uses a different subset."
)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use hashbrown::HashMap;
use kurbo::{Point, Rect};
use parking_lot::Mutex;
use tracing_subscriber::filter::LevelFilter;
use understory_input_dispatch::{
    ChannelError, DeviceId, DispatchEntry, DispatchPolicy, Dispatcher, DispatcherConfig,
    FocusChange, FocusedApplication, InputChannel, InputSource, MotionAction, MotionEvent,
    Pointer, PointerId, ToolType,
};
use understory_window_registry::{DisplayId, Owner, ProcessId, Token, WindowDescriptor};

pub const D: DisplayId = DisplayId::DEFAULT;
pub const TOUCH: DeviceId = DeviceId(1);
pub const STYLUS: DeviceId = DeviceId(2);
pub const MOUSE: DeviceId = DeviceId(3);
pub const TOUCH_2: DeviceId = DeviceId(4);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(LevelFilter::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Channel that records what it is sent.
#[derive(Clone, Default)]
pub struct FakeChannel {
    entries: Arc<Mutex<VecDeque<DispatchEntry>>>,
    broken: Arc<AtomicBool>,
}

impl FakeChannel {
    pub fn break_channel(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }
}

impl InputChannel for FakeChannel {
    fn send(&mut self, entry: &DispatchEntry) -> Result<(), ChannelError> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(ChannelError::Closed);
        }
        self.entries.lock().push_back(entry.clone());
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PolicyCall {
    Unresponsive(Token, Option<ProcessId>),
    Responsive(Token, Option<ProcessId>),
    NoFocusedWindow(DisplayId, String),
    ChannelBroken(Token),
    DownOutsideFocus(DisplayId, Token),
    FocusChanged(Option<Token>, Option<Token>),
}

#[derive(Clone, Default)]
pub struct RecordingPolicy(Arc<Mutex<Vec<PolicyCall>>>);

impl RecordingPolicy {
    pub fn calls(&self) -> Vec<PolicyCall> {
        self.0.lock().clone()
    }
}

impl DispatchPolicy for RecordingPolicy {
    fn notify_window_unresponsive(&mut self, token: Token, pid: Option<ProcessId>, _reason: &str) {
        self.0.lock().push(PolicyCall::Unresponsive(token, pid));
    }

    fn notify_window_responsive(&mut self, token: Token, pid: Option<ProcessId>) {
        self.0.lock().push(PolicyCall::Responsive(token, pid));
    }

    fn notify_no_focused_window_anr(&mut self, display: DisplayId, application: &FocusedApplication) {
        self.0
            .lock()
            .push(PolicyCall::NoFocusedWindow(display, application.name.clone()));
    }

    fn notify_input_channel_broken(&mut self, token: Token) {
        self.0.lock().push(PolicyCall::ChannelBroken(token));
    }

    fn on_pointer_down_outside_focus(&mut self, display: DisplayId, token: Token) {
        self.0.lock().push(PolicyCall::DownOutsideFocus(display, token));
    }

    fn notify_focus_changed(&mut self, change: &FocusChange) {
        self.0
            .lock()
            .push(PolicyCall::FocusChanged(change.old, change.new));
    }
}

/// A visible, focusable window on the default display.
pub fn window(token: u64, x0: f64, y0: f64, x1: f64, y1: f64) -> WindowDescriptor {
    WindowDescriptor::new(Token(token), format!("window-{token}"), D, Rect::new(x0, y0, x1, y1))
        .with_owner(Owner::new(100 + i32::try_from(token).unwrap(), 10))
}

pub struct Harness {
    pub dispatcher: Dispatcher<RecordingPolicy>,
    pub policy: RecordingPolicy,
    pub start: Instant,
    pub now: Instant,
    channels: HashMap<Token, FakeChannel>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(DispatcherConfig::default())
    }

    pub fn with_config(config: DispatcherConfig) -> Self {
        init_tracing();
        let policy = RecordingPolicy::default();
        let start = Instant::now();
        Self {
            dispatcher: Dispatcher::new(config, policy.clone()),
            policy,
            start,
            now: start,
            channels: HashMap::new(),
        }
    }

    /// Register a window connection for `token` and return its channel.
    pub fn connect(&mut self, token: u64) -> FakeChannel {
        let channel = FakeChannel::default();
        self.dispatcher
            .register_window_connection(
                Token(token),
                format!("window-{token}"),
                Box::new(channel.clone()),
                None,
            )
            .unwrap();
        self.channels.insert(Token(token), channel.clone());
        channel
    }

    pub fn monitor(&mut self, token: u64) {
        let channel = FakeChannel::default();
        self.dispatcher
            .register_monitor(Token(token), "monitor", D, Some(ProcessId(1)), Box::new(channel.clone()))
            .unwrap();
        self.channels.insert(Token(token), channel);
    }

    /// Connect every window, then publish them (topmost first).
    pub fn set_windows(&mut self, windows: Vec<WindowDescriptor>) {
        for w in &windows {
            if !self.channels.contains_key(&w.token) {
                self.connect(w.token.0);
            }
        }
        self.update(windows);
    }

    pub fn update(&mut self, windows: Vec<WindowDescriptor>) {
        self.dispatcher.update_windows(D, windows, self.now);
    }

    pub fn advance(&mut self, by: Duration) {
        self.now += by;
    }

    /// Advance the clock and fire due deadlines.
    pub fn tick(&mut self, by: Duration) {
        self.advance(by);
        self.dispatcher.process_timeouts(self.now);
    }

    pub fn event(
        &self,
        device: DeviceId,
        action: MotionAction,
        pointers: &[(PointerId, f64, f64)],
    ) -> MotionEvent {
        let (source, tool) = match device {
            STYLUS => (InputSource::STYLUS, ToolType::Stylus),
            MOUSE => (InputSource::MOUSE, ToolType::Mouse),
            _ => (InputSource::TOUCHSCREEN, ToolType::Finger),
        };
        MotionEvent::new(
            device,
            source,
            D,
            action,
            self.now,
            pointers
                .iter()
                .map(|&(id, x, y)| Pointer::new(id, tool, Point::new(x, y))),
        )
    }

    pub fn motion(&mut self, device: DeviceId, action: MotionAction, pointers: &[(PointerId, f64, f64)]) {
        let event = self.event(device, action, pointers);
        self.dispatcher.notify_motion(event, self.now);
    }

    /// Entries transmitted to `token` and not yet consumed.
    pub fn pending(&self, token: u64) -> usize {
        self.channels
            .get(&Token(token))
            .map_or(0, |c| c.entries.lock().len())
    }

    /// Take the entry in flight for `token` and acknowledge it.
    pub fn consume(&mut self, token: u64) -> Option<DispatchEntry> {
        let entry = self.channels.get(&Token(token))?.entries.lock().pop_front()?;
        self.dispatcher.finish(Token(token), entry.seq, self.now);
        Some(entry)
    }

    /// Drain and acknowledge everything `token` receives.
    pub fn consume_all(&mut self, token: u64) -> Vec<DispatchEntry> {
        let mut entries = Vec::new();
        while let Some(entry) = self.consume(token) {
            entries.push(entry);
        }
        entries
    }

    /// Actions of every motion `token` receives, draining its queue.
    pub fn actions(&mut self, token: u64) -> Vec<MotionAction> {
        self.consume_all(token)
            .iter()
            .filter_map(|e| e.motion().map(|m| m.action))
            .collect()
    }

    pub fn calls(&self) -> Vec<PolicyCall> {
        self.policy.calls()
    }
}

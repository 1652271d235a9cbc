// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Key delivery: focus lookup, waiting behind in-flight motion, no-focused-window ANR.

use std::collections::VecDeque;
use std::time::Instant;

use hashbrown::HashMap;
use smallvec::SmallVec;
use tracing::{debug, info, warn};
use understory_window_registry::{DisplayId, Token};

use super::Dispatcher;
use crate::connection::{Connection, DispatchedEvent};
use crate::event::KeyEvent;
use crate::injection::InjectionId;
use crate::policy::DispatchPolicy;
use crate::target::TargetFlags;

/// A key waiting for a focused window, or for motion to that window to drain.
#[derive(Debug)]
struct PendingKey {
    event: KeyEvent,
    injection: Option<InjectionId>,
    /// Focused window at the last attempt.
    target: Option<Token>,
    /// After this instant the key no longer waits for in-flight motion.
    expiry: Instant,
}

#[derive(Debug, Default)]
pub(super) struct KeyQueue {
    pending: VecDeque<PendingKey>,
    /// Application ANR deadlines of displays whose keys wait for a focused window.
    pub(super) no_focus_deadlines: HashMap<DisplayId, Instant>,
}

impl KeyQueue {
    pub(super) fn next_deadline(&self) -> Option<Instant> {
        let front = self
            .pending
            .front()
            .filter(|k| k.target.is_some())
            .map(|k| k.expiry);
        self.no_focus_deadlines.values().copied().chain(front).min()
    }
}

impl<P: DispatchPolicy> Dispatcher<P> {
    /// Route a key event from the device-event source to the focused window of its display.
    ///
    /// The key waits while motion to that window is unacknowledged, up to the configured
    /// key wait timeout, and while the display has no focused window but a focused
    /// application.
    pub fn notify_key(&mut self, event: KeyEvent, now: Instant) {
        self.queue_key(event, None, now);
    }

    pub(super) fn queue_key(&mut self, event: KeyEvent, injection: Option<InjectionId>, now: Instant) {
        let age = now.saturating_duration_since(event.event_time);
        if age > self.config.stale_event_timeout {
            warn!(key_code = event.key_code, age = ?age, "dropping stale key event");
            if let Some(id) = injection {
                self.injections.targeted(id);
            }
            return;
        }
        self.keys.pending.push_back(PendingKey {
            event,
            injection,
            target: None,
            expiry: now + self.config.key_wait_timeout,
        });
        self.dispatch_pending_keys(now);
    }

    /// Deliver queued keys in order until one has to wait.
    pub(super) fn dispatch_pending_keys(&mut self, now: Instant) {
        loop {
            let Some(front) = self.keys.pending.front() else {
                return;
            };
            let display = front.event.display_id;
            let (previous, expiry) = (front.target, front.expiry);
            let focused = self
                .focus
                .focused(display)
                .filter(|t| self.connections.contains_key(t));

            let Some(target) = focused else {
                if let Some(app) = self.focused_apps.get(&display) {
                    if !self.keys.no_focus_deadlines.contains_key(&display) {
                        let timeout = app
                            .dispatch_timeout
                            .unwrap_or(self.config.default_no_focus_timeout);
                        let display_id = display;
                        debug!(display_id = ?display_id, application = %app.name, timeout = ?timeout, "key waits for a focused window");
                        self.keys.no_focus_deadlines.insert(display, now + timeout);
                    }
                    return;
                }
                if let Some(key) = self.keys.pending.pop_front() {
                    let display_id = display;
                    warn!(display_id = ?display_id, key_code = key.event.key_code, "dropping key: no focused window");
                    if let Some(id) = key.injection {
                        self.injections.targeted(id);
                    }
                }
                continue;
            };
            self.keys.no_focus_deadlines.remove(&display);
            if let Some(previous) = previous
                && previous != target
            {
                debug!(from = ?previous, to = ?target, "redirecting pending key to the new focused window");
            }
            if let Some(front) = self.keys.pending.front_mut() {
                front.target = Some(target);
            }

            let waiting = self
                .connections
                .get(&target)
                .is_some_and(Connection::has_pending_motion);
            if waiting {
                if now < expiry {
                    return;
                }
                debug!(token = ?target, "key wait elapsed; sending despite in-flight motion");
            }
            let Some(key) = self.keys.pending.pop_front() else {
                return;
            };
            self.enqueue(target, DispatchedEvent::Key(key.event), TargetFlags::empty(), key.injection, now);
            if let Some(id) = key.injection {
                self.injections.targeted(id);
            }
        }
    }

    /// Fire no-focused-window deadlines due at `now`, then retry waiting keys.
    pub(super) fn process_key_timeouts(&mut self, now: Instant) {
        let expired: SmallVec<[DisplayId; 1]> = self
            .keys
            .no_focus_deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(display, _)| *display)
            .collect();
        for display in expired {
            self.keys.no_focus_deadlines.remove(&display);
            if let Some(app) = self.focused_apps.get(&display) {
                let display_id = display;
                info!(display_id = ?display_id, application = %app.name, "no focused window: application is not responding");
                self.policy.notify_no_focused_window_anr(display, app);
            }
            let (dropped, kept) = self
                .keys
                .pending
                .drain(..)
                .partition::<Vec<_>, _>(|k| k.event.display_id == display);
            self.keys.pending = kept.into();
            for key in dropped {
                let display_id = display;
                warn!(display_id = ?display_id, key_code = key.event.key_code, "dropping key after no-focus timeout");
                if let Some(id) = key.injection {
                    self.injections.targeted(id);
                }
            }
        }
        self.dispatch_pending_keys(now);
    }
}

// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Connections: one flow-controlled outbound queue per registered receiver.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use understory_window_registry::{DisplayId, ProcessId, Token};

use crate::error::ChannelError;
use crate::event::{KeyAction, KeyEvent, KeyFlags, MotionEvent};
use crate::injection::InjectionId;
use crate::target::TargetFlags;

/// Transport for one receiver.
///
/// `send` must not block: it hands the entry to the transport and returns. The receiver
/// acknowledges each entry later through [`Dispatcher::finish`](crate::Dispatcher::finish)
/// with the entry's [`seq`](DispatchEntry::seq).
pub trait InputChannel: Send {
    /// Transmit one entry.
    fn send(&mut self, entry: &DispatchEntry) -> Result<(), ChannelError>;
}

/// What kind of receiver a connection serves.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionKind {
    /// A window; the connection shares the window's token.
    Window,
    /// A headless monitor that observes every touch gesture on a display.
    Monitor {
        /// Display being monitored.
        display: DisplayId,
    },
}

/// An event resolved for one receiver.
#[derive(Clone, Debug, PartialEq)]
pub enum DispatchedEvent {
    /// Pointer motion, in the receiver's coordinate space.
    Motion(MotionEvent),
    /// A key event.
    Key(KeyEvent),
}

/// One per-receiver copy of an event awaiting transmission and acknowledgment.
///
/// The event is already split and transformed for its receiver. An entry holds no
/// reference to the gesture it came from; gesture state stays in the dispatcher and may
/// end while the entry is still queued.
#[derive(Clone, Debug, PartialEq)]
pub struct DispatchEntry {
    /// Sequence number, unique and increasing within the connection.
    pub seq: u32,
    /// The resolved event.
    pub event: DispatchedEvent,
    /// Delivery flags applied for this receiver.
    pub target_flags: TargetFlags,
    pub(crate) injection: Option<InjectionId>,
}

impl DispatchEntry {
    /// The motion event, if this is a motion entry.
    pub fn motion(&self) -> Option<&MotionEvent> {
        match &self.event {
            DispatchedEvent::Motion(m) => Some(m),
            DispatchedEvent::Key(_) => None,
        }
    }

    /// The key event, if this is a key entry.
    pub fn key(&self) -> Option<&KeyEvent> {
        match &self.event {
            DispatchedEvent::Key(k) => Some(k),
            DispatchedEvent::Motion(_) => None,
        }
    }
}

pub(crate) struct Connection {
    pub(crate) token: Token,
    pub(crate) name: String,
    pub(crate) kind: ConnectionKind,
    pub(crate) pid: Option<ProcessId>,
    /// Registration override of the acknowledgment timeout.
    pub(crate) timeout: Option<Duration>,
    channel: Box<dyn InputChannel>,
    outbound: VecDeque<DispatchEntry>,
    in_flight: Option<(DispatchEntry, Instant)>,
    next_seq: u32,
    /// Keys enqueued as down and not yet released.
    keys_down: Vec<KeyEvent>,
}

impl core::fmt::Debug for Connection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Connection")
            .field("token", &self.token)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("pid", &self.pid)
            .field("timeout", &self.timeout)
            .field("outbound", &self.outbound.len())
            .field("in_flight", &self.in_flight.as_ref().map(|(e, _)| e.seq))
            .field("next_seq", &self.next_seq)
            .field("keys_down", &self.keys_down.len())
            .finish_non_exhaustive()
    }
}

impl Connection {
    pub(crate) fn new(
        token: Token,
        name: String,
        kind: ConnectionKind,
        pid: Option<ProcessId>,
        timeout: Option<Duration>,
        channel: Box<dyn InputChannel>,
    ) -> Self {
        Self {
            token,
            name,
            kind,
            pid,
            timeout,
            channel,
            outbound: VecDeque::new(),
            in_flight: None,
            next_seq: 1,
            keys_down: Vec::new(),
        }
    }

    /// Append an entry to the outbound queue and return its sequence number.
    pub(crate) fn enqueue(
        &mut self,
        event: DispatchedEvent,
        target_flags: TargetFlags,
        injection: Option<InjectionId>,
    ) -> u32 {
        if let DispatchedEvent::Key(key) = &event {
            self.track_key(key);
        }
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1).max(1);
        self.outbound.push_back(DispatchEntry {
            seq,
            event,
            target_flags,
            injection,
        });
        seq
    }

    /// Transmit the next queued entry if nothing is in flight.
    ///
    /// Returns `Ok(Some(entry))` for the entry just sent, `Ok(None)` if nothing was sent,
    /// and `Err` (with the entry dropped) if the transport failed.
    pub(crate) fn transmit_next(
        &mut self,
        now: Instant,
    ) -> Result<Option<&DispatchEntry>, (ChannelError, DispatchEntry)> {
        if self.in_flight.is_some() {
            return Ok(None);
        }
        let Some(entry) = self.outbound.pop_front() else {
            return Ok(None);
        };
        if let Err(err) = self.channel.send(&entry) {
            return Err((err, entry));
        }
        let (sent, _) = self.in_flight.insert((entry, now));
        Ok(Some(&*sent))
    }

    /// Clear the in-flight slot if it holds `seq`.
    pub(crate) fn acknowledge(&mut self, seq: u32) -> Option<(DispatchEntry, Instant)> {
        if self.in_flight.as_ref().is_some_and(|(e, _)| e.seq == seq) {
            self.in_flight.take()
        } else {
            None
        }
    }

    pub(crate) fn in_flight_seq(&self) -> Option<u32> {
        self.in_flight.as_ref().map(|(e, _)| e.seq)
    }

    /// Nothing in flight and nothing queued.
    pub(crate) fn is_idle(&self) -> bool {
        self.in_flight.is_none() && self.outbound.is_empty()
    }

    /// Returns `true` if any motion entry is in flight or queued.
    pub(crate) fn has_pending_motion(&self) -> bool {
        self.in_flight
            .iter()
            .map(|(e, _)| e)
            .chain(self.outbound.iter())
            .any(|e| matches!(e.event, DispatchedEvent::Motion(_)))
    }

    /// Remove every in-flight and queued entry.
    pub(crate) fn drain(&mut self) -> Vec<DispatchEntry> {
        self.in_flight
            .take()
            .map(|(e, _)| e)
            .into_iter()
            .chain(self.outbound.drain(..))
            .collect()
    }

    /// Canceled key-ups for every key this connection still holds down.
    pub(crate) fn synthesize_key_cancels(&self, now: Instant) -> Vec<KeyEvent> {
        self.keys_down
            .iter()
            .map(|down| KeyEvent {
                action: KeyAction::Up,
                flags: down.flags | KeyFlags::CANCELED,
                repeat_count: 0,
                event_time: now,
                ..down.clone()
            })
            .collect()
    }

    fn track_key(&mut self, key: &KeyEvent) {
        let same = |k: &KeyEvent| k.device_id == key.device_id && k.key_code == key.key_code;
        match key.action {
            KeyAction::Down => {
                if !self.keys_down.iter().any(same) {
                    self.keys_down.push(key.clone());
                }
            }
            KeyAction::Up => self.keys_down.retain(|k| !same(k)),
        }
    }
}

// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Gesture surgery: cancellation, wallpaper upkeep, pilfering and transfer.

use std::time::Instant;

use kurbo::Point;
use smallvec::SmallVec;
use tracing::{debug, info, warn};
use understory_window_registry::{DisplayId, Token, WindowFlags};

use super::Dispatcher;
use crate::error::PilferError;
use crate::event::{
    DeviceId, InputSource, MotionAction, MotionEvent, MotionFlags, Pointer, PointerIds, ToolType,
};
use crate::policy::DispatchPolicy;
use crate::target::{DispatchMode, TargetFlags};
use crate::touch_state::{TouchRole, TouchState};

impl<P: DispatchPolicy> Dispatcher<P> {
    /// Make `token` the exclusive receiver of every pointer it currently holds.
    ///
    /// Every other receiver sharing one of those pointers gets a canceled event for it and
    /// stops receiving it. Pointers that go down later are routed like any other pointer.
    ///
    /// Fails without side effects if `token` holds no pointer that is down.
    pub fn pilfer_pointers(&mut self, token: Token, now: Instant) -> Result<(), PilferError> {
        let mut claims: SmallVec<[(DisplayId, DeviceId, PointerIds); 2]> = SmallVec::new();
        for (display, state) in &self.touch {
            let Some(window) = state.window(token) else {
                continue;
            };
            for d in &window.devices {
                let active = state
                    .gestures
                    .get(&d.device)
                    .is_some_and(|g| !g.targets_dropped);
                if active && !d.pointers.is_empty() {
                    claims.push((*display, d.device, d.pointers));
                }
            }
        }
        if claims.is_empty() {
            warn!(token = ?token, "pilfer rejected: no active pointers");
            return Err(PilferError::NoActivePointers(token));
        }

        for (display, device, ids) in claims {
            let victims: SmallVec<[(Token, PointerIds); 4]> = self
                .touch
                .get(&display)
                .map(|s| {
                    s.windows
                        .iter()
                        .filter(|w| w.token != token)
                        .filter_map(|w| {
                            let shared = w.pointers(device).intersection(ids);
                            (!shared.is_empty()).then_some((w.token, shared))
                        })
                        .collect()
                })
                .unwrap_or_default();
            debug!(token = ?token, device = ?device, pointers = ?ids, victims = victims.len(), "pilfering pointers");
            for (victim, shared) in victims {
                self.cancel_pointers(display, victim, device, shared, now);
            }
            if let Some(d) = self
                .touch
                .get_mut(&display)
                .and_then(|s| s.window_mut(token))
                .and_then(|w| w.devices.iter_mut().find(|d| d.device == device))
            {
                d.pilfering = d.pilfering.union(ids);
            }
        }
        Ok(())
    }

    /// Move the gesture held by `from` to `to`.
    ///
    /// `from` gets a canceled event; `to` gets a `Down` (and a `PointerDown` per further
    /// pointer) marked with [`MotionFlags::NO_FOCUS_CHANGE`], after which the gesture's
    /// samples go to `to`. Returns `false` without side effects when `from` is not the
    /// foreground window of an active gesture or `to` cannot take it. Spies, wallpapers and
    /// monitors only mirror a gesture and cannot hand it over.
    pub fn transfer_touch_gesture(&mut self, from: Token, to: Token, now: Instant) -> bool {
        let Some(display) = self
            .touch
            .iter()
            .find(|(_, s)| {
                s.window(from)
                    .is_some_and(|w| w.role == TouchRole::Foreground && !w.devices.is_empty())
            })
            .map(|(d, _)| *d)
        else {
            warn!(from = ?from, to = ?to, "transfer rejected: source holds no gesture");
            return false;
        };
        if from == to {
            return true;
        }
        if !self
            .registry
            .find_on(display, to)
            .is_some_and(|w| self.can_deliver(w))
        {
            warn!(from = ?from, to = ?to, "transfer rejected: target cannot receive input");
            return false;
        }
        let display_id = display;
        debug!(from = ?from, to = ?to, display_id = ?display_id, "transferring touch gesture");

        let devices: SmallVec<[(DeviceId, PointerIds, Instant); 1]> = self
            .touch
            .get(&display)
            .and_then(|s| s.window(from))
            .map(|w| {
                w.devices
                    .iter()
                    .map(|d| (d.device, d.pointers, d.down_time))
                    .collect()
            })
            .unwrap_or_default();
        for (device, ids, down_time) in devices {
            let wallpaper_before = self.wallpaper_pointers(display, device);
            let held_before = self.held_pointers(display, to, device);
            self.cancel_pointers(display, from, device, ids, now);
            self.add_foreground(display, device, to, ids, down_time);
            self.seed_pointers(display, device, to, ids.difference(held_before), now);

            for (wallpaper, after) in self.wallpaper_pointers(display, device) {
                let before = wallpaper_before
                    .iter()
                    .find(|(t, _)| *t == wallpaper)
                    .map(|(_, ids)| *ids)
                    .unwrap_or_default();
                self.seed_pointers(display, device, wallpaper, after.difference(before), now);
            }
            self.reconcile_wallpaper(display, device, now);
        }
        true
    }

    /// Cancel every touch and hover on `display`.
    pub fn cancel_all_touches_on_display(&mut self, display: DisplayId, reason: &str, now: Instant) {
        let display_id = display;
        info!(display_id = ?display_id, reason = %reason, "canceling all touches");
        let devices: SmallVec<[DeviceId; 2]> = self
            .touch
            .get(&display)
            .map(|s| s.gestures.keys().copied().collect())
            .unwrap_or_default();
        for device in devices {
            self.cancel_device_gesture(display, device, now);
        }
        let hovering: SmallVec<[DeviceId; 2]> = self
            .hover
            .keys()
            .filter(|(d, _)| *d == display)
            .map(|(_, device)| *device)
            .collect();
        for device in hovering {
            self.exit_hover(display, device, None, now);
        }
    }

    /// Cancel the whole gesture of `device` on `display` in every receiver.
    pub(super) fn cancel_device_gesture(&mut self, display: DisplayId, device: DeviceId, now: Instant) {
        let tokens = self
            .touch
            .get(&display)
            .map(|s| s.tokens_for(device))
            .unwrap_or_default();
        for token in tokens {
            let ids = self.held_pointers(display, token, device);
            self.cancel_pointers(display, token, device, ids, now);
        }
        self.forget_gesture(display, device);
    }

    /// Cancel everything `token` receives on `display`.
    pub(super) fn cancel_receiver_on_display(&mut self, display: DisplayId, token: Token, now: Instant) {
        let held: SmallVec<[(DeviceId, PointerIds); 2]> = self
            .touch
            .get(&display)
            .and_then(|s| s.window(token))
            .map(|w| w.devices.iter().map(|d| (d.device, d.pointers)).collect())
            .unwrap_or_default();
        for (device, ids) in held {
            debug!(token = ?token, device = ?device, pointers = ?ids, "canceling receiver");
            self.cancel_pointers(display, token, device, ids, now);
            self.reconcile_wallpaper(display, device, now);
        }
        let hovering: SmallVec<[DeviceId; 2]> = self
            .hover
            .iter()
            .filter(|((d, _), h)| *d == display && h.contains(token))
            .map(|((_, device), _)| *device)
            .collect();
        for device in hovering {
            self.exit_hover_window(display, device, token, now);
        }
        if self.touch.get(&display).is_some_and(TouchState::is_empty) {
            self.touch.remove(&display);
        }
    }

    /// Cancel `ids` of `device` in `token` and forget them there.
    ///
    /// If the receiver keeps other pointers of the device, each canceled pointer is sent as
    /// a canceled `PointerUp`; otherwise a single `Cancel` is sent.
    pub(super) fn cancel_pointers(
        &mut self,
        display: DisplayId,
        token: Token,
        device: DeviceId,
        ids: PointerIds,
        now: Instant,
    ) {
        let Some(state) = self.touch.get_mut(&display) else {
            return;
        };
        let Some(window) = state.window(token) else {
            return;
        };
        let held = window.pointers(device);
        let ids = held.intersection(ids);
        if ids.is_empty() {
            return;
        }
        let (flags, transform) = (window.flags, window.transform);
        let down_time = window.device(device).map_or(now, |d| d.down_time);
        let gesture = state.gestures.get(&device);
        let source = gesture.map_or(InputSource::TOUCHSCREEN, |g| g.source);
        let positions: SmallVec<[Pointer; 4]> = held
            .iter()
            .map(|id| {
                gesture
                    .and_then(|g| g.pointers.iter().find(|p| p.id == id).copied())
                    .unwrap_or_else(|| Pointer::new(id, ToolType::Unknown, Point::ZERO))
            })
            .collect();
        if let Some(w) = state.window_mut(token) {
            w.remove_pointers(device, ids);
        }
        state.prune();

        let event = |action: MotionAction, set: PointerIds| {
            MotionEvent::new(
                device,
                source,
                display,
                action,
                now,
                positions.iter().filter(|p| set.contains(p.id)).copied(),
            )
            .with_down_time(down_time)
            .with_flags(MotionFlags::CANCELED)
        };
        let remaining = held.difference(ids);
        let mut events: SmallVec<[MotionEvent; 2]> = SmallVec::new();
        if remaining.is_empty() {
            events.push(event(MotionAction::Cancel, held));
        } else {
            let mut current = held;
            for id in ids.iter() {
                let idx = current.iter().position(|p| p == id).unwrap_or_default();
                events.push(event(MotionAction::PointerUp(idx), current));
                current.remove(id);
            }
        }
        debug!(token = ?token, device = ?device, pointers = ?ids, "canceling pointers");
        for e in events {
            self.deliver_motion(token, e, DispatchMode::AsIs, flags, transform, now);
        }
    }

    /// Cancel wallpaper pointers of `device` that no duplicating foreground window holds.
    pub(super) fn reconcile_wallpaper(&mut self, display: DisplayId, device: DeviceId, now: Instant) {
        let Some(state) = self.touch.get(&display) else {
            return;
        };
        let keep = state
            .foreground_for(device)
            .filter(|w| {
                self.registry
                    .find_on(display, w.token)
                    .is_some_and(|d| d.flags.contains(WindowFlags::DUPLICATE_TOUCH_TO_WALLPAPER))
            })
            .fold(PointerIds::EMPTY, |acc, w| acc.union(w.pointers(device)));
        let excess: SmallVec<[(Token, PointerIds); 1]> = self
            .wallpaper_pointers(display, device)
            .into_iter()
            .filter_map(|(token, ids)| {
                let extra = ids.difference(keep);
                (!extra.is_empty()).then_some((token, extra))
            })
            .collect();
        for (token, ids) in excess {
            debug!(token = ?token, device = ?device, pointers = ?ids, "wallpaper lost its foreground window");
            self.cancel_pointers(display, token, device, ids, now);
        }
    }

    /// Wallpaper receivers holding pointers of `device`, with those pointers.
    pub(super) fn wallpaper_pointers(
        &self,
        display: DisplayId,
        device: DeviceId,
    ) -> SmallVec<[(Token, PointerIds); 1]> {
        self.touch
            .get(&display)
            .map(|s| {
                s.windows
                    .iter()
                    .filter(|w| w.role == TouchRole::Wallpaper && w.has_device(device))
                    .map(|w| (w.token, w.pointers(device)))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn held_pointers(&self, display: DisplayId, token: Token, device: DeviceId) -> PointerIds {
        self.touch
            .get(&display)
            .and_then(|s| s.window(token))
            .map(|w| w.pointers(device))
            .unwrap_or_default()
    }

    /// Bring `token` up to date with `ids`, one `Down`/`PointerDown` per pointer.
    fn seed_pointers(
        &mut self,
        display: DisplayId,
        device: DeviceId,
        token: Token,
        ids: PointerIds,
        now: Instant,
    ) {
        if ids.is_empty() {
            return;
        }
        let Some(state) = self.touch.get(&display) else {
            return;
        };
        let (Some(window), Some(gesture)) = (state.window(token), state.gestures.get(&device)) else {
            return;
        };
        let flags = window.flags | TargetFlags::NO_FOCUS_CHANGE;
        let transform = window.transform;
        let down_time = window.device(device).map_or(gesture.down_time, |d| d.down_time);
        let source = gesture.source;
        let positions = gesture.pointers.clone();

        let mut current = window.pointers(device).difference(ids);
        let mut events: SmallVec<[MotionEvent; 2]> = SmallVec::new();
        for id in ids.iter() {
            current.insert(id);
            let action = if current.len() == 1 {
                MotionAction::Down
            } else {
                MotionAction::PointerDown(current.iter().position(|p| p == id).unwrap_or_default())
            };
            let pointers = positions.iter().filter(|p| current.contains(p.id)).copied();
            events.push(
                MotionEvent::new(device, source, display, action, now, pointers)
                    .with_down_time(down_time),
            );
        }
        debug!(token = ?token, device = ?device, pointers = ?ids, "seeding transferred pointers");
        for e in events {
            self.deliver_motion(token, e, DispatchMode::AsIs, flags, transform, now);
        }
    }
}

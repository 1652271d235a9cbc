// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Motion routing: target resolution for touch, hover and scroll samples.

use std::time::Instant;

use kurbo::{Affine, Point};
use smallvec::SmallVec;
use tracing::{debug, warn};
use understory_window_registry::{DisplayId, Token, WindowFlags};

use super::Dispatcher;
use crate::arbitration::{Activity, Verdict, arbitrate};
use crate::connection::ConnectionKind;
use crate::event::{DeviceId, InputSource, MotionAction, MotionEvent, MotionFlags, PointerIds};
use crate::hover::{HoverState, HoveredWindow, transition};
use crate::policy::DispatchPolicy;
use crate::target::{DispatchMode, TargetFlags};
use crate::touch_state::{Gesture, TouchRole, TouchState};

/// Devices to evict from a window before a newcomer may use it.
pub(super) type Evictions = SmallVec<[(DeviceId, Activity); 2]>;

impl<P: DispatchPolicy> Dispatcher<P> {
    pub(super) fn process_motion(&mut self, mut event: MotionEvent, now: Instant) {
        let display = event.display_id;
        let device = event.device_id;
        let age = now.saturating_duration_since(event.event_time);
        if age > self.config.stale_event_timeout {
            let touching = self
                .touch
                .get(&display)
                .is_some_and(|s| s.has_touching_pointers(device));
            if !touching {
                warn!(device = ?device, age = ?age, action = ?event.action, "dropping stale motion event");
                return;
            }
            debug!(device = ?device, age = ?age, "processing stale motion of an ongoing gesture");
        }
        if event.pointers.is_empty() {
            warn!(device = ?device, action = ?event.action, "dropping motion event without pointers");
            return;
        }
        if !event.has_valid_pointer_ids() {
            warn!(
                device = ?device,
                action = ?event.action,
                ids = ?event.pointers.iter().map(|p| p.id).collect::<SmallVec<[u8; 4]>>(),
                "dropping motion event with out-of-range or duplicate pointer ids"
            );
            return;
        }
        event.transform(self.registry.display_transform(display));

        if event.source.contains(InputSource::MOUSE)
            && let Some(&capturer) = self.pointer_capture.get(&display)
        {
            self.deliver_motion(
                capturer,
                event,
                DispatchMode::AsIs,
                TargetFlags::FOREGROUND,
                Affine::IDENTITY,
                now,
            );
            return;
        }

        match event.action {
            MotionAction::Down => self.touch_down(event, now),
            MotionAction::PointerDown(_) => self.touch_pointer_down(event, now),
            MotionAction::Move => self.touch_move(event, now),
            MotionAction::Up | MotionAction::PointerUp(_) => self.touch_up(event, now),
            MotionAction::Cancel => self.touch_cancel(event, now),
            MotionAction::HoverEnter | MotionAction::HoverMove | MotionAction::HoverExit => {
                self.hover_sample(event, now);
            }
            MotionAction::Scroll => self.scroll(event, now),
            MotionAction::Outside => {
                warn!(device = ?device, "dropping Outside motion from the event source");
            }
        }
    }

    // --- Arbitration -------------------------------------------------------------------

    /// Returns `true` if a stylus is down or hovering on `display`.
    fn stylus_active(&self, display: DisplayId) -> bool {
        self.touch.get(&display).is_some_and(TouchState::is_stylus_down)
            || self
                .hover
                .iter()
                .any(|((d, _), h)| *d == display && h.is_stylus)
    }

    /// Activities of every device down in or hovering over `token`.
    fn activities_in(&self, display: DisplayId, token: Token) -> SmallVec<[(DeviceId, Activity); 2]> {
        let mut activities = self
            .touch
            .get(&display)
            .map(|s| s.activities_in(token))
            .unwrap_or_default();
        for ((d, device), h) in &self.hover {
            if *d == display && h.contains(token) {
                activities.push((*device, Activity::new(h.is_stylus, true)));
            }
        }
        activities
    }

    /// Decide whether `device` may start `activity` in `token`.
    ///
    /// Returns the devices that must be evicted first, or `None` if the window is not
    /// deliverable or `device` is outranked there.
    pub(super) fn admit(
        &self,
        display: DisplayId,
        device: DeviceId,
        activity: Activity,
        token: Token,
    ) -> Option<Evictions> {
        let window = self.registry.find_on(display, token)?;
        if !self.can_deliver(window) {
            debug!(token = ?token, "hit window cannot receive input");
            return None;
        }
        if !activity.is_stylus()
            && window.flags.contains(WindowFlags::GLOBAL_STYLUS_BLOCKS_TOUCH)
            && self.stylus_active(display)
        {
            warn!(token = ?token, device = ?device, "touch blocked by an active stylus");
            return None;
        }
        if self.config.multi_device_same_window {
            return Some(Evictions::new());
        }
        match arbitrate(device, activity, self.activities_in(display, token)) {
            Verdict::Blocked { by } => {
                warn!(token = ?token, device = ?device, by = ?by, "device outranked in window");
                None
            }
            Verdict::Allowed { evict } => Some(evict),
        }
    }

    pub(super) fn evict(
        &mut self,
        display: DisplayId,
        token: Token,
        evictions: &[(DeviceId, Activity)],
        now: Instant,
    ) {
        for &(device, activity) in evictions {
            debug!(token = ?token, device = ?device, activity = ?activity, "evicting device from window");
            if activity.is_hover() {
                self.exit_hover_window(display, device, token, now);
            } else {
                let ids = self
                    .touch
                    .get(&display)
                    .and_then(|s| s.window(token))
                    .map(|w| w.pointers(device))
                    .unwrap_or_default();
                if !ids.is_empty() {
                    self.cancel_pointers(display, token, device, ids, now);
                    self.reconcile_wallpaper(display, device, now);
                }
            }
        }
    }

    // --- Touch -------------------------------------------------------------------------

    fn touch_down(&mut self, event: MotionEvent, now: Instant) {
        let display = event.display_id;
        let device = event.device_id;
        if self
            .touch
            .get(&display)
            .is_some_and(|s| s.gestures.contains_key(&device))
        {
            warn!(device = ?device, "new DOWN while a gesture is active; canceling it first");
            self.cancel_device_gesture(display, device, now);
        }
        self.exit_hover(display, device, None, now);

        let Some(pointer) = event.action_pointer().copied() else {
            return;
        };
        let is_stylus = event.is_stylus();
        let activity = Activity::new(is_stylus, false);
        let foreground = self
            .registry
            .hit_test(display, pointer.position, is_stylus)
            .map(|w| w.token)
            .and_then(|t| self.admit(display, device, activity, t).map(|e| (t, e)));
        let spies = self.admitted_spies(display, device, activity, pointer.position, is_stylus);

        let state = self.touch.entry(display).or_default();
        let mut gesture = Gesture {
            source: event.source,
            is_stylus,
            down_time: event.down_time,
            pointers: event.pointers.clone(),
            targets_dropped: false,
            outside_notified: SmallVec::new(),
        };
        if foreground.is_none() && spies.is_empty() {
            warn!(device = ?device, position = ?pointer.position, "DOWN found no target; dropping gesture");
            gesture.targets_dropped = true;
            state.gestures.insert(device, gesture);
            return;
        }
        state.gestures.insert(device, gesture);

        let ids = PointerIds::single(pointer.id);
        if let Some((token, evictions)) = &foreground {
            self.evict(display, *token, evictions, now);
            self.add_foreground(display, device, *token, ids, event.down_time);
        }
        for (token, evictions) in &spies {
            self.evict(display, *token, evictions, now);
            self.add_receiver(display, device, *token, TouchRole::Spy, TargetFlags::empty(), ids, event.down_time);
        }
        self.add_monitors(display, device, ids, event.down_time);

        if let Some((token, _)) = foreground {
            self.notify_outside(display, device, token, &event, now);
            if self.focus.focused(display) != Some(token) {
                self.policy.on_pointer_down_outside_focus(display, token);
            }
        }
        self.dispatch_to_gesture(&event, &[], now);
    }

    fn touch_pointer_down(&mut self, event: MotionEvent, now: Instant) {
        let display = event.display_id;
        let device = event.device_id;
        let Some(gesture) = self
            .touch
            .get_mut(&display)
            .and_then(|s| s.gestures.get_mut(&device))
        else {
            warn!(device = ?device, "POINTER_DOWN without an active gesture");
            return;
        };
        if gesture.targets_dropped {
            debug!(device = ?device, "POINTER_DOWN of a gesture without targets");
            return;
        }
        gesture.pointers = event.pointers.clone();
        let is_stylus = gesture.is_stylus;
        let Some(pointer) = event.action_pointer().copied() else {
            return;
        };
        let ids = PointerIds::single(pointer.id);
        let down_time = event.event_time;

        let activity = Activity::new(is_stylus, false);
        let hit = self
            .registry
            .hit_test(display, pointer.position, is_stylus)
            .map(|w| (w.token, w.supports_split_touch()));
        let current: SmallVec<[(Token, bool); 2]> = self
            .touch
            .get(&display)
            .map(|s| {
                s.foreground_for(device)
                    .map(|w| {
                        let splits = self
                            .registry
                            .find_on(display, w.token)
                            .is_none_or(|d| d.supports_split_touch());
                        (w.token, splits)
                    })
                    .collect()
            })
            .unwrap_or_default();

        match hit {
            Some((token, _)) if current.iter().any(|(t, _)| *t == token) => {
                self.add_foreground(display, device, token, ids, down_time);
            }
            Some((token, splits)) => {
                if !splits || current.iter().any(|(_, s)| !s) {
                    debug!(device = ?device, token = ?token, "pointer would split a gesture that prevents splitting; ignoring it");
                } else if let Some(evictions) = self.admit(display, device, activity, token) {
                    self.evict(display, token, &evictions, now);
                    self.add_foreground(display, device, token, ids, down_time);
                    self.notify_outside(display, device, token, &event, now);
                } else {
                    debug!(device = ?device, token = ?token, "new pointer rejected by the hit window");
                }
            }
            None => {
                if let Some(&(token, _)) = current.first() {
                    self.add_foreground(display, device, token, ids, down_time);
                }
            }
        }

        let spies = self.admitted_spies(display, device, activity, pointer.position, is_stylus);
        for (token, evictions) in &spies {
            self.evict(display, *token, evictions, now);
            self.add_receiver(display, device, *token, TouchRole::Spy, TargetFlags::empty(), ids, down_time);
        }
        let monitors: SmallVec<[Token; 2]> = self
            .touch
            .get(&display)
            .map(|s| {
                s.windows
                    .iter()
                    .filter(|w| w.role == TouchRole::Monitor && w.has_device(device))
                    .map(|w| w.token)
                    .collect()
            })
            .unwrap_or_default();
        if let Some(state) = self.touch.get_mut(&display) {
            for token in monitors {
                if let Some(w) = state.window_mut(token) {
                    w.add_pointers(device, ids, down_time);
                }
            }
        }
        self.dispatch_to_gesture(&event, &[], now);
    }

    fn touch_move(&mut self, event: MotionEvent, now: Instant) {
        let display = event.display_id;
        let device = event.device_id;
        let Some(gesture) = self
            .touch
            .get_mut(&display)
            .and_then(|s| s.gestures.get_mut(&device))
        else {
            debug!(device = ?device, "MOVE without an active gesture");
            return;
        };
        if gesture.targets_dropped {
            return;
        }
        for p in &mut gesture.pointers {
            if let Some(sample) = event.pointer(p.id) {
                p.position = sample.position;
            }
        }
        let is_stylus = gesture.is_stylus;

        let mut served: SmallVec<[Token; 2]> = SmallVec::new();
        if event.pointers.len() == 1 {
            served = self.slip(&event, is_stylus, now);
        }
        self.dispatch_to_gesture(&event, &served, now);
    }

    /// Move a single-pointer gesture out of a slippery window into the window now under it.
    ///
    /// Returns the receivers that were already served a synthesized event for `event`.
    fn slip(&mut self, event: &MotionEvent, is_stylus: bool, now: Instant) -> SmallVec<[Token; 2]> {
        let display = event.display_id;
        let device = event.device_id;
        let mut served = SmallVec::new();
        let Some(pointer) = event.pointers.first().copied() else {
            return served;
        };
        let Some((old, old_transform, old_flags)) = self.touch.get(&display).and_then(|s| {
            let w = s.foreground_for(device).next()?;
            Some((w.token, w.transform, w.flags))
        }) else {
            return served;
        };
        let slippery = self
            .registry
            .find_on(display, old)
            .is_some_and(|w| w.flags.contains(WindowFlags::SLIPPERY));
        if !slippery {
            return served;
        }
        let Some(new) = self
            .registry
            .hit_test(display, pointer.position, is_stylus)
            .map(|w| w.token)
            .filter(|t| *t != old)
        else {
            return served;
        };
        let activity = Activity::new(is_stylus, false);
        let Some(evictions) = self.admit(display, device, activity, new) else {
            debug!(from = ?old, to = ?new, "slippery exit blocked; keeping the gesture");
            return served;
        };
        debug!(from = ?old, to = ?new, device = ?device, "gesture slipped into another window");

        let ids = PointerIds::single(pointer.id);
        if let Some(state) = self.touch.get_mut(&display) {
            if let Some(w) = state.window_mut(old) {
                w.remove_device(device);
            }
            state.prune();
        }
        self.deliver_motion(old, event.clone(), DispatchMode::SlipperyExit, old_flags, old_transform, now);
        served.push(old);

        self.evict(display, new, &evictions, now);
        let had_wallpaper = self.wallpaper_pointers(display, device);
        self.add_foreground(display, device, new, ids, event.event_time);
        self.reconcile_wallpaper(display, device, now);

        let entered: SmallVec<[Token; 2]> = self
            .wallpaper_pointers(display, device)
            .into_iter()
            .map(|(t, _)| t)
            .filter(|t| !had_wallpaper.iter().any(|(h, _)| h == t))
            .chain([new])
            .collect();
        for token in entered {
            let Some((flags, transform)) = self
                .touch
                .get(&display)
                .and_then(|s| s.window(token))
                .map(|w| (w.flags, w.transform))
            else {
                continue;
            };
            self.deliver_motion(token, event.clone(), DispatchMode::SlipperyEnter, flags, transform, now);
            served.push(token);
        }
        self.notify_outside(display, device, new, event, now);
        served
    }

    fn touch_up(&mut self, event: MotionEvent, now: Instant) {
        let display = event.display_id;
        let device = event.device_id;
        let Some(gesture) = self
            .touch
            .get_mut(&display)
            .and_then(|s| s.gestures.get_mut(&device))
        else {
            debug!(device = ?device, action = ?event.action, "UP without an active gesture");
            return;
        };
        let targets_dropped = gesture.targets_dropped;
        let lifted = match event.action {
            MotionAction::PointerUp(_) => event
                .action_pointer()
                .map(|p| PointerIds::single(p.id))
                .unwrap_or_default(),
            _ => gesture.pointer_ids().union(event.pointer_ids()),
        };
        gesture.pointers.retain(|p| !lifted.contains(p.id));
        if !targets_dropped {
            self.dispatch_to_gesture(&event, &[], now);
        }
        if let Some(state) = self.touch.get_mut(&display) {
            state.remove_pointers(device, lifted);
            if event.action == MotionAction::Up {
                state.gestures.remove(&device);
            }
            if state.is_empty() {
                self.touch.remove(&display);
            }
        }
    }

    fn touch_cancel(&mut self, mut event: MotionEvent, now: Instant) {
        let display = event.display_id;
        let device = event.device_id;
        if !self
            .touch
            .get(&display)
            .is_some_and(|s| s.gestures.contains_key(&device))
        {
            debug!(device = ?device, "CANCEL without an active gesture");
            return;
        }
        event.flags |= MotionFlags::CANCELED;
        self.dispatch_to_gesture(&event, &[], now);
        self.forget_gesture(display, device);
    }

    /// Drop all touch state of `device` on `display` without delivering anything.
    pub(super) fn forget_gesture(&mut self, display: DisplayId, device: DeviceId) {
        if let Some(state) = self.touch.get_mut(&display) {
            state.remove_device(device);
            state.gestures.remove(&device);
            if state.is_empty() {
                self.touch.remove(&display);
            }
        }
    }

    /// Deliver `event` to every receiver holding pointers of its device, except `skip`.
    pub(super) fn dispatch_to_gesture(&mut self, event: &MotionEvent, skip: &[Token], now: Instant) {
        let display = event.display_id;
        let device = event.device_id;
        let Some(state) = self.touch.get(&display) else {
            return;
        };
        let targets: SmallVec<[(Token, PointerIds, TargetFlags, Affine, Instant); 4]> = state
            .windows
            .iter()
            .filter(|w| !skip.contains(&w.token))
            .filter_map(|w| {
                let d = w.device(device)?;
                Some((w.token, d.pointers, w.flags, w.transform, d.down_time))
            })
            .collect();
        for (token, ids, flags, transform, down_time) in targets {
            let Some(mut split) = event.split(ids) else {
                continue;
            };
            if split.pointers.len() != event.pointers.len() {
                debug!(token = ?token, pointers = ?ids, "split motion for receiver");
            }
            split.down_time = down_time;
            self.deliver_motion(token, split, DispatchMode::AsIs, flags, transform, now);
        }
    }

    // --- Receivers ---------------------------------------------------------------------

    /// Spies at `pt` that admit `device`, topmost first.
    fn admitted_spies(
        &self,
        display: DisplayId,
        device: DeviceId,
        activity: Activity,
        pt: Point,
        is_stylus: bool,
    ) -> SmallVec<[(Token, Evictions); 2]> {
        self.registry
            .spy_windows_at(display, pt, is_stylus)
            .filter_map(|w| {
                self.admit(display, device, activity, w.token)
                    .map(|e| (w.token, e))
            })
            .collect()
    }

    pub(super) fn add_receiver(
        &mut self,
        display: DisplayId,
        device: DeviceId,
        token: Token,
        role: TouchRole,
        flags: TargetFlags,
        ids: PointerIds,
        down_time: Instant,
    ) {
        let transform = self
            .registry
            .find_on(display, token)
            .map(|w| w.transform)
            .unwrap_or(Affine::IDENTITY);
        self.touch
            .entry(display)
            .or_default()
            .entry(token, role, flags, transform)
            .add_pointers(device, ids, down_time);
    }

    /// Add `ids` to `token` as a foreground window, duplicating them to the wallpaper when
    /// the window asks for it.
    pub(super) fn add_foreground(
        &mut self,
        display: DisplayId,
        device: DeviceId,
        token: Token,
        ids: PointerIds,
        down_time: Instant,
    ) {
        let Some(window) = self.registry.find_on(display, token) else {
            return;
        };
        let mut flags = TargetFlags::FOREGROUND;
        if window.supports_split_touch() {
            flags |= TargetFlags::SPLIT;
        }
        let duplicates = window
            .flags
            .contains(WindowFlags::DUPLICATE_TOUCH_TO_WALLPAPER);
        self.add_receiver(display, device, token, TouchRole::Foreground, flags, ids, down_time);

        if duplicates
            && let Some(wallpaper) = self.registry.wallpaper(display, token)
            && self.can_deliver(wallpaper)
        {
            let wallpaper = wallpaper.token;
            self.add_receiver(
                display,
                device,
                wallpaper,
                TouchRole::Wallpaper,
                TargetFlags::WALLPAPER,
                ids,
                down_time,
            );
        }
    }

    fn add_monitors(&mut self, display: DisplayId, device: DeviceId, ids: PointerIds, down_time: Instant) {
        let monitors: SmallVec<[Token; 2]> = self
            .connections
            .values()
            .filter(|c| c.kind == ConnectionKind::Monitor { display })
            .map(|c| c.token)
            .collect();
        let state = self.touch.entry(display).or_default();
        for token in monitors {
            state
                .entry(token, TouchRole::Monitor, TargetFlags::empty(), Affine::IDENTITY)
                .add_pointers(device, ids, down_time);
        }
    }

    /// Send `Outside` to watchers the first time a gesture lands in `foreground`.
    fn notify_outside(
        &mut self,
        display: DisplayId,
        device: DeviceId,
        foreground: Token,
        event: &MotionEvent,
        now: Instant,
    ) {
        let Some(state) = self.touch.get(&display) else {
            return;
        };
        let Some(gesture) = state.gestures.get(&device) else {
            return;
        };
        let owner = self.registry.find_on(display, foreground).map(|w| w.owner);
        let watchers: SmallVec<[(Token, TargetFlags, Affine); 2]> = self
            .registry
            .outside_watchers(display)
            .filter(|w| {
                w.token != foreground
                    && !gesture.outside_notified.contains(&w.token)
                    && !state.window(w.token).is_some_and(|t| t.has_device(device))
                    && self.can_deliver(w)
            })
            .map(|w| {
                let flags = if Some(w.owner) == owner {
                    TargetFlags::empty()
                } else {
                    TargetFlags::ZERO_COORDS
                };
                (w.token, flags, w.transform)
            })
            .collect();
        if watchers.is_empty() {
            return;
        }
        let Some(pointer) = event.action_pointer().copied() else {
            return;
        };
        if let Some(gesture) = self
            .touch
            .get_mut(&display)
            .and_then(|s| s.gestures.get_mut(&device))
        {
            gesture.outside_notified.extend(watchers.iter().map(|(t, _, _)| *t));
        }
        let mut outside = event.clone();
        outside.pointers = SmallVec::from_slice(&[pointer]);
        for (token, flags, transform) in watchers {
            debug!(token = ?token, device = ?device, "sending Outside");
            self.deliver_motion(token, outside.clone(), DispatchMode::Outside, flags, transform, now);
        }
    }

    // --- Hover -------------------------------------------------------------------------

    fn hover_sample(&mut self, event: MotionEvent, now: Instant) {
        let display = event.display_id;
        let device = event.device_id;
        if event.action == MotionAction::HoverExit {
            self.exit_hover(display, device, Some(&event), now);
            return;
        }
        if self
            .touch
            .get(&display)
            .is_some_and(|s| s.has_touching_pointers(device))
        {
            warn!(device = ?device, "dropping hover sample from a device that is down");
            return;
        }
        let Some(pointer) = event.pointers.first().copied() else {
            return;
        };
        let is_stylus = event.is_stylus();
        let activity = Activity::new(is_stylus, true);

        let mut targets: SmallVec<[(HoveredWindow, Evictions); 2]> = SmallVec::new();
        if let Some(token) = self
            .registry
            .hit_test(display, pointer.position, is_stylus)
            .map(|w| w.token)
            && let Some(evictions) = self.admit(display, device, activity, token)
        {
            targets.push((self.hovered(display, token, TouchRole::Foreground), evictions));
        }
        for (token, evictions) in self.admitted_spies(display, device, activity, pointer.position, is_stylus) {
            targets.push((self.hovered(display, token, TouchRole::Spy), evictions));
        }
        for (window, evictions) in &targets {
            self.evict(display, window.token, evictions, now);
        }
        let new: SmallVec<[HoveredWindow; 2]> = targets.into_iter().map(|(w, _)| w).collect();

        let old = self
            .hover
            .get(&(display, device))
            .map(|h| h.windows.clone())
            .unwrap_or_default();
        let change = transition(&old, &new);
        if !change.exited.is_empty() || !change.entered.is_empty() {
            debug!(
                device = ?device,
                exited = ?change.exited.iter().map(|w| w.token).collect::<SmallVec<[Token; 2]>>(),
                entered = ?change.entered.iter().map(|w| w.token).collect::<SmallVec<[Token; 2]>>(),
                "hover transition"
            );
        }
        for w in &change.exited {
            self.deliver_motion(w.token, event.clone(), DispatchMode::HoverExit, hover_flags(w.role), w.transform, now);
        }
        for w in &change.entered {
            self.deliver_motion(w.token, event.clone(), DispatchMode::HoverEnter, hover_flags(w.role), w.transform, now);
        }
        for w in &new {
            let just_entered = change.entered.iter().any(|e| e.token == w.token);
            if just_entered && event.action == MotionAction::HoverEnter {
                continue;
            }
            let mut sample = event.clone();
            sample.action = MotionAction::HoverMove;
            self.deliver_motion(w.token, sample, DispatchMode::AsIs, hover_flags(w.role), w.transform, now);
        }

        if new.is_empty() {
            self.hover.remove(&(display, device));
        } else {
            self.hover.insert(
                (display, device),
                HoverState {
                    is_stylus,
                    windows: new,
                    last: event,
                },
            );
        }
    }

    fn hovered(&self, display: DisplayId, token: Token, role: TouchRole) -> HoveredWindow {
        HoveredWindow {
            token,
            role,
            transform: self
                .registry
                .find_on(display, token)
                .map(|w| w.transform)
                .unwrap_or(Affine::IDENTITY),
        }
    }

    /// End the hover of `device`, sending `HoverExit` (from `sample`, or the last sample)
    /// to every hovered receiver.
    pub(super) fn exit_hover(
        &mut self,
        display: DisplayId,
        device: DeviceId,
        sample: Option<&MotionEvent>,
        now: Instant,
    ) {
        let Some(state) = self.hover.remove(&(display, device)) else {
            return;
        };
        let event = match sample {
            Some(sample) => sample.clone(),
            None => synthesized(state.last, now),
        };
        for w in state.windows {
            debug!(token = ?w.token, device = ?device, "hover exit");
            self.deliver_motion(w.token, event.clone(), DispatchMode::HoverExit, hover_flags(w.role), w.transform, now);
        }
    }

    /// End the hover of `device` over `token` only.
    pub(super) fn exit_hover_window(
        &mut self,
        display: DisplayId,
        device: DeviceId,
        token: Token,
        now: Instant,
    ) {
        let Some(state) = self.hover.get_mut(&(display, device)) else {
            return;
        };
        let Some(window) = state.remove(token) else {
            return;
        };
        let event = synthesized(state.last.clone(), now);
        if state.windows.is_empty() {
            self.hover.remove(&(display, device));
        }
        debug!(token = ?token, device = ?device, "hover exit");
        self.deliver_motion(token, event, DispatchMode::HoverExit, hover_flags(window.role), window.transform, now);
    }

    // --- Scroll ------------------------------------------------------------------------

    fn scroll(&mut self, event: MotionEvent, now: Instant) {
        let display = event.display_id;
        let Some(pointer) = event.pointers.first().copied() else {
            return;
        };
        let is_stylus = event.is_stylus();
        let mut targets: SmallVec<[(Token, TargetFlags, Affine); 2]> = SmallVec::new();
        if let Some(w) = self.registry.hit_test(display, pointer.position, is_stylus)
            && self.can_deliver(w)
        {
            targets.push((w.token, TargetFlags::FOREGROUND, w.transform));
        }
        targets.extend(
            self.registry
                .spy_windows_at(display, pointer.position, is_stylus)
                .filter(|w| self.can_deliver(w))
                .map(|w| (w.token, TargetFlags::empty(), w.transform)),
        );
        if targets.is_empty() {
            debug!(device = ?event.device_id, "scroll found no target");
        }
        for (token, flags, transform) in targets {
            self.deliver_motion(token, event.clone(), DispatchMode::AsIs, flags, transform, now);
        }
    }
}

fn hover_flags(role: TouchRole) -> TargetFlags {
    match role {
        TouchRole::Foreground => TargetFlags::FOREGROUND,
        _ => TargetFlags::empty(),
    }
}

/// A copy of `last` stamped at `now`, for synthesized events.
fn synthesized(mut last: MotionEvent, now: Instant) -> MotionEvent {
    last.event_time = now;
    last.pointers.truncate(1);
    last
}

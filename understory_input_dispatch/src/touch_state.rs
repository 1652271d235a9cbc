// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-display touch bookkeeping: which receivers hold which pointers of which device.

use std::time::Instant;

use hashbrown::HashMap;
use kurbo::Affine;
use smallvec::SmallVec;
use understory_window_registry::Token;

use crate::arbitration::Activity;
use crate::event::{DeviceId, InputSource, Pointer, PointerIds};
use crate::target::TargetFlags;

/// Role of a receiver within a gesture.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TouchRole {
    /// The window the gesture landed in.
    Foreground,
    /// A spy window observing the gesture.
    Spy,
    /// The wallpaper behind a window that duplicates touches to it.
    Wallpaper,
    /// A headless monitor of the display.
    Monitor,
}

/// Read-only view of a [`TouchRole`] holder, as returned by
/// [`Dispatcher::touched_windows`](crate::Dispatcher::touched_windows).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TouchedWindowInfo {
    /// Receiver identity.
    pub token: Token,
    /// Role of the receiver.
    pub role: TouchRole,
    /// Delivery flags of the receiver.
    pub flags: TargetFlags,
    /// Devices with pointers down in the receiver, with those pointers.
    pub pointers: Vec<(DeviceId, PointerIds)>,
    /// Pointers the receiver has pilfered.
    pub pilfering: PointerIds,
}

#[derive(Clone, Debug)]
pub(crate) struct DeviceTouch {
    pub(crate) device: DeviceId,
    pub(crate) pointers: PointerIds,
    pub(crate) pilfering: PointerIds,
    /// First down time of this device in this receiver.
    pub(crate) down_time: Instant,
}

#[derive(Clone, Debug)]
pub(crate) struct TouchedWindow {
    pub(crate) token: Token,
    pub(crate) role: TouchRole,
    pub(crate) flags: TargetFlags,
    /// Display space to receiver space.
    pub(crate) transform: Affine,
    pub(crate) devices: SmallVec<[DeviceTouch; 1]>,
}

impl TouchedWindow {
    pub(crate) fn device(&self, device: DeviceId) -> Option<&DeviceTouch> {
        self.devices.iter().find(|d| d.device == device)
    }

    pub(crate) fn pointers(&self, device: DeviceId) -> PointerIds {
        self.device(device).map(|d| d.pointers).unwrap_or_default()
    }

    pub(crate) fn has_device(&self, device: DeviceId) -> bool {
        self.device(device).is_some_and(|d| !d.pointers.is_empty())
    }

    pub(crate) fn add_pointers(&mut self, device: DeviceId, ids: PointerIds, down_time: Instant) {
        if let Some(d) = self.devices.iter_mut().find(|d| d.device == device) {
            d.pointers = d.pointers.union(ids);
        } else {
            self.devices.push(DeviceTouch {
                device,
                pointers: ids,
                pilfering: PointerIds::EMPTY,
                down_time,
            });
        }
    }

    pub(crate) fn remove_pointers(&mut self, device: DeviceId, ids: PointerIds) {
        for d in &mut self.devices {
            if d.device == device {
                d.pointers = d.pointers.difference(ids);
                d.pilfering = d.pilfering.difference(ids);
            }
        }
        self.devices.retain(|d| !d.pointers.is_empty());
    }

    pub(crate) fn remove_device(&mut self, device: DeviceId) -> Option<DeviceTouch> {
        let idx = self.devices.iter().position(|d| d.device == device)?;
        Some(self.devices.remove(idx))
    }

    pub(crate) fn info(&self) -> TouchedWindowInfo {
        TouchedWindowInfo {
            token: self.token,
            role: self.role,
            flags: self.flags,
            pointers: self.devices.iter().map(|d| (d.device, d.pointers)).collect(),
            pilfering: self
                .devices
                .iter()
                .fold(PointerIds::EMPTY, |acc, d| acc.union(d.pilfering)),
        }
    }
}

/// One device's gesture on a display.
#[derive(Clone, Debug)]
pub(crate) struct Gesture {
    pub(crate) source: InputSource,
    pub(crate) is_stylus: bool,
    pub(crate) down_time: Instant,
    /// Pointers currently down, with their latest display-space positions.
    pub(crate) pointers: SmallVec<[Pointer; 4]>,
    /// The gesture found no receiver at its DOWN; its remaining samples are ignored.
    pub(crate) targets_dropped: bool,
    /// Windows that already received `Outside` during this gesture.
    pub(crate) outside_notified: SmallVec<[Token; 2]>,
}

impl Gesture {
    pub(crate) fn pointer_ids(&self) -> PointerIds {
        self.pointers.iter().map(|p| p.id).collect()
    }
}

#[derive(Clone, Debug, Default)]
pub(crate) struct TouchState {
    pub(crate) windows: Vec<TouchedWindow>,
    pub(crate) gestures: HashMap<DeviceId, Gesture>,
}

impl TouchState {
    pub(crate) fn window(&self, token: Token) -> Option<&TouchedWindow> {
        self.windows.iter().find(|w| w.token == token)
    }

    pub(crate) fn window_mut(&mut self, token: Token) -> Option<&mut TouchedWindow> {
        self.windows.iter_mut().find(|w| w.token == token)
    }

    /// The entry for `token`, created with `role` if absent. `flags` are merged in.
    pub(crate) fn entry(
        &mut self,
        token: Token,
        role: TouchRole,
        flags: TargetFlags,
        transform: Affine,
    ) -> &mut TouchedWindow {
        let idx = match self.windows.iter().position(|w| w.token == token) {
            Some(idx) => idx,
            None => {
                self.windows.push(TouchedWindow {
                    token,
                    role,
                    flags: TargetFlags::empty(),
                    transform,
                    devices: SmallVec::new(),
                });
                self.windows.len() - 1
            }
        };
        let window = &mut self.windows[idx];
        window.flags |= flags;
        window
    }

    /// Tokens of receivers holding pointers of `device`, in insertion order.
    pub(crate) fn tokens_for(&self, device: DeviceId) -> SmallVec<[Token; 4]> {
        self.windows
            .iter()
            .filter(|w| w.has_device(device))
            .map(|w| w.token)
            .collect()
    }

    pub(crate) fn foreground_for(&self, device: DeviceId) -> impl Iterator<Item = &TouchedWindow> {
        self.windows
            .iter()
            .filter(move |w| w.role == TouchRole::Foreground && w.has_device(device))
    }

    pub(crate) fn remove_pointers(&mut self, device: DeviceId, ids: PointerIds) {
        for w in &mut self.windows {
            w.remove_pointers(device, ids);
        }
        self.prune();
    }

    pub(crate) fn remove_device(&mut self, device: DeviceId) {
        for w in &mut self.windows {
            w.remove_device(device);
        }
        self.prune();
    }

    pub(crate) fn prune(&mut self) {
        self.windows.retain(|w| !w.devices.is_empty());
    }

    /// Returns `true` if `device` has pointers down on this display.
    pub(crate) fn has_touching_pointers(&self, device: DeviceId) -> bool {
        self.gestures
            .get(&device)
            .is_some_and(|g| !g.targets_dropped && !g.pointers.is_empty())
    }

    pub(crate) fn is_stylus_down(&self) -> bool {
        self.gestures
            .values()
            .any(|g| g.is_stylus && !g.targets_dropped)
    }

    /// Down activities of devices holding pointers in `token`.
    pub(crate) fn activities_in(&self, token: Token) -> SmallVec<[(DeviceId, Activity); 2]> {
        let Some(window) = self.window(token) else {
            return SmallVec::new();
        };
        window
            .devices
            .iter()
            .map(|d| {
                let is_stylus = self.gestures.get(&d.device).is_some_and(|g| g.is_stylus);
                (d.device, Activity::new(is_stylus, false))
            })
            .collect()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.windows.is_empty() && self.gestures.is_empty()
    }
}

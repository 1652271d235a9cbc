// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The registry: per-display window lists, display transforms, and geometric queries.

use alloc::vec::Vec;

use hashbrown::{HashMap, HashSet};
use kurbo::{Affine, Point};

use crate::types::{DisplayId, Token, WindowDescriptor, WindowFlags};

/// Summary of a [`WindowRegistry::update_windows`] call.
#[derive(Clone, Debug, Default)]
pub struct WindowsUpdate {
    /// Descriptors that were present before the update and are gone now.
    pub removed: Vec<WindowDescriptor>,
    /// Tokens that were not present before the update.
    pub added: Vec<Token>,
}

#[derive(Clone, Debug, Default)]
struct DisplayWindows {
    /// Topmost first.
    windows: Vec<WindowDescriptor>,
    by_token: HashMap<Token, usize>,
}

/// Per-display window snapshots.
///
/// Each display owns an ordered, immutable-per-update list. Lookups by token are `O(1)`;
/// geometric queries walk the list front to back, which is the z-order.
#[derive(Clone, Debug, Default)]
pub struct WindowRegistry {
    displays: HashMap<DisplayId, DisplayWindows>,
    display_transforms: HashMap<DisplayId, Affine>,
}

impl WindowRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the window list of `display`.
    ///
    /// `windows` is ordered topmost first. Every descriptor is re-tagged with `display`.
    ///
    /// # Panics
    ///
    /// Panics if `windows` contains the same token more than once.
    pub fn update_windows(
        &mut self,
        display: DisplayId,
        mut windows: Vec<WindowDescriptor>,
    ) -> WindowsUpdate {
        let mut by_token = HashMap::with_capacity(windows.len());
        for (idx, window) in windows.iter_mut().enumerate() {
            window.display_id = display;
            if by_token.insert(window.token, idx).is_some() {
                panic!(
                    "window list for display {:?} contains token {:?} ('{}') more than once",
                    display, window.token, window.name
                );
            }
        }

        let previous = self.displays.remove(&display).unwrap_or_default();
        let mut update = WindowsUpdate::default();
        for old in previous.windows {
            if !by_token.contains_key(&old.token) {
                update.removed.push(old);
            }
        }
        for window in &windows {
            if !previous.by_token.contains_key(&window.token) {
                update.added.push(window.token);
            }
        }

        if !windows.is_empty() {
            self.displays
                .insert(display, DisplayWindows { windows, by_token });
        }
        update
    }

    /// Forget every window of `display`, returning the removed descriptors.
    pub fn remove_display(&mut self, display: DisplayId) -> Vec<WindowDescriptor> {
        self.display_transforms.remove(&display);
        self.displays
            .remove(&display)
            .map(|d| d.windows)
            .unwrap_or_default()
    }

    /// Set the transform from device coordinates into the display's logical space.
    pub fn set_display_transform(&mut self, display: DisplayId, transform: Affine) {
        self.display_transforms.insert(display, transform);
    }

    /// Transform from device coordinates into the display's logical space.
    pub fn display_transform(&self, display: DisplayId) -> Affine {
        self.display_transforms
            .get(&display)
            .copied()
            .unwrap_or(Affine::IDENTITY)
    }

    /// Map a device-space point into the display's logical space.
    pub fn to_display_space(&self, display: DisplayId, pt: Point) -> Point {
        self.display_transform(display) * pt
    }

    /// Windows of `display`, topmost first.
    pub fn windows(&self, display: DisplayId) -> &[WindowDescriptor] {
        self.displays
            .get(&display)
            .map(|d| d.windows.as_slice())
            .unwrap_or(&[])
    }

    /// Displays that currently have at least one window.
    pub fn displays(&self) -> impl Iterator<Item = DisplayId> + '_ {
        self.displays.keys().copied()
    }

    /// Find a window by token on a specific display.
    pub fn find_on(&self, display: DisplayId, token: Token) -> Option<&WindowDescriptor> {
        let d = self.displays.get(&display)?;
        d.by_token.get(&token).map(|&idx| &d.windows[idx])
    }

    /// Find a window by token on any display.
    pub fn find(&self, token: Token) -> Option<&WindowDescriptor> {
        self.displays
            .values()
            .find_map(|d| d.by_token.get(&token).map(|&idx| &d.windows[idx]))
    }

    /// Z-order rank of a window on its display; `0` is topmost.
    pub fn z_rank(&self, display: DisplayId, token: Token) -> Option<usize> {
        self.displays.get(&display)?.by_token.get(&token).copied()
    }

    /// Topmost non-spy window whose touchable region contains `pt` (logical display space).
    ///
    /// Windows that cannot receive input (paused, no channel, dropping input) are still
    /// returned: they occlude whatever is below them. Callers decide whether to deliver.
    pub fn hit_test(
        &self,
        display: DisplayId,
        pt: Point,
        is_stylus: bool,
    ) -> Option<&WindowDescriptor> {
        self.windows(display)
            .iter()
            .find(|w| !w.is_spy() && w.accepts_touch_at(pt, is_stylus))
    }

    /// Spy windows whose touchable region contains `pt`, topmost first.
    pub fn spy_windows_at(
        &self,
        display: DisplayId,
        pt: Point,
        is_stylus: bool,
    ) -> impl Iterator<Item = &WindowDescriptor> + '_ {
        self.windows(display)
            .iter()
            .filter(move |w| w.is_spy() && w.accepts_touch_at(pt, is_stylus))
    }

    /// Topmost visible wallpaper window of `display`, other than `excluding`.
    pub fn wallpaper(&self, display: DisplayId, excluding: Token) -> Option<&WindowDescriptor> {
        self.windows(display).iter().find(|w| {
            w.token != excluding && w.is_wallpaper() && w.flags.contains(WindowFlags::VISIBLE)
        })
    }

    /// Windows of `display` that watch for touches outside of them, topmost first.
    pub fn outside_watchers(&self, display: DisplayId) -> impl Iterator<Item = &WindowDescriptor> + '_ {
        self.windows(display)
            .iter()
            .filter(|w| w.flags.contains(WindowFlags::WATCH_OUTSIDE_TOUCH))
    }

    /// Tokens of every window on every display.
    pub fn tokens(&self) -> HashSet<Token> {
        self.displays
            .values()
            .flat_map(|d| d.windows.iter().map(|w| w.token))
            .collect()
    }
}

// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Public types for the registry: identities, ownership, flags, and window descriptors.

use alloc::string::String;
use core::time::Duration;

use kurbo::{Affine, Point, Rect};

/// Opaque identity shared by a window and its input channel.
///
/// A dispatcher keys connections by the same token, so a window descriptor and the
/// connection that receives its events are paired without any owning reference.
/// Headless receivers (monitors) use tokens that never appear in a window list.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(pub u64);

/// Identifier of a logical display.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DisplayId(pub i32);

impl DisplayId {
    /// The default (built-in) display.
    pub const DEFAULT: Self = Self(0);
}

/// Identifier of the process that owns a window.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct ProcessId(pub i32);

/// Identifier of the user that owns a window.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct UserId(pub i32);

/// Process and user identity of a window's owner.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct Owner {
    /// Owning process.
    pub pid: ProcessId,
    /// Owning user.
    pub uid: UserId,
}

impl Owner {
    /// Build an owner from raw process and user ids.
    pub const fn new(pid: i32, uid: i32) -> Self {
        Self {
            pid: ProcessId(pid),
            uid: UserId(uid),
        }
    }
}

bitflags::bitflags! {
    /// Input-related window properties.
    ///
    /// Roles (spy, wallpaper) are capabilities on the descriptor rather than separate types;
    /// routing code switches on them explicitly.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct WindowFlags: u32 {
        /// Window is visible. Invisible windows are never hit and cannot take focus.
        const VISIBLE                     = 1 << 0;
        /// Window may receive key focus.
        const FOCUSABLE                   = 1 << 1;
        /// Window is skipped by hit testing (unless it intercepts stylus and the pointer is a stylus).
        const NOT_TOUCHABLE               = 1 << 2;
        /// Window receives a parallel copy of touches under it without being a foreground target.
        const SPY                         = 1 << 3;
        /// An in-progress gesture may slip out of this window into the one under the pointer.
        const SLIPPERY                    = 1 << 4;
        /// Window wants a single `ACTION_OUTSIDE` when a gesture starts in another window.
        const WATCH_OUTSIDE_TOUCH         = 1 << 5;
        /// Pointers of one gesture may not be split between this window and another.
        const PREVENT_SPLITTING           = 1 << 6;
        /// Window is a trusted system overlay.
        const TRUSTED_OVERLAY             = 1 << 7;
        /// Window has no input channel; it can be hit but never receives events.
        const NO_INPUT_CHANNEL            = 1 << 8;
        /// Window's application is paused; it can be hit but never receives events.
        const PAUSED                      = 1 << 9;
        /// All input aimed at this window is dropped.
        const DROP_INPUT                  = 1 << 10;
        /// Window is a wallpaper.
        const IS_WALLPAPER                = 1 << 11;
        /// Touches delivered to this window are duplicated to the topmost wallpaper.
        const DUPLICATE_TOUCH_TO_WALLPAPER = 1 << 12;
        /// Window accepts stylus pointers even when flagged [`Self::NOT_TOUCHABLE`].
        const INTERCEPTS_STYLUS           = 1 << 13;
        /// Touches are rejected by this window while any stylus is active on its display.
        const GLOBAL_STYLUS_BLOCKS_TOUCH  = 1 << 14;
    }
}

impl Default for WindowFlags {
    fn default() -> Self {
        Self::VISIBLE | Self::FOCUSABLE
    }
}

/// Immutable description of one window as published by the window manager.
#[derive(Clone, Debug, PartialEq)]
pub struct WindowDescriptor {
    /// Identity of the window and of its input channel.
    pub token: Token,
    /// Human-readable name, for logs.
    pub name: String,
    /// Display that shows this window.
    pub display_id: DisplayId,
    /// Window frame in logical display space.
    pub frame: Rect,
    /// Touchable region in logical display space; the frame when `None`.
    pub touchable_region: Option<Rect>,
    /// Transform from logical display space into window space.
    pub transform: Affine,
    /// Input flags.
    pub flags: WindowFlags,
    /// Owning process and user.
    pub owner: Owner,
    /// Acknowledgment timeout for this window's connection; the dispatcher default when `None`.
    pub dispatch_timeout: Option<Duration>,
    /// Window that focus is forwarded to when this window is granted focus.
    pub focus_transfer_target: Option<Token>,
}

impl WindowDescriptor {
    /// Create a visible, focusable window whose transform maps the frame origin to `(0, 0)`.
    pub fn new(token: Token, name: impl Into<String>, display_id: DisplayId, frame: Rect) -> Self {
        Self {
            token,
            name: name.into(),
            display_id,
            frame,
            touchable_region: None,
            transform: Affine::translate((-frame.x0, -frame.y0)),
            flags: WindowFlags::default(),
            owner: Owner::default(),
            dispatch_timeout: None,
            focus_transfer_target: None,
        }
    }

    /// Replace the flags.
    #[must_use]
    pub fn with_flags(mut self, flags: WindowFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Add flags to the current set.
    #[must_use]
    pub fn add_flags(mut self, flags: WindowFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Set the owner.
    #[must_use]
    pub fn with_owner(mut self, owner: Owner) -> Self {
        self.owner = owner;
        self
    }

    /// Set the display → window transform.
    #[must_use]
    pub fn with_transform(mut self, transform: Affine) -> Self {
        self.transform = transform;
        self
    }

    /// Restrict touches to a region smaller than the frame.
    #[must_use]
    pub fn with_touchable_region(mut self, region: Rect) -> Self {
        self.touchable_region = Some(region);
        self
    }

    /// Override the connection's acknowledgment timeout.
    #[must_use]
    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = Some(timeout);
        self
    }

    /// Forward focus to another window when this one is focused.
    #[must_use]
    pub fn with_focus_transfer_target(mut self, target: Token) -> Self {
        self.focus_transfer_target = Some(target);
        self
    }

    /// Region that accepts touches, in logical display space.
    pub fn touchable_region(&self) -> Rect {
        self.touchable_region.unwrap_or(self.frame)
    }

    /// Returns `true` if a pointer at `pt` (logical display space) would hit this window.
    ///
    /// Invisible windows never accept touches. `NOT_TOUCHABLE` windows only accept stylus
    /// pointers, and only when they intercept stylus input.
    pub fn accepts_touch_at(&self, pt: Point, is_stylus: bool) -> bool {
        if !self.flags.contains(WindowFlags::VISIBLE) {
            return false;
        }
        let intercepts = is_stylus && self.flags.contains(WindowFlags::INTERCEPTS_STYLUS);
        if self.flags.contains(WindowFlags::NOT_TOUCHABLE) && !intercepts {
            return false;
        }
        self.touchable_region().contains(pt)
    }

    /// Returns `true` if events aimed at this window may actually be delivered.
    pub fn receives_input(&self) -> bool {
        !self
            .flags
            .intersects(WindowFlags::NO_INPUT_CHANNEL | WindowFlags::PAUSED | WindowFlags::DROP_INPUT)
    }

    /// Returns `true` for spy windows.
    pub fn is_spy(&self) -> bool {
        self.flags.contains(WindowFlags::SPY)
    }

    /// Returns `true` for wallpaper windows.
    pub fn is_wallpaper(&self) -> bool {
        self.flags.contains(WindowFlags::IS_WALLPAPER)
    }

    /// Returns `true` if pointers of a gesture may be split between this window and others.
    pub fn supports_split_touch(&self) -> bool {
        !self.flags.contains(WindowFlags::PREVENT_SPLITTING)
    }

    /// Map a point in logical display space into window space.
    pub fn to_window_space(&self, pt: Point) -> Point {
        self.transform * pt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(flags: WindowFlags) -> WindowDescriptor {
        WindowDescriptor::new(
            Token(7),
            "w",
            DisplayId::DEFAULT,
            Rect::new(10.0, 20.0, 110.0, 120.0),
        )
        .with_flags(flags)
    }

    #[test]
    fn default_transform_maps_frame_origin_to_zero() {
        let w = window(WindowFlags::default());
        assert_eq!(w.to_window_space(Point::new(10.0, 20.0)), Point::ZERO);
        assert_eq!(w.to_window_space(Point::new(60.0, 70.0)), Point::new(50.0, 50.0));
    }

    #[test]
    fn touchable_region_narrows_the_frame() {
        let w = window(WindowFlags::default()).with_touchable_region(Rect::new(10.0, 20.0, 30.0, 40.0));
        assert!(w.accepts_touch_at(Point::new(15.0, 25.0), false));
        assert!(!w.accepts_touch_at(Point::new(50.0, 50.0), false));
    }

    #[test]
    fn invisible_windows_never_accept_touch() {
        let w = window(WindowFlags::FOCUSABLE);
        assert!(!w.accepts_touch_at(Point::new(50.0, 50.0), false));
        assert!(!w.accepts_touch_at(Point::new(50.0, 50.0), true));
    }

    #[test]
    fn not_touchable_windows_only_accept_intercepted_stylus() {
        let plain = window(WindowFlags::VISIBLE | WindowFlags::NOT_TOUCHABLE);
        assert!(!plain.accepts_touch_at(Point::new(50.0, 50.0), true));

        let interceptor = window(
            WindowFlags::VISIBLE | WindowFlags::NOT_TOUCHABLE | WindowFlags::INTERCEPTS_STYLUS,
        );
        assert!(interceptor.accepts_touch_at(Point::new(50.0, 50.0), true));
        assert!(!interceptor.accepts_touch_at(Point::new(50.0, 50.0), false));
    }

    #[test]
    fn paused_and_channel_less_windows_do_not_receive_input() {
        assert!(window(WindowFlags::default()).receives_input());
        assert!(!window(WindowFlags::VISIBLE | WindowFlags::PAUSED).receives_input());
        assert!(!window(WindowFlags::VISIBLE | WindowFlags::NO_INPUT_CHANNEL).receives_input());
        assert!(!window(WindowFlags::VISIBLE | WindowFlags::DROP_INPUT).receives_input());
    }
}

// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-target delivery flags and dispatch modes.

use crate::event::{MotionAction, MotionEvent, MotionFlags};

bitflags::bitflags! {
    /// How an event is adjusted for one particular receiver.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct TargetFlags: u32 {
        /// The receiver is the foreground window of the gesture.
        const FOREGROUND                   = 1 << 0;
        /// The receiver only sees its own subset of the gesture's pointers.
        const SPLIT                        = 1 << 1;
        /// The receiver is reported as fully obscured.
        const WINDOW_IS_OBSCURED           = 1 << 2;
        /// The receiver is reported as partially obscured.
        const WINDOW_IS_PARTIALLY_OBSCURED = 1 << 3;
        /// Pointer coordinates are zeroed before delivery.
        const ZERO_COORDS                  = 1 << 4;
        /// Delivering the event must not move focus.
        const NO_FOCUS_CHANGE              = 1 << 5;
    }
}

impl TargetFlags {
    /// Flags carried by wallpaper copies of a gesture.
    pub const WALLPAPER: Self = Self::WINDOW_IS_OBSCURED.union(Self::WINDOW_IS_PARTIALLY_OBSCURED);

    /// Motion flags implied by these target flags.
    pub fn motion_flags(self) -> MotionFlags {
        let mut flags = MotionFlags::empty();
        if self.contains(Self::WINDOW_IS_OBSCURED) {
            flags |= MotionFlags::WINDOW_IS_OBSCURED;
        }
        if self.contains(Self::WINDOW_IS_PARTIALLY_OBSCURED) {
            flags |= MotionFlags::WINDOW_IS_PARTIALLY_OBSCURED;
        }
        if self.contains(Self::NO_FOCUS_CHANGE) {
            flags |= MotionFlags::NO_FOCUS_CHANGE;
        }
        flags
    }
}

/// How the source event is transmuted for a receiver.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum DispatchMode {
    /// Deliver the event unchanged.
    #[default]
    AsIs,
    /// Deliver as `Outside`.
    Outside,
    /// Deliver as `HoverEnter`.
    HoverEnter,
    /// Deliver as `HoverExit`.
    HoverExit,
    /// The gesture slipped out of the receiver: deliver as a canceled `Cancel`.
    SlipperyExit,
    /// The gesture slipped into the receiver: deliver as `Down`.
    SlipperyEnter,
}

impl DispatchMode {
    /// Rewrite `event` for this mode.
    pub(crate) fn apply(self, event: &mut MotionEvent) {
        match self {
            Self::AsIs => {}
            Self::Outside => event.action = MotionAction::Outside,
            Self::HoverEnter => event.action = MotionAction::HoverEnter,
            Self::HoverExit => event.action = MotionAction::HoverExit,
            Self::SlipperyExit => {
                event.action = MotionAction::Cancel;
                event.flags |= MotionFlags::CANCELED;
            }
            Self::SlipperyEnter => {
                event.action = MotionAction::Down;
                event.down_time = event.event_time;
            }
        }
    }
}

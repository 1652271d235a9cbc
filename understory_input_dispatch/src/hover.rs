// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Hover bookkeeping: which receivers a hovering device is currently inside.
//!
//! A device hovers at most one foreground window at a time, plus any spies under it.
//! Moving to a new target set is expressed as exits from receivers that are no longer
//! hovered, then enters into newly hovered ones, then the real sample to the whole set.

use kurbo::Affine;
use smallvec::SmallVec;
use understory_window_registry::Token;

use crate::event::MotionEvent;
use crate::touch_state::TouchRole;

#[derive(Copy, Clone, Debug, PartialEq)]
pub(crate) struct HoveredWindow {
    pub(crate) token: Token,
    pub(crate) role: TouchRole,
    pub(crate) transform: Affine,
}

/// Hover state of one device on one display.
#[derive(Clone, Debug)]
pub(crate) struct HoverState {
    pub(crate) is_stylus: bool,
    pub(crate) windows: SmallVec<[HoveredWindow; 2]>,
    /// Last hover sample, in display space.
    pub(crate) last: MotionEvent,
}

impl HoverState {
    pub(crate) fn foreground(&self) -> Option<Token> {
        self.windows
            .iter()
            .find(|w| w.role == TouchRole::Foreground)
            .map(|w| w.token)
    }

    pub(crate) fn contains(&self, token: Token) -> bool {
        self.windows.iter().any(|w| w.token == token)
    }

    pub(crate) fn remove(&mut self, token: Token) -> Option<HoveredWindow> {
        let idx = self.windows.iter().position(|w| w.token == token)?;
        Some(self.windows.remove(idx))
    }
}

/// Transitions from one hovered set to another.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct HoverTransition {
    pub(crate) exited: SmallVec<[HoveredWindow; 2]>,
    pub(crate) entered: SmallVec<[HoveredWindow; 2]>,
}

/// Compute exits (in old order) and enters (in new order) between two hovered sets.
pub(crate) fn transition(old: &[HoveredWindow], new: &[HoveredWindow]) -> HoverTransition {
    let exited = old
        .iter()
        .filter(|o| !new.iter().any(|n| n.token == o.token))
        .copied()
        .collect();
    let entered = new
        .iter()
        .filter(|n| !old.iter().any(|o| o.token == n.token))
        .copied()
        .collect();
    HoverTransition { exited, entered }
}

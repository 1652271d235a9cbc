// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Key focus resolution.
//!
//! Focus is requested per display by token. A request is honored only while the requested
//! window is focusable; otherwise it is remembered and re-evaluated on every window update,
//! so a window that becomes focusable later is granted focus without a second request.
//! A focused window may forward focus along its `focus_transfer_target` chain.

use core::time::Duration;

use hashbrown::{HashMap, HashSet};
use understory_window_registry::{DisplayId, Token, WindowDescriptor, WindowFlags};

/// Whether a window can take focus.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Focusability {
    /// The window can be focused.
    Ok,
    /// No window with this token exists on the display.
    #[default]
    NoWindow,
    /// The window is not focusable.
    NotFocusable,
    /// The window is not visible.
    NotVisible,
}

/// A change of the focused window on one display.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FocusChange {
    /// Display whose focus changed.
    pub display: DisplayId,
    /// Previously focused window.
    pub old: Option<Token>,
    /// Newly focused window.
    pub new: Option<Token>,
    /// Why focus changed.
    pub reason: String,
}

/// The application that owns focus on a display, used for no-focused-window supervision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FocusedApplication {
    /// Application name, for logs and policy.
    pub name: String,
    /// How long keys may wait for the application to show a focused window.
    pub dispatch_timeout: Option<Duration>,
}

impl FocusedApplication {
    /// Create an application record without a timeout override.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dispatch_timeout: None,
        }
    }

    /// Override the no-focused-window timeout.
    #[must_use]
    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = Some(timeout);
        self
    }
}

/// Focusability of `token` among `windows`.
pub(crate) fn focusability(token: Token, windows: &[WindowDescriptor]) -> Focusability {
    let Some(window) = windows.iter().find(|w| w.token == token) else {
        return Focusability::NoWindow;
    };
    if !window.flags.contains(WindowFlags::FOCUSABLE) {
        Focusability::NotFocusable
    } else if !window.flags.contains(WindowFlags::VISIBLE) {
        Focusability::NotVisible
    } else {
        Focusability::Ok
    }
}

/// Resolve a request, following transfer targets until a cycle or a non-focusable hop.
pub(crate) fn resolve(requested: Token, windows: &[WindowDescriptor]) -> Result<Token, Focusability> {
    match focusability(requested, windows) {
        Focusability::Ok => {}
        other => return Err(other),
    }
    let mut reached = HashSet::new();
    let mut current = requested;
    reached.insert(current);
    while let Some(next) = windows
        .iter()
        .find(|w| w.token == current)
        .and_then(|w| w.focus_transfer_target)
    {
        if !reached.insert(next) || focusability(next, windows) != Focusability::Ok {
            break;
        }
        current = next;
    }
    Ok(current)
}

#[derive(Debug, Default)]
pub(crate) struct FocusResolver {
    requests: HashMap<DisplayId, Token>,
    last_result: HashMap<DisplayId, Focusability>,
    focused: HashMap<DisplayId, Token>,
}

impl FocusResolver {
    pub(crate) fn focused(&self, display: DisplayId) -> Option<Token> {
        self.focused.get(&display).copied()
    }

    /// Display on which `token` currently holds focus.
    pub(crate) fn display_of(&self, token: Token) -> Option<DisplayId> {
        self.focused
            .iter()
            .find(|(_, t)| **t == token)
            .map(|(d, _)| *d)
    }

    pub(crate) fn last_result(&self, display: DisplayId) -> Option<Focusability> {
        self.last_result.get(&display).copied()
    }

    /// Record a focus request for `display`; `None` clears focus.
    pub(crate) fn request(
        &mut self,
        display: DisplayId,
        token: Option<Token>,
        windows: &[WindowDescriptor],
    ) -> Option<FocusChange> {
        let Some(token) = token else {
            self.requests.remove(&display);
            self.last_result.remove(&display);
            return self.update(display, None, "focus cleared");
        };
        self.requests.insert(display, token);
        if self.focused(display) == Some(token) {
            self.last_result.insert(display, Focusability::Ok);
            return None;
        }
        match resolve(token, windows) {
            Ok(resolved) => {
                self.last_result.insert(display, Focusability::Ok);
                self.update(display, Some(resolved), "focus requested")
            }
            Err(result) => {
                self.last_result.insert(display, result);
                self.update(display, None, &format!("waiting for window: {result:?}"))
            }
        }
    }

    /// Re-evaluate the pending request of `display` against a new window list.
    pub(crate) fn windows_changed(
        &mut self,
        display: DisplayId,
        windows: &[WindowDescriptor],
    ) -> Option<FocusChange> {
        let Some(&token) = self.requests.get(&display) else {
            return self.update(display, None, "no focus request");
        };
        match resolve(token, windows) {
            Ok(resolved) => {
                let previous = self.last_result.insert(display, Focusability::Ok);
                self.update(
                    display,
                    Some(resolved),
                    &format!("window became focusable, previously {previous:?}"),
                )
            }
            Err(result) => {
                self.last_result.insert(display, result);
                self.update(display, None, &format!("{result:?}"))
            }
        }
    }

    fn update(
        &mut self,
        display: DisplayId,
        new: Option<Token>,
        reason: &str,
    ) -> Option<FocusChange> {
        let old = self.focused(display);
        if old == new {
            return None;
        }
        match new {
            Some(token) => self.focused.insert(display, token),
            None => self.focused.remove(&display),
        };
        Some(FocusChange {
            display,
            old,
            new,
            reason: reason.to_owned(),
        })
    }
}

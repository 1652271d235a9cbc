// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Hooks for the policy and telemetry collaborators.

use understory_window_registry::{DisplayId, ProcessId, Token};

use crate::connection::DispatchEntry;
use crate::focus::{FocusChange, FocusedApplication};

/// Receives decisions the dispatcher leaves to its embedder.
///
/// Every method is called on the dispatch thread, synchronously with the state change that
/// caused it. Implementations must not block.
pub trait DispatchPolicy {
    /// A connection failed to acknowledge an entry in time.
    ///
    /// Called once per unresponsive episode. `pid` is the owning process when known.
    fn notify_window_unresponsive(&mut self, token: Token, pid: Option<ProcessId>, reason: &str);

    /// A previously unresponsive connection drained its backlog or went away.
    ///
    /// `pid` is `None` when the window is no longer known.
    fn notify_window_responsive(&mut self, token: Token, pid: Option<ProcessId>);

    /// Keys waited too long for `application` to show a focused window on `display`.
    fn notify_no_focused_window_anr(&mut self, display: DisplayId, application: &FocusedApplication);

    /// A connection's transport failed and the connection was removed.
    fn notify_input_channel_broken(&mut self, token: Token) {
        let _ = token;
    }

    /// A gesture started in a window that does not hold focus.
    fn on_pointer_down_outside_focus(&mut self, display: DisplayId, token: Token) {
        let _ = (display, token);
    }

    /// The focused window of a display changed.
    fn notify_focus_changed(&mut self, change: &FocusChange) {
        let _ = change;
    }
}

/// Observes every entry as it is transmitted.
pub trait DispatchTracer: Send {
    /// `entry` was just handed to the transport of `token`.
    fn trace_dispatch(&mut self, token: Token, entry: &DispatchEntry);
}

/// A policy that ignores every notification.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopPolicy;

impl DispatchPolicy for NoopPolicy {
    fn notify_window_unresponsive(&mut self, _: Token, _: Option<ProcessId>, _: &str) {}

    fn notify_window_responsive(&mut self, _: Token, _: Option<ProcessId>) {}

    fn notify_no_focused_window_anr(&mut self, _: DisplayId, _: &FocusedApplication) {}
}

// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Dispatcher configuration.

use core::time::Duration;

/// Tunables for a [`Dispatcher`](crate::Dispatcher).
///
/// All fields have sensible defaults; use the `with_*` methods to override them.
///
/// ```
/// use std::time::Duration;
/// use understory_input_dispatch::DispatcherConfig;
///
/// let config = DispatcherConfig::default()
///     .with_default_dispatch_timeout(Duration::from_secs(2))
///     .with_multi_device_same_window(true);
/// assert_eq!(config.key_wait_timeout, Duration::from_millis(500));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DispatcherConfig {
    /// Acknowledgment timeout for connections that do not override it.
    pub default_dispatch_timeout: Duration,
    /// How long a key may wait for the focused window's in-flight motion to drain.
    pub key_wait_timeout: Duration,
    /// Events older than this on arrival are dropped.
    pub stale_event_timeout: Duration,
    /// Deliver streams from several devices to the same window in parallel instead of
    /// arbitrating between them.
    pub multi_device_same_window: bool,
    /// No-focused-window timeout for applications that do not provide one.
    pub default_no_focus_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            default_dispatch_timeout: Duration::from_secs(5),
            key_wait_timeout: Duration::from_millis(500),
            stale_event_timeout: Duration::from_secs(10),
            multi_device_same_window: false,
            default_no_focus_timeout: Duration::from_secs(5),
        }
    }
}

impl DispatcherConfig {
    /// Set the default acknowledgment timeout.
    #[must_use]
    pub fn with_default_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.default_dispatch_timeout = timeout;
        self
    }

    /// Set the bound on how long keys wait for in-flight motion.
    #[must_use]
    pub fn with_key_wait_timeout(mut self, timeout: Duration) -> Self {
        self.key_wait_timeout = timeout;
        self
    }

    /// Set the age past which arriving events are considered stale.
    #[must_use]
    pub fn with_stale_event_timeout(mut self, timeout: Duration) -> Self {
        self.stale_event_timeout = timeout;
        self
    }

    /// Enable or disable parallel multi-device delivery to the same window.
    #[must_use]
    pub fn with_multi_device_same_window(mut self, enabled: bool) -> Self {
        self.multi_device_same_window = enabled;
        self
    }

    /// Set the fallback no-focused-window timeout.
    #[must_use]
    pub fn with_default_no_focus_timeout(mut self, timeout: Duration) -> Self {
        self.default_no_focus_timeout = timeout;
        self
    }
}

// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=understory_input_dispatch --heading-base-level=0

//! Understory Input Dispatch: routes device input to window connections.
//!
//! ## Overview
//!
//! A [`Dispatcher`] sits between a device-event source and many receivers, each reached
//! through its own [`InputChannel`]. It resolves every touch, stylus, mouse and key event to
//! a set of receivers using the window snapshots of a
//! [`WindowRegistry`](understory_window_registry::WindowRegistry), and delivers one
//! [`DispatchEntry`] per receiver.
//!
//! Delivery is flow controlled: a connection has at most one entry in flight, and the next
//! entry is sent only after the receiver acknowledges the previous one with
//! [`Dispatcher::finish`]. An entry that is not acknowledged within the connection's timeout
//! makes the connection unresponsive; its gestures are canceled and the
//! [`DispatchPolicy`] is told once per episode.
//!
//! ## Touch routing
//!
//! - A gesture lands in the topmost touchable window under its first pointer. Spy windows
//!   under the pointer and monitors of the display get a parallel copy.
//! - Further pointers may land in other windows (splitting), unless a window involved
//!   prevents it. Each receiver only sees its own pointers.
//! - Slippery windows let a single-pointer gesture move into the window under it.
//! - Windows that duplicate touches to the wallpaper bring the topmost wallpaper along.
//! - Windows watching outside touches get one `Outside` per gesture.
//! - [`Dispatcher::pilfer_pointers`] and [`Dispatcher::transfer_touch_gesture`] move
//!   ownership of pointers between receivers, canceling the losers.
//!
//! When devices contend for a window, stylus beats touch and down beats hover. The latest
//! device wins among equals unless [`DispatcherConfig::multi_device_same_window`] is set.
//!
//! ## Keys
//!
//! Keys go to the focused window of their display. A key waits (bounded by
//! [`DispatcherConfig::key_wait_timeout`]) while motion to that window is unacknowledged, and
//! waits for a focused window to appear while the display has a focused application.
//!
//! ## Time
//!
//! The dispatcher never reads a clock: every operation takes `now`. Call
//! [`Dispatcher::process_timeouts`] at [`Dispatcher::next_wakeup`], or let a
//! [`DispatcherThread`] do both.
//!
//! ## Example
//!
//! ```
//! use std::sync::mpsc;
//! use std::time::Instant;
//!
//! use kurbo::{Point, Rect};
//! use understory_input_dispatch::{
//!     ChannelError, DeviceId, DispatchEntry, Dispatcher, DispatcherConfig, InputChannel,
//!     InputSource, MotionAction, MotionEvent, NoopPolicy, Pointer, ToolType,
//! };
//! use understory_window_registry::{DisplayId, Token, WindowDescriptor};
//!
//! struct Channel(mpsc::Sender<DispatchEntry>);
//!
//! impl InputChannel for Channel {
//!     fn send(&mut self, entry: &DispatchEntry) -> Result<(), ChannelError> {
//!         self.0.send(entry.clone()).map_err(|_| ChannelError::Closed)
//!     }
//! }
//!
//! let now = Instant::now();
//! let mut dispatcher = Dispatcher::new(DispatcherConfig::default(), NoopPolicy);
//! let (tx, rx) = mpsc::channel();
//! let window = Token(1);
//! dispatcher
//!     .register_window_connection(window, "app", Box::new(Channel(tx)), None)
//!     .unwrap();
//! dispatcher.update_windows(
//!     DisplayId::DEFAULT,
//!     vec![WindowDescriptor::new(window, "app", DisplayId::DEFAULT, Rect::new(0.0, 0.0, 200.0, 200.0))],
//!     now,
//! );
//!
//! let down = MotionEvent::new(
//!     DeviceId(1),
//!     InputSource::TOUCHSCREEN,
//!     DisplayId::DEFAULT,
//!     MotionAction::Down,
//!     now,
//!     [Pointer::new(0, ToolType::Finger, Point::new(50.0, 50.0))],
//! );
//! dispatcher.notify_motion(down, now);
//!
//! let entry = rx.try_recv().unwrap();
//! assert_eq!(entry.motion().unwrap().action, MotionAction::Down);
//! dispatcher.finish(window, entry.seq, now);
//! ```

mod arbitration;
mod config;
mod connection;
mod dispatcher;
mod error;
mod event;
mod focus;
mod hover;
mod injection;
mod policy;
mod supervisor;
mod target;
mod thread;
mod touch_state;

pub use config::DispatcherConfig;
pub use connection::{ConnectionKind, DispatchEntry, DispatchedEvent, InputChannel};
pub use dispatcher::Dispatcher;
pub use error::{ChannelError, DispatcherError, PilferError};
pub use event::{
    DeviceId, InputEvent, InputSource, KeyAction, KeyEvent, KeyFlags, MotionAction, MotionEvent,
    MotionFlags, Pointer, PointerId, PointerIds, PolicyFlags, ToolType,
};
pub use focus::{FocusChange, Focusability, FocusedApplication};
pub use injection::{InjectionResult, InjectionSync};
pub use policy::{DispatchPolicy, DispatchTracer, NoopPolicy};
pub use target::{DispatchMode, TargetFlags};
pub use thread::{AckSender, DispatcherThread};
pub use touch_state::{TouchRole, TouchedWindowInfo};

// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=understory_window_registry --heading-base-level=0

//! Understory Window Registry: per-display window snapshots for input routing.
//!
//! ## Overview
//!
//! The registry holds, for each display, an ordered list of [`WindowDescriptor`]s as published
//! by a window manager. The list order is the z-order: index `0` is the topmost window.
//! A list is never edited in place; [`WindowRegistry::update_windows`] replaces it wholesale and
//! reports which windows disappeared so that routing layers can cancel any state that still
//! refers to them.
//!
//! The registry does not route events. It answers geometric questions for a router:
//!
//! - [`WindowRegistry::hit_test`]: the topmost touchable, non-spy window under a point.
//! - [`WindowRegistry::spy_windows_at`]: spy windows under a point, topmost first.
//! - [`WindowRegistry::wallpaper`]: the topmost wallpaper window of a display.
//! - [`WindowRegistry::outside_watchers`]: windows that want `ACTION_OUTSIDE` notifications.
//!
//! ## Coordinate spaces
//!
//! Device coordinates are mapped into the display's logical space with the display transform
//! ([`WindowRegistry::set_display_transform`]). Window frames and touchable regions are
//! expressed in logical display space. Each window carries its own transform from display
//! space into window space, which a dispatcher applies to delivered pointer coordinates.
//!
//! ## Minimal example
//!
//! ```
//! use kurbo::{Point, Rect};
//! use understory_window_registry::{DisplayId, Token, WindowDescriptor, WindowRegistry};
//!
//! let display = DisplayId::DEFAULT;
//! let mut registry = WindowRegistry::new();
//! let update = registry.update_windows(
//!     display,
//!     vec![
//!         WindowDescriptor::new(Token(1), "top", display, Rect::new(0.0, 0.0, 100.0, 100.0)),
//!         WindowDescriptor::new(Token(2), "bottom", display, Rect::new(0.0, 0.0, 400.0, 400.0)),
//!     ],
//! );
//! assert!(update.removed.is_empty());
//!
//! let hit = registry.hit_test(display, Point::new(50.0, 50.0), false).unwrap();
//! assert_eq!(hit.token, Token(1));
//! let hit = registry.hit_test(display, Point::new(200.0, 200.0), false).unwrap();
//! assert_eq!(hit.token, Token(2));
//! ```
//!
//! ## Contract
//!
//! A window list must not contain the same [`Token`] twice. Supplying duplicates is a bug in
//! the publisher and [`WindowRegistry::update_windows`] panics rather than guessing which
//! entry is authoritative.
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

mod registry;
mod types;

pub use registry::{WindowRegistry, WindowsUpdate};
pub use types::{DisplayId, Owner, ProcessId, Token, UserId, WindowDescriptor, WindowFlags};

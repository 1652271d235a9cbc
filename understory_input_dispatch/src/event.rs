// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Normalized input events as produced by a device-event source.

use std::time::Instant;

use kurbo::{Affine, Point};
use smallvec::SmallVec;
use understory_window_registry::DisplayId;

/// Identifier of an input device.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub i32);

/// Identifier of one pointer within a gesture, in `0..=31`.
pub type PointerId = u8;

/// A set of [`PointerId`]s.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct PointerIds(u32);

impl PointerIds {
    /// Largest representable pointer id.
    pub const MAX_POINTER_ID: PointerId = 31;

    /// The empty set.
    pub const EMPTY: Self = Self(0);

    /// A set holding one pointer.
    pub fn single(id: PointerId) -> Self {
        let mut ids = Self::EMPTY;
        ids.insert(id);
        ids
    }

    /// Returns `true` if `id` is in the set.
    pub fn contains(self, id: PointerId) -> bool {
        id <= Self::MAX_POINTER_ID && self.0 & (1 << id) != 0
    }

    /// Add `id` to the set.
    ///
    /// # Panics
    ///
    /// Panics if `id` exceeds [`Self::MAX_POINTER_ID`].
    pub fn insert(&mut self, id: PointerId) {
        assert!(
            id <= Self::MAX_POINTER_ID,
            "pointer id {id} is out of range"
        );
        self.0 |= 1 << id;
    }

    /// Remove `id` from the set.
    pub fn remove(&mut self, id: PointerId) {
        if id <= Self::MAX_POINTER_ID {
            self.0 &= !(1 << id);
        }
    }

    /// Pointers in either set.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Pointers in both sets.
    #[must_use]
    pub fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Pointers in `self` but not in `other`.
    #[must_use]
    pub fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Returns `true` if the set is empty.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of pointers in the set.
    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Lowest pointer id in the set.
    pub fn first(self) -> Option<PointerId> {
        if self.0 == 0 {
            None
        } else {
            PointerId::try_from(self.0.trailing_zeros()).ok()
        }
    }

    /// Iterate pointer ids in ascending order.
    pub fn iter(self) -> impl Iterator<Item = PointerId> {
        (0..=Self::MAX_POINTER_ID).filter(move |&id| self.contains(id))
    }
}

impl core::fmt::Debug for PointerIds {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<PointerId> for PointerIds {
    fn from_iter<I: IntoIterator<Item = PointerId>>(iter: I) -> Self {
        let mut ids = Self::EMPTY;
        for id in iter {
            ids.insert(id);
        }
        ids
    }
}

/// Tool that produced a pointer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum ToolType {
    /// Unknown tool.
    #[default]
    Unknown,
    /// A finger on a touch screen.
    Finger,
    /// A stylus tip.
    Stylus,
    /// A stylus eraser.
    Eraser,
    /// A mouse or trackpad.
    Mouse,
    /// A palm, as classified by the device.
    Palm,
}

impl ToolType {
    /// Returns `true` for stylus tips and erasers.
    pub fn is_stylus(self) -> bool {
        matches!(self, Self::Stylus | Self::Eraser)
    }
}

bitflags::bitflags! {
    /// Device classes an event originates from.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct InputSource: u32 {
        /// Keyboard.
        const KEYBOARD    = 1 << 0;
        /// Direct touch screen.
        const TOUCHSCREEN = 1 << 1;
        /// Stylus digitizer.
        const STYLUS      = 1 << 2;
        /// Mouse or other indirect pointer.
        const MOUSE       = 1 << 3;
    }
}

bitflags::bitflags! {
    /// Flags carried by a motion event.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct MotionFlags: u32 {
        /// Another window is fully covering the receiver at the event location.
        const WINDOW_IS_OBSCURED           = 1 << 0;
        /// Another window is covering part of the receiver.
        const WINDOW_IS_PARTIALLY_OBSCURED = 1 << 1;
        /// The gesture was canceled rather than completed.
        const CANCELED                     = 1 << 2;
        /// Delivering this event must not move focus.
        const NO_FOCUS_CHANGE              = 1 << 3;
    }
}

bitflags::bitflags! {
    /// Flags carried by a key event.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct KeyFlags: u32 {
        /// The key press was canceled.
        const CANCELED = 1 << 0;
    }
}

bitflags::bitflags! {
    /// Flags attached by the event source.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct PolicyFlags: u32 {
        /// The event came from a trusted source.
        const TRUSTED  = 1 << 0;
        /// The event was injected rather than read from a device.
        const INJECTED = 1 << 1;
    }
}

/// Action of a motion event.
///
/// `PointerDown` and `PointerUp` carry the index (into [`MotionEvent::pointers`]) of the
/// pointer that changed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MotionAction {
    /// First pointer of a gesture went down.
    Down,
    /// Last pointer of a gesture went up.
    Up,
    /// Pointers moved.
    Move,
    /// The gesture was canceled.
    Cancel,
    /// A gesture started outside the receiving window.
    Outside,
    /// An additional pointer went down.
    PointerDown(usize),
    /// A non-final pointer went up.
    PointerUp(usize),
    /// A hovering pointer entered the receiver.
    HoverEnter,
    /// A hovering pointer moved.
    HoverMove,
    /// A hovering pointer left the receiver.
    HoverExit,
    /// A scroll wheel or axis moved.
    Scroll,
}

impl MotionAction {
    /// Returns `true` for the hover actions.
    pub fn is_hover(self) -> bool {
        matches!(self, Self::HoverEnter | Self::HoverMove | Self::HoverExit)
    }
}

/// One pointer sample.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Pointer {
    /// Pointer identity within the gesture.
    pub id: PointerId,
    /// Tool that produced the pointer.
    pub tool_type: ToolType,
    /// Position. Device space on input; window space once dispatched.
    pub position: Point,
}

impl Pointer {
    /// Create a pointer sample.
    pub fn new(id: PointerId, tool_type: ToolType, position: Point) -> Self {
        Self {
            id,
            tool_type,
            position,
        }
    }
}

/// A motion event.
#[derive(Clone, Debug, PartialEq)]
pub struct MotionEvent {
    /// Originating device.
    pub device_id: DeviceId,
    /// Originating device class.
    pub source: InputSource,
    /// Display the event belongs to.
    pub display_id: DisplayId,
    /// What happened.
    pub action: MotionAction,
    /// Event flags.
    pub flags: MotionFlags,
    /// Time the sample was taken.
    pub event_time: Instant,
    /// Time the gesture started.
    pub down_time: Instant,
    /// Pointers in this sample.
    pub pointers: SmallVec<[Pointer; 4]>,
    /// Flags from the event source.
    pub policy_flags: PolicyFlags,
}

impl MotionEvent {
    /// Create a trusted motion event whose gesture starts at `event_time`.
    pub fn new(
        device_id: DeviceId,
        source: InputSource,
        display_id: DisplayId,
        action: MotionAction,
        event_time: Instant,
        pointers: impl IntoIterator<Item = Pointer>,
    ) -> Self {
        Self {
            device_id,
            source,
            display_id,
            action,
            flags: MotionFlags::empty(),
            event_time,
            down_time: event_time,
            pointers: pointers.into_iter().collect(),
            policy_flags: PolicyFlags::TRUSTED,
        }
    }

    /// Set the gesture start time.
    #[must_use]
    pub fn with_down_time(mut self, down_time: Instant) -> Self {
        self.down_time = down_time;
        self
    }

    /// Set the event flags.
    #[must_use]
    pub fn with_flags(mut self, flags: MotionFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set the policy flags.
    #[must_use]
    pub fn with_policy_flags(mut self, flags: PolicyFlags) -> Self {
        self.policy_flags = flags;
        self
    }

    /// Ids of all pointers in the sample.
    pub fn pointer_ids(&self) -> PointerIds {
        self.pointers.iter().map(|p| p.id).collect()
    }

    /// The pointer with the given id.
    pub fn pointer(&self, id: PointerId) -> Option<&Pointer> {
        self.pointers.iter().find(|p| p.id == id)
    }

    /// The pointer the action refers to: the changed pointer for `PointerDown`/`PointerUp`,
    /// otherwise the first pointer.
    pub fn action_pointer(&self) -> Option<&Pointer> {
        match self.action {
            MotionAction::PointerDown(idx) | MotionAction::PointerUp(idx) => self.pointers.get(idx),
            _ => self.pointers.first(),
        }
    }

    /// Returns `true` if every pointer id fits a [`PointerIds`] set and appears once.
    pub fn has_valid_pointer_ids(&self) -> bool {
        let mut seen = PointerIds::EMPTY;
        for p in &self.pointers {
            if p.id > PointerIds::MAX_POINTER_ID || seen.contains(p.id) {
                return false;
            }
            seen.insert(p.id);
        }
        true
    }

    /// Returns `true` if the event comes from a stylus.
    pub fn is_stylus(&self) -> bool {
        self.source.contains(InputSource::STYLUS) || self.pointers.iter().any(|p| p.tool_type.is_stylus())
    }

    /// Returns `true` if the event was injected.
    pub fn is_injected(&self) -> bool {
        self.policy_flags.contains(PolicyFlags::INJECTED)
    }

    /// Restrict the event to the pointers in `ids`.
    ///
    /// Returns `None` when none of the event's pointers are in `ids`. `PointerDown` and
    /// `PointerUp` are rewritten from the subset's point of view: they become `Down`/`Up`
    /// when the changed pointer is the only one in the subset, keep their kind (with a
    /// re-based index) when others remain, and become `Move` when the changed pointer is
    /// not part of the subset.
    ///
    /// ```
    /// use std::time::Instant;
    /// use kurbo::Point;
    /// use understory_input_dispatch::{
    ///     DeviceId, InputSource, MotionAction, MotionEvent, Pointer, PointerIds, ToolType,
    /// };
    /// use understory_window_registry::DisplayId;
    ///
    /// let event = MotionEvent::new(
    ///     DeviceId(1),
    ///     InputSource::TOUCHSCREEN,
    ///     DisplayId::DEFAULT,
    ///     MotionAction::PointerDown(1),
    ///     Instant::now(),
    ///     [
    ///         Pointer::new(0, ToolType::Finger, Point::new(10.0, 10.0)),
    ///         Pointer::new(1, ToolType::Finger, Point::new(300.0, 10.0)),
    ///     ],
    /// );
    /// let first = event.split(PointerIds::single(0)).unwrap();
    /// assert_eq!(first.action, MotionAction::Move);
    /// let second = event.split(PointerIds::single(1)).unwrap();
    /// assert_eq!(second.action, MotionAction::Down);
    /// ```
    pub fn split(&self, ids: PointerIds) -> Option<Self> {
        let pointers: SmallVec<[Pointer; 4]> =
            self.pointers.iter().filter(|p| ids.contains(p.id)).copied().collect();
        if pointers.is_empty() {
            return None;
        }
        let action = match self.action {
            MotionAction::PointerDown(idx) | MotionAction::PointerUp(idx) => {
                let acting = self.pointers.get(idx).map(|p| p.id);
                match acting.and_then(|id| pointers.iter().position(|p| p.id == id)) {
                    None => MotionAction::Move,
                    Some(_) if pointers.len() == 1 => {
                        if matches!(self.action, MotionAction::PointerDown(_)) {
                            MotionAction::Down
                        } else {
                            MotionAction::Up
                        }
                    }
                    Some(new_idx) => {
                        if matches!(self.action, MotionAction::PointerDown(_)) {
                            MotionAction::PointerDown(new_idx)
                        } else {
                            MotionAction::PointerUp(new_idx)
                        }
                    }
                }
            }
            other => other,
        };
        Some(Self {
            action,
            pointers,
            ..self.clone()
        })
    }

    /// Apply `transform` to every pointer position.
    pub(crate) fn transform(&mut self, transform: Affine) {
        for p in &mut self.pointers {
            p.position = transform * p.position;
        }
    }
}

/// Action of a key event.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum KeyAction {
    /// Key pressed (or auto-repeated).
    Down,
    /// Key released.
    Up,
}

/// A key event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyEvent {
    /// Originating device.
    pub device_id: DeviceId,
    /// Display whose focused window receives the key.
    pub display_id: DisplayId,
    /// Pressed or released.
    pub action: KeyAction,
    /// Key code.
    pub key_code: u32,
    /// Auto-repeat count of a `Down`.
    pub repeat_count: u32,
    /// Event flags.
    pub flags: KeyFlags,
    /// Time the event happened.
    pub event_time: Instant,
    /// Time the key went down.
    pub down_time: Instant,
    /// Flags from the event source.
    pub policy_flags: PolicyFlags,
}

impl KeyEvent {
    /// Create a trusted key event whose key went down at `event_time`.
    pub fn new(
        device_id: DeviceId,
        display_id: DisplayId,
        action: KeyAction,
        key_code: u32,
        event_time: Instant,
    ) -> Self {
        Self {
            device_id,
            display_id,
            action,
            key_code,
            repeat_count: 0,
            flags: KeyFlags::empty(),
            event_time,
            down_time: event_time,
            policy_flags: PolicyFlags::TRUSTED,
        }
    }

    /// Set the time the key went down.
    #[must_use]
    pub fn with_down_time(mut self, down_time: Instant) -> Self {
        self.down_time = down_time;
        self
    }

    /// Set the repeat count.
    #[must_use]
    pub fn with_repeat_count(mut self, repeat_count: u32) -> Self {
        self.repeat_count = repeat_count;
        self
    }
}

/// Either kind of input event.
#[derive(Clone, Debug, PartialEq)]
pub enum InputEvent {
    /// Pointer motion.
    Motion(MotionEvent),
    /// Key press or release.
    Key(KeyEvent),
}

impl InputEvent {
    /// Time the event happened.
    pub fn event_time(&self) -> Instant {
        match self {
            Self::Motion(m) => m.event_time,
            Self::Key(k) => k.event_time,
        }
    }

    /// Display the event belongs to.
    pub fn display_id(&self) -> DisplayId {
        match self {
            Self::Motion(m) => m.display_id,
            Self::Key(k) => k.display_id,
        }
    }

    pub(crate) fn policy_flags_mut(&mut self) -> &mut PolicyFlags {
        match self {
            Self::Motion(m) => &mut m.policy_flags,
            Self::Key(k) => &mut k.policy_flags,
        }
    }
}

impl From<MotionEvent> for InputEvent {
    fn from(event: MotionEvent) -> Self {
        Self::Motion(event)
    }
}

impl From<KeyEvent> for InputEvent {
    fn from(event: KeyEvent) -> Self {
        Self::Key(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(action: MotionAction, ids: &[PointerId]) -> MotionEvent {
        MotionEvent::new(
            DeviceId(1),
            InputSource::TOUCHSCREEN,
            DisplayId::DEFAULT,
            action,
            Instant::now(),
            ids.iter()
                .map(|&id| Pointer::new(id, ToolType::Finger, Point::new(f64::from(id) * 10.0, 0.0))),
        )
    }

    #[test]
    fn pointer_ids_basic_set_operations() {
        let mut ids = PointerIds::EMPTY;
        ids.insert(3);
        ids.insert(0);
        assert_eq!(ids.len(), 2);
        assert_eq!(ids.first(), Some(0));
        assert_eq!(ids.iter().collect::<Vec<_>>(), vec![0, 3]);
        ids.remove(0);
        assert_eq!(ids, PointerIds::single(3));
        assert!(ids.intersection(PointerIds::single(0)).is_empty());
        assert!(!PointerIds::EMPTY.contains(40));
    }

    #[test]
    fn split_pointer_up_of_last_subset_pointer_becomes_up() {
        let event = touch(MotionAction::PointerUp(1), &[0, 1, 2]);
        let split = event.split([1].into_iter().collect()).unwrap();
        assert_eq!(split.action, MotionAction::Up);
        assert_eq!(split.pointer_ids(), PointerIds::single(1));
    }

    #[test]
    fn split_rebases_the_action_index() {
        let event = touch(MotionAction::PointerDown(2), &[0, 1, 2]);
        let split = event.split([1, 2].into_iter().collect()).unwrap();
        assert_eq!(split.action, MotionAction::PointerDown(1));
    }

    #[test]
    fn split_with_disjoint_subset_is_none() {
        let event = touch(MotionAction::Move, &[0, 1]);
        assert!(event.split(PointerIds::single(5)).is_none());
    }

    #[test]
    fn pointer_ids_must_be_in_range_and_unique() {
        assert!(touch(MotionAction::Down, &[0, 31]).has_valid_pointer_ids());
        assert!(!touch(MotionAction::Down, &[32]).has_valid_pointer_ids());
        assert!(!touch(MotionAction::Move, &[1, 1]).has_valid_pointer_ids());
    }

    #[test]
    fn stylus_detection_uses_tool_type() {
        let mut event = touch(MotionAction::Down, &[0]);
        assert!(!event.is_stylus());
        event.pointers[0].tool_type = ToolType::Eraser;
        assert!(event.is_stylus());
    }
}

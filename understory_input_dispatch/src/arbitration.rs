// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Multi-device arbitration for a single window.
//!
//! When two devices contend for the same window, the one with the stronger activity wins:
//! stylus down, then stylus hover, then touch down, then touch hover. A newcomer with a
//! weaker activity is blocked; an equal or stronger newcomer takes the window over and the
//! previous device's stream in that window is canceled.

use smallvec::SmallVec;

use crate::event::DeviceId;

/// What a device is doing in a window, ordered by priority.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) enum Activity {
    TouchHover,
    TouchDown,
    StylusHover,
    StylusDown,
}

impl Activity {
    pub(crate) fn new(is_stylus: bool, is_hover: bool) -> Self {
        match (is_stylus, is_hover) {
            (true, false) => Self::StylusDown,
            (true, true) => Self::StylusHover,
            (false, false) => Self::TouchDown,
            (false, true) => Self::TouchHover,
        }
    }

    pub(crate) fn is_hover(self) -> bool {
        matches!(self, Self::TouchHover | Self::StylusHover)
    }

    pub(crate) fn is_stylus(self) -> bool {
        matches!(self, Self::StylusHover | Self::StylusDown)
    }
}

/// Outcome of [`arbitrate`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Verdict {
    /// The newcomer may not use the window.
    Blocked { by: DeviceId },
    /// The newcomer may use the window after the listed devices are evicted from it.
    Allowed {
        evict: SmallVec<[(DeviceId, Activity); 2]>,
    },
}

/// Decide whether `device` may start `activity` in a window where `existing` devices are
/// already active.
///
/// Entries for `device` itself are ignored.
pub(crate) fn arbitrate(
    device: DeviceId,
    activity: Activity,
    existing: impl IntoIterator<Item = (DeviceId, Activity)>,
) -> Verdict {
    let mut evict = SmallVec::new();
    for (other, other_activity) in existing {
        if other == device {
            continue;
        }
        if activity < other_activity {
            return Verdict::Blocked { by: other };
        }
        evict.push((other, other_activity));
    }
    Verdict::Allowed { evict }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOUCH: DeviceId = DeviceId(1);
    const STYLUS: DeviceId = DeviceId(2);

    #[test]
    fn priority_order() {
        assert!(Activity::StylusDown > Activity::StylusHover);
        assert!(Activity::StylusHover > Activity::TouchDown);
        assert!(Activity::TouchDown > Activity::TouchHover);
    }

    #[test]
    fn touch_is_blocked_by_stylus_down() {
        let verdict = arbitrate(TOUCH, Activity::TouchDown, [(STYLUS, Activity::StylusDown)]);
        assert_eq!(verdict, Verdict::Blocked { by: STYLUS });
    }

    #[test]
    fn stylus_evicts_touch() {
        let verdict = arbitrate(STYLUS, Activity::StylusHover, [(TOUCH, Activity::TouchDown)]);
        let Verdict::Allowed { evict } = verdict else {
            panic!("stylus hover should win over touch");
        };
        assert_eq!(evict.as_slice(), &[(TOUCH, Activity::TouchDown)]);
    }

    #[test]
    fn latest_wins_among_equals() {
        let other = DeviceId(3);
        let verdict = arbitrate(TOUCH, Activity::TouchDown, [(other, Activity::TouchDown)]);
        assert!(matches!(verdict, Verdict::Allowed { ref evict } if evict.len() == 1));
    }

    #[test]
    fn own_activity_is_ignored() {
        let verdict = arbitrate(TOUCH, Activity::TouchHover, [(TOUCH, Activity::TouchDown)]);
        assert!(matches!(verdict, Verdict::Allowed { ref evict } if evict.is_empty()));
    }
}

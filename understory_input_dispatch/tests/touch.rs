// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tests for touch routing: splitting, slippery windows, spies, wallpapers, outside
//! watchers, pilfering, transfer and multi-device arbitration.

mod common;

use std::sync::Arc;
use std::time::Duration;

use kurbo::{Affine, Point};
use parking_lot::Mutex;
use understory_input_dispatch::{
    DispatchEntry, DispatchTracer, DispatcherConfig, MotionAction, MotionFlags, PilferError,
    PointerIds, TargetFlags, TouchRole,
};
use understory_window_registry::{Token, WindowFlags};

use common::{D, Harness, MOUSE, PolicyCall, STYLUS, TOUCH, window};

#[test]
fn single_touch_is_delivered_in_window_coordinates() {
    let mut h = Harness::new();
    h.set_windows(vec![window(1, 50.0, 50.0, 150.0, 150.0)]);

    h.motion(TOUCH, MotionAction::Down, &[(0, 60.0, 70.0)]);
    h.motion(TOUCH, MotionAction::Up, &[(0, 60.0, 70.0)]);

    let entries = h.consume_all(1);
    assert_eq!(entries.len(), 2, "expected DOWN and UP");
    let down = entries[0].motion().unwrap();
    assert_eq!(down.action, MotionAction::Down);
    assert_eq!(down.pointers[0].position, Point::new(10.0, 20.0));
    assert!(entries[0].target_flags.contains(TargetFlags::FOREGROUND));
    assert_eq!(entries[1].motion().unwrap().action, MotionAction::Up);
    assert!(h.dispatcher.touched_windows(D).is_empty(), "gesture should be over");
    assert!(
        h.calls()
            .contains(&PolicyCall::DownOutsideFocus(D, Token(1))),
        "policy should hear about a touch outside the focused window"
    );
}

#[test]
fn second_pointer_splits_into_the_window_under_it() {
    let mut h = Harness::new();
    h.set_windows(vec![
        window(1, 0.0, 0.0, 100.0, 100.0),
        window(2, 100.0, 0.0, 200.0, 100.0),
    ]);

    h.motion(TOUCH, MotionAction::Down, &[(0, 10.0, 10.0)]);
    h.motion(
        TOUCH,
        MotionAction::PointerDown(1),
        &[(0, 10.0, 10.0), (1, 150.0, 10.0)],
    );
    h.motion(
        TOUCH,
        MotionAction::PointerUp(1),
        &[(0, 10.0, 10.0), (1, 150.0, 10.0)],
    );
    h.motion(TOUCH, MotionAction::Up, &[(0, 10.0, 10.0)]);

    assert_eq!(
        h.actions(1),
        [
            MotionAction::Down,
            MotionAction::Move,
            MotionAction::Move,
            MotionAction::Up
        ]
    );
    let b = h.consume_all(2);
    let actions: Vec<_> = b.iter().map(|e| e.motion().unwrap().action).collect();
    assert_eq!(actions, [MotionAction::Down, MotionAction::Up]);
    let down = b[0].motion().unwrap();
    assert_eq!(down.pointers.len(), 1, "B only sees its own pointer");
    assert_eq!(down.pointers[0].id, 1);
    assert_eq!(down.pointers[0].position, Point::new(50.0, 10.0));
}

#[test]
fn prevent_splitting_keeps_the_new_pointer_out() {
    let mut h = Harness::new();
    h.set_windows(vec![
        window(1, 0.0, 0.0, 100.0, 100.0).add_flags(WindowFlags::PREVENT_SPLITTING),
        window(2, 100.0, 0.0, 200.0, 100.0),
    ]);

    h.motion(TOUCH, MotionAction::Down, &[(0, 10.0, 10.0)]);
    h.motion(
        TOUCH,
        MotionAction::PointerDown(1),
        &[(0, 10.0, 10.0), (1, 150.0, 10.0)],
    );

    assert_eq!(h.actions(1), [MotionAction::Down, MotionAction::Move]);
    assert!(h.actions(2).is_empty(), "B must not join the gesture");
    let touched = h.dispatcher.touched_windows(D);
    assert_eq!(touched.len(), 1);
    assert_eq!(touched[0].token, Token(1));
}

#[test]
fn outside_watcher_hears_once_per_gesture_with_zeroed_coordinates() {
    let mut h = Harness::new();
    h.set_windows(vec![
        window(3, 200.0, 0.0, 300.0, 100.0).add_flags(WindowFlags::WATCH_OUTSIDE_TOUCH),
        window(1, 0.0, 0.0, 100.0, 100.0),
    ]);

    h.motion(TOUCH, MotionAction::Down, &[(0, 10.0, 10.0)]);
    h.motion(TOUCH, MotionAction::Move, &[(0, 20.0, 10.0)]);
    h.motion(TOUCH, MotionAction::Up, &[(0, 20.0, 10.0)]);

    let entries = h.consume_all(3);
    assert_eq!(entries.len(), 1, "exactly one Outside");
    let outside = entries[0].motion().unwrap();
    assert_eq!(outside.action, MotionAction::Outside);
    assert_eq!(outside.pointers[0].position, Point::ZERO);
    assert!(entries[0].target_flags.contains(TargetFlags::ZERO_COORDS));
}

#[test]
fn outside_watcher_of_the_same_owner_keeps_coordinates() {
    let mut h = Harness::new();
    let a = window(1, 0.0, 0.0, 100.0, 100.0);
    let owner = a.owner;
    h.set_windows(vec![
        window(3, 200.0, 0.0, 300.0, 100.0)
            .add_flags(WindowFlags::WATCH_OUTSIDE_TOUCH)
            .with_owner(owner),
        a,
    ]);

    h.motion(TOUCH, MotionAction::Down, &[(0, 10.0, 10.0)]);

    let entries = h.consume_all(3);
    let outside = entries[0].motion().unwrap();
    assert_eq!(outside.pointers[0].position, Point::new(-190.0, 10.0));
}

#[test]
fn slippery_window_hands_the_gesture_over() {
    let mut h = Harness::new();
    h.set_windows(vec![
        window(1, 0.0, 0.0, 100.0, 100.0).add_flags(WindowFlags::SLIPPERY),
        window(2, 100.0, 0.0, 200.0, 100.0),
    ]);

    h.motion(TOUCH, MotionAction::Down, &[(0, 10.0, 10.0)]);
    h.motion(TOUCH, MotionAction::Move, &[(0, 150.0, 10.0)]);
    h.motion(TOUCH, MotionAction::Up, &[(0, 150.0, 10.0)]);

    let a = h.consume_all(1);
    let actions: Vec<_> = a.iter().map(|e| e.motion().unwrap().action).collect();
    assert_eq!(actions, [MotionAction::Down, MotionAction::Cancel]);
    assert!(a[1].motion().unwrap().flags.contains(MotionFlags::CANCELED));

    let b = h.consume_all(2);
    let actions: Vec<_> = b.iter().map(|e| e.motion().unwrap().action).collect();
    assert_eq!(actions, [MotionAction::Down, MotionAction::Up]);
    assert_eq!(b[0].motion().unwrap().pointers[0].position, Point::new(50.0, 10.0));
}

#[test]
fn spy_pilfers_the_pointers_it_holds() {
    let mut h = Harness::new();
    h.set_windows(vec![
        window(5, 0.0, 0.0, 100.0, 100.0).add_flags(WindowFlags::SPY),
        window(1, 0.0, 0.0, 100.0, 100.0),
        window(2, 100.0, 0.0, 200.0, 100.0),
    ]);

    h.motion(TOUCH, MotionAction::Down, &[(0, 10.0, 10.0)]);
    h.dispatcher.pilfer_pointers(Token(5), h.now).unwrap();
    h.motion(TOUCH, MotionAction::Move, &[(0, 20.0, 10.0)]);

    assert_eq!(h.actions(1), [MotionAction::Down, MotionAction::Cancel]);
    assert_eq!(h.actions(5), [MotionAction::Down, MotionAction::Move]);
    let touched = h.dispatcher.touched_windows(D);
    assert_eq!(touched.len(), 1);
    assert_eq!(touched[0].role, TouchRole::Spy);
    assert_eq!(touched[0].pilfering, PointerIds::single(0));
}

#[test]
fn pointer_down_after_a_pilfer_reaches_the_window_under_it() {
    let mut h = Harness::new();
    h.set_windows(vec![
        window(5, 0.0, 0.0, 100.0, 100.0).add_flags(WindowFlags::SPY),
        window(1, 0.0, 0.0, 100.0, 100.0),
        window(2, 100.0, 0.0, 200.0, 100.0),
    ]);

    h.motion(TOUCH, MotionAction::Down, &[(0, 10.0, 10.0)]);
    h.dispatcher.pilfer_pointers(Token(5), h.now).unwrap();
    h.motion(
        TOUCH,
        MotionAction::PointerDown(1),
        &[(0, 10.0, 10.0), (1, 150.0, 10.0)],
    );
    h.motion(TOUCH, MotionAction::Move, &[(0, 12.0, 10.0), (1, 160.0, 10.0)]);

    assert_eq!(h.actions(1), [MotionAction::Down, MotionAction::Cancel]);
    assert_eq!(
        h.actions(5),
        [MotionAction::Down, MotionAction::Move, MotionAction::Move]
    );
    let b = h.consume_all(2);
    let actions: Vec<_> = b.iter().map(|e| e.motion().unwrap().action).collect();
    assert_eq!(actions, [MotionAction::Down, MotionAction::Move]);
    let down = b[0].motion().unwrap();
    assert_eq!(down.pointers.len(), 1);
    assert_eq!(down.pointers[0].id, 1);
    assert_eq!(down.pointers[0].position, Point::new(50.0, 10.0));

    let touched = h.dispatcher.touched_windows(D);
    let spy = touched.iter().find(|w| w.token == Token(5)).unwrap();
    assert_eq!(spy.pilfering, PointerIds::single(0));
    let second = touched.iter().find(|w| w.token == Token(2)).unwrap();
    assert_eq!(second.role, TouchRole::Foreground);
}

#[test]
fn pilfer_without_pointers_is_refused() {
    let mut h = Harness::new();
    h.set_windows(vec![window(1, 0.0, 0.0, 100.0, 100.0)]);

    assert_eq!(
        h.dispatcher.pilfer_pointers(Token(1), h.now),
        Err(PilferError::NoActivePointers(Token(1)))
    );
}

#[test]
fn transfer_moves_the_gesture_without_moving_focus() {
    let mut h = Harness::new();
    h.set_windows(vec![
        window(1, 0.0, 0.0, 100.0, 100.0),
        window(2, 100.0, 0.0, 200.0, 100.0),
    ]);

    h.motion(TOUCH, MotionAction::Down, &[(0, 10.0, 10.0)]);
    assert!(h.dispatcher.transfer_touch_gesture(Token(1), Token(2), h.now));
    h.motion(TOUCH, MotionAction::Move, &[(0, 20.0, 10.0)]);

    assert_eq!(h.actions(1), [MotionAction::Down, MotionAction::Cancel]);
    let b = h.consume_all(2);
    let down = b[0].motion().unwrap();
    assert_eq!(down.action, MotionAction::Down);
    assert!(down.flags.contains(MotionFlags::NO_FOCUS_CHANGE));
    assert_eq!(down.pointers[0].position, Point::new(-90.0, 10.0));
    assert_eq!(b[1].motion().unwrap().action, MotionAction::Move);

    let touched = h.dispatcher.touched_windows(D);
    assert_eq!(touched.len(), 1);
    assert_eq!(touched[0].token, Token(2));
}

#[test]
fn transfer_without_a_gesture_fails() {
    let mut h = Harness::new();
    h.set_windows(vec![
        window(1, 0.0, 0.0, 100.0, 100.0),
        window(2, 100.0, 0.0, 200.0, 100.0),
    ]);

    assert!(!h.dispatcher.transfer_touch_gesture(Token(1), Token(2), h.now));
    assert!(h.actions(2).is_empty());
}

#[test]
fn touch_is_blocked_while_a_stylus_is_down_in_the_window() {
    let mut h = Harness::new();
    h.set_windows(vec![window(1, 0.0, 0.0, 100.0, 100.0)]);

    h.motion(STYLUS, MotionAction::Down, &[(0, 10.0, 10.0)]);
    h.motion(TOUCH, MotionAction::Down, &[(0, 20.0, 20.0)]);
    h.motion(TOUCH, MotionAction::Up, &[(0, 20.0, 20.0)]);

    let entries = h.consume_all(1);
    assert_eq!(entries.len(), 1, "only the stylus DOWN is delivered");
    assert_eq!(entries[0].motion().unwrap().device_id, STYLUS);
}

#[test]
fn multi_device_mode_delivers_both_streams() {
    let mut h = Harness::with_config(DispatcherConfig::default().with_multi_device_same_window(true));
    h.set_windows(vec![window(1, 0.0, 0.0, 100.0, 100.0)]);

    h.motion(STYLUS, MotionAction::Down, &[(0, 10.0, 10.0)]);
    h.motion(TOUCH, MotionAction::Down, &[(0, 20.0, 20.0)]);

    let devices: Vec<_> = h
        .consume_all(1)
        .iter()
        .map(|e| e.motion().unwrap().device_id)
        .collect();
    assert_eq!(devices, [STYLUS, TOUCH]);
}

#[test]
fn stylus_evicts_touch_from_the_window() {
    let mut h = Harness::new();
    h.set_windows(vec![window(1, 0.0, 0.0, 100.0, 100.0)]);

    h.motion(TOUCH, MotionAction::Down, &[(0, 20.0, 20.0)]);
    h.motion(STYLUS, MotionAction::Down, &[(0, 10.0, 10.0)]);

    let entries = h.consume_all(1);
    let seen: Vec<_> = entries
        .iter()
        .map(|e| {
            let m = e.motion().unwrap();
            (m.device_id, m.action)
        })
        .collect();
    assert_eq!(
        seen,
        [
            (TOUCH, MotionAction::Down),
            (TOUCH, MotionAction::Cancel),
            (STYLUS, MotionAction::Down)
        ]
    );
}

#[test]
fn global_stylus_blocks_touch_in_other_windows() {
    let mut h = Harness::new();
    h.set_windows(vec![
        window(1, 0.0, 0.0, 100.0, 100.0).add_flags(WindowFlags::GLOBAL_STYLUS_BLOCKS_TOUCH),
        window(2, 100.0, 0.0, 200.0, 100.0),
    ]);

    h.motion(STYLUS, MotionAction::Down, &[(0, 150.0, 10.0)]);
    h.motion(TOUCH, MotionAction::Down, &[(0, 10.0, 10.0)]);

    assert!(h.actions(1).is_empty(), "touch must be rejected while the stylus is down");
    assert_eq!(h.actions(2), [MotionAction::Down]);
}

#[test]
fn wallpaper_follows_its_window_and_is_canceled_with_it() {
    let mut h = Harness::new();
    let wallpaper = window(9, 0.0, 0.0, 400.0, 400.0).add_flags(WindowFlags::IS_WALLPAPER);
    h.set_windows(vec![
        window(1, 0.0, 0.0, 100.0, 100.0).add_flags(WindowFlags::DUPLICATE_TOUCH_TO_WALLPAPER),
        wallpaper.clone(),
    ]);

    h.motion(TOUCH, MotionAction::Down, &[(0, 10.0, 10.0)]);
    h.update(vec![wallpaper]);

    assert_eq!(h.actions(1), [MotionAction::Down, MotionAction::Cancel]);
    let wp = h.consume_all(9);
    let actions: Vec<_> = wp.iter().map(|e| e.motion().unwrap().action).collect();
    assert_eq!(actions, [MotionAction::Down, MotionAction::Cancel]);
    for entry in &wp {
        let m = entry.motion().unwrap();
        assert!(
            m.flags.contains(MotionFlags::WINDOW_IS_OBSCURED),
            "wallpaper copies are marked obscured"
        );
    }
    assert!(wp[1].motion().unwrap().flags.contains(MotionFlags::CANCELED));
    assert!(h.dispatcher.touched_windows(D).is_empty());
}

#[test]
fn wallpaper_is_canceled_when_its_window_connection_goes_away() {
    let mut h = Harness::new();
    h.set_windows(vec![
        window(1, 0.0, 0.0, 100.0, 100.0).add_flags(WindowFlags::DUPLICATE_TOUCH_TO_WALLPAPER),
        window(9, 0.0, 0.0, 400.0, 400.0).add_flags(WindowFlags::IS_WALLPAPER),
    ]);

    h.motion(TOUCH, MotionAction::Down, &[(0, 10.0, 10.0)]);
    assert!(h.dispatcher.unregister_connection(Token(1), h.now));

    assert_eq!(h.actions(9), [MotionAction::Down, MotionAction::Cancel]);
}

#[test]
fn gesture_without_a_target_ignores_later_pointers() {
    let mut h = Harness::new();
    h.set_windows(vec![window(1, 0.0, 0.0, 100.0, 100.0)]);

    h.motion(TOUCH, MotionAction::Down, &[(0, 500.0, 500.0)]);
    h.motion(
        TOUCH,
        MotionAction::PointerDown(1),
        &[(0, 500.0, 500.0), (1, 10.0, 10.0)],
    );
    h.motion(
        TOUCH,
        MotionAction::PointerUp(1),
        &[(0, 500.0, 500.0), (1, 10.0, 10.0)],
    );
    h.motion(TOUCH, MotionAction::Up, &[(0, 500.0, 500.0)]);

    assert!(h.actions(1).is_empty());
    assert!(h.dispatcher.touched_windows(D).is_empty());
}

#[test]
fn monitors_see_every_gesture_in_display_coordinates() {
    let mut h = Harness::new();
    h.monitor(50);
    h.set_windows(vec![window(1, 50.0, 50.0, 150.0, 150.0)]);

    h.motion(TOUCH, MotionAction::Down, &[(0, 60.0, 70.0)]);
    h.motion(TOUCH, MotionAction::Up, &[(0, 60.0, 70.0)]);

    let seen = h.consume_all(50);
    let actions: Vec<_> = seen.iter().map(|e| e.motion().unwrap().action).collect();
    assert_eq!(actions, [MotionAction::Down, MotionAction::Up]);
    assert_eq!(seen[0].motion().unwrap().pointers[0].position, Point::new(60.0, 70.0));
    assert_eq!(h.actions(1), [MotionAction::Down, MotionAction::Up]);
}

#[test]
fn monitors_do_not_see_dropped_gestures() {
    let mut h = Harness::new();
    h.monitor(50);
    h.set_windows(vec![window(1, 0.0, 0.0, 100.0, 100.0)]);

    h.motion(TOUCH, MotionAction::Down, &[(0, 500.0, 500.0)]);

    assert!(h.actions(50).is_empty());
}

#[test]
fn display_transform_maps_device_coordinates() {
    let mut h = Harness::new();
    h.set_windows(vec![window(1, 0.0, 0.0, 100.0, 100.0)]);
    h.dispatcher.set_display_transform(D, Affine::scale(0.5));

    h.motion(TOUCH, MotionAction::Down, &[(0, 150.0, 100.0)]);

    let entries = h.consume_all(1);
    assert_eq!(entries[0].motion().unwrap().pointers[0].position, Point::new(75.0, 50.0));
}

#[test]
fn stale_events_are_dropped_unless_a_gesture_is_under_way() {
    let mut h = Harness::new();
    h.set_windows(vec![window(1, 0.0, 0.0, 100.0, 100.0)]);

    let late_down = h.event(TOUCH, MotionAction::Down, &[(0, 10.0, 10.0)]);
    h.advance(Duration::from_secs(11));
    h.dispatcher.notify_motion(late_down, h.now);
    assert!(h.actions(1).is_empty(), "stale DOWN must be dropped");

    h.motion(TOUCH, MotionAction::Down, &[(0, 10.0, 10.0)]);
    let late_move = h.event(TOUCH, MotionAction::Move, &[(0, 20.0, 10.0)]);
    h.advance(Duration::from_secs(11));
    h.dispatcher.notify_motion(late_move, h.now);
    assert_eq!(h.actions(1), [MotionAction::Down, MotionAction::Move]);
}

#[test]
fn repeated_down_cancels_the_previous_gesture() {
    let mut h = Harness::new();
    h.set_windows(vec![
        window(1, 0.0, 0.0, 100.0, 100.0),
        window(2, 100.0, 0.0, 200.0, 100.0),
    ]);

    h.motion(TOUCH, MotionAction::Down, &[(0, 10.0, 10.0)]);
    h.motion(TOUCH, MotionAction::Down, &[(0, 150.0, 10.0)]);

    assert_eq!(h.actions(1), [MotionAction::Down, MotionAction::Cancel]);
    assert_eq!(h.actions(2), [MotionAction::Down]);
}

#[test]
fn cancel_all_touches_cancels_every_receiver() {
    let mut h = Harness::new();
    h.set_windows(vec![
        window(1, 0.0, 0.0, 100.0, 100.0),
        window(2, 100.0, 0.0, 200.0, 100.0),
    ]);

    h.motion(TOUCH, MotionAction::Down, &[(0, 10.0, 10.0)]);
    h.motion(
        TOUCH,
        MotionAction::PointerDown(1),
        &[(0, 10.0, 10.0), (1, 150.0, 10.0)],
    );
    h.dispatcher
        .cancel_all_touches_on_display(D, "display turned off", h.now);

    assert_eq!(
        h.actions(1),
        [MotionAction::Down, MotionAction::Move, MotionAction::Cancel]
    );
    assert_eq!(h.actions(2), [MotionAction::Down, MotionAction::Cancel]);
    assert!(h.dispatcher.touched_windows(D).is_empty());
}

#[test]
fn tracer_sees_every_transmitted_entry() {
    struct Recorder(Arc<Mutex<Vec<(Token, u32)>>>);

    impl DispatchTracer for Recorder {
        fn trace_dispatch(&mut self, token: Token, entry: &DispatchEntry) {
            self.0.lock().push((token, entry.seq));
        }
    }

    let mut h = Harness::new();
    h.set_windows(vec![window(1, 0.0, 0.0, 100.0, 100.0)]);
    let traced = Arc::new(Mutex::new(Vec::new()));
    h.dispatcher.set_tracer(Box::new(Recorder(traced.clone())));

    h.motion(TOUCH, MotionAction::Down, &[(0, 10.0, 10.0)]);
    h.motion(TOUCH, MotionAction::Up, &[(0, 10.0, 10.0)]);
    assert_eq!(*traced.lock(), [(Token(1), 1)], "UP waits for the DOWN to be acknowledged");

    h.consume_all(1);
    assert_eq!(*traced.lock(), [(Token(1), 1), (Token(1), 2)]);
}

#[test]
fn scroll_goes_to_the_window_under_the_pointer() {
    let mut h = Harness::new();
    h.set_windows(vec![
        window(1, 0.0, 0.0, 100.0, 100.0),
        window(2, 100.0, 0.0, 200.0, 100.0),
    ]);

    h.motion(MOUSE, MotionAction::Scroll, &[(0, 150.0, 10.0)]);

    assert!(h.actions(1).is_empty());
    let entries = h.consume_all(2);
    assert_eq!(entries[0].motion().unwrap().action, MotionAction::Scroll);
    assert!(entries[0].target_flags.contains(TargetFlags::FOREGROUND));
}

#[test]
fn invalid_pointer_ids_are_dropped() {
    let mut h = Harness::new();
    h.set_windows(vec![window(1, 0.0, 0.0, 100.0, 100.0)]);

    h.motion(TOUCH, MotionAction::Down, &[(40, 10.0, 10.0)]);
    assert!(h.actions(1).is_empty());
    assert!(h.dispatcher.touched_windows(D).is_empty());

    h.motion(TOUCH, MotionAction::Down, &[(0, 10.0, 10.0)]);
    h.motion(
        TOUCH,
        MotionAction::PointerDown(1),
        &[(0, 10.0, 10.0), (0, 20.0, 20.0)],
    );
    assert_eq!(h.actions(1), [MotionAction::Down]);
    assert_eq!(h.dispatcher.touched_windows(D)[0].pointers[0].1, PointerIds::single(0));
}

#[test]
fn gesture_does_not_slip_into_a_window_that_drops_input() {
    for blocked in [WindowFlags::DROP_INPUT, WindowFlags::PAUSED] {
        let mut h = Harness::new();
        h.set_windows(vec![
            window(1, 0.0, 0.0, 100.0, 100.0).add_flags(WindowFlags::SLIPPERY),
            window(2, 100.0, 0.0, 200.0, 100.0).add_flags(blocked),
        ]);

        h.motion(TOUCH, MotionAction::Down, &[(0, 10.0, 10.0)]);
        h.motion(TOUCH, MotionAction::Move, &[(0, 150.0, 10.0)]);

        assert_eq!(
            h.actions(1),
            [MotionAction::Down, MotionAction::Move],
            "{blocked:?}"
        );
        assert!(h.actions(2).is_empty(), "{blocked:?}");
    }
}

#[test]
fn window_without_input_swallows_the_touch() {
    for blocked in [WindowFlags::PAUSED, WindowFlags::NO_INPUT_CHANNEL] {
        let mut h = Harness::new();
        h.set_windows(vec![
            window(9, 0.0, 0.0, 100.0, 100.0).add_flags(blocked),
            window(1, 0.0, 0.0, 100.0, 100.0),
        ]);

        h.motion(TOUCH, MotionAction::Down, &[(0, 10.0, 10.0)]);
        h.motion(TOUCH, MotionAction::Up, &[(0, 10.0, 10.0)]);

        assert!(h.actions(9).is_empty(), "{blocked:?}");
        assert!(h.actions(1).is_empty(), "{blocked:?}");
        assert!(h.dispatcher.touched_windows(D).is_empty(), "{blocked:?}");
    }
}

#[test]
fn transfer_from_a_spy_is_refused() {
    let mut h = Harness::new();
    h.set_windows(vec![
        window(5, 0.0, 0.0, 200.0, 200.0).add_flags(WindowFlags::SPY),
        window(1, 0.0, 0.0, 100.0, 100.0),
        window(2, 100.0, 0.0, 200.0, 100.0),
    ]);

    h.motion(TOUCH, MotionAction::Down, &[(0, 10.0, 10.0)]);

    assert!(!h.dispatcher.transfer_touch_gesture(Token(5), Token(2), h.now));
    assert_eq!(h.actions(1), [MotionAction::Down]);
    assert_eq!(h.actions(5), [MotionAction::Down]);
    assert!(h.actions(2).is_empty());
    assert_eq!(h.dispatcher.touched_windows(D).len(), 2);
}

// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Responsiveness supervision: acknowledgment deadlines and unresponsive episodes.
//!
//! Deadlines live in a min-heap keyed by `(deadline, token, generation)`. Re-arming or
//! disarming a token bumps its generation, which turns older heap entries into tombstones
//! that are skipped when they surface.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Instant;

use hashbrown::{HashMap, HashSet};
use understory_window_registry::Token;

#[derive(Debug, Default)]
pub(crate) struct Supervisor {
    heap: BinaryHeap<Reverse<(Instant, Token, u64)>>,
    armed: HashMap<Token, u64>,
    generation: u64,
    unresponsive: HashSet<Token>,
}

impl Supervisor {
    /// Arm (or re-arm) the deadline of `token`.
    pub(crate) fn arm(&mut self, token: Token, deadline: Instant) {
        self.generation += 1;
        self.armed.insert(token, self.generation);
        self.heap.push(Reverse((deadline, token, self.generation)));
    }

    pub(crate) fn disarm(&mut self, token: Token) {
        self.armed.remove(&token);
    }

    /// Pop every armed deadline that is due at `now`.
    pub(crate) fn expired(&mut self, now: Instant) -> Vec<Token> {
        let mut due = Vec::new();
        while let Some(Reverse((deadline, token, generation))) = self.heap.peek().copied() {
            if deadline > now {
                break;
            }
            self.heap.pop();
            if self.armed.get(&token) == Some(&generation) {
                self.armed.remove(&token);
                due.push(token);
            }
        }
        due
    }

    /// Earliest live deadline.
    pub(crate) fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(Reverse((deadline, token, generation))) = self.heap.peek().copied() {
            if self.armed.get(&token) == Some(&generation) {
                return Some(deadline);
            }
            self.heap.pop();
        }
        None
    }

    /// Returns `true` if this starts a new unresponsive episode.
    pub(crate) fn mark_unresponsive(&mut self, token: Token) -> bool {
        self.unresponsive.insert(token)
    }

    /// Returns `true` if this ends an unresponsive episode.
    pub(crate) fn mark_responsive(&mut self, token: Token) -> bool {
        self.unresponsive.remove(&token)
    }

    pub(crate) fn is_unresponsive(&self, token: Token) -> bool {
        self.unresponsive.contains(&token)
    }
}

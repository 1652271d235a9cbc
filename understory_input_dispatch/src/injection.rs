// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Injected-event bookkeeping.

use crossbeam_channel::{Receiver, Sender};
use hashbrown::HashMap;

/// How long an injecting caller waits.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum InjectionSync {
    /// Do not wait; the result is `Succeeded` once the event is accepted.
    #[default]
    None,
    /// Wait until the event's receivers are known.
    WaitForResult,
    /// Wait until every receiver acknowledged its copy of the event.
    WaitForFinished,
}

/// Outcome of an injection.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum InjectionResult {
    /// The event was delivered (and acknowledged, for [`InjectionSync::WaitForFinished`]).
    Succeeded,
    /// The event was dropped.
    Failed,
    /// The caller's timeout elapsed first.
    TimedOut,
    /// The event would have reached a window owned by a different user.
    TargetMismatch,
}

/// Identifier of one injection.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct InjectionId(u64);

#[derive(Debug)]
struct Pending {
    sync: InjectionSync,
    reply: Sender<InjectionResult>,
    /// Entries enqueued for this injection.
    delivered: usize,
    /// Entries not yet acknowledged.
    outstanding: usize,
    /// Set once targeting finished; only then may the count reaching zero resolve it.
    targeted: bool,
}

#[derive(Debug, Default)]
pub(crate) struct Injections {
    next: u64,
    pending: HashMap<InjectionId, Pending>,
}

impl Injections {
    pub(crate) fn begin(&mut self, sync: InjectionSync) -> (InjectionId, Receiver<InjectionResult>) {
        self.next += 1;
        let id = InjectionId(self.next);
        let (reply, rx) = crossbeam_channel::bounded(1);
        self.pending.insert(
            id,
            Pending {
                sync,
                reply,
                delivered: 0,
                outstanding: 0,
                targeted: false,
            },
        );
        (id, rx)
    }

    /// An entry was enqueued on behalf of `id`.
    pub(crate) fn entry_enqueued(&mut self, id: InjectionId) {
        if let Some(p) = self.pending.get_mut(&id) {
            p.delivered += 1;
            p.outstanding += 1;
        }
    }

    /// Targeting for `id` is complete.
    pub(crate) fn targeted(&mut self, id: InjectionId) {
        let Some(p) = self.pending.get_mut(&id) else {
            return;
        };
        p.targeted = true;
        if p.delivered == 0 {
            self.resolve(id, InjectionResult::Failed);
            return;
        }
        match p.sync {
            InjectionSync::None | InjectionSync::WaitForResult => {
                self.resolve(id, InjectionResult::Succeeded);
            }
            InjectionSync::WaitForFinished => {
                if p.outstanding == 0 {
                    self.resolve(id, InjectionResult::Succeeded);
                }
            }
        }
    }

    /// An entry of `id` was acknowledged, or dropped without being acknowledged.
    pub(crate) fn entry_finished(&mut self, id: InjectionId, dropped: bool) {
        let Some(p) = self.pending.get_mut(&id) else {
            return;
        };
        p.outstanding = p.outstanding.saturating_sub(1);
        if dropped {
            self.resolve(id, InjectionResult::Failed);
        } else if p.targeted && p.outstanding == 0 {
            self.resolve(id, InjectionResult::Succeeded);
        }
    }

    /// Resolve `id` now. Later resolutions of the same id are ignored.
    pub(crate) fn resolve(&mut self, id: InjectionId, result: InjectionResult) {
        if let Some(p) = self.pending.remove(&id) {
            // The caller may have stopped waiting.
            let _ = p.reply.try_send(result);
        }
    }
}

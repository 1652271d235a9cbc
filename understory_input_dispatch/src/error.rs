// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error types.

use understory_window_registry::Token;

/// Failure reported by an [`InputChannel`](crate::InputChannel) transport.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The receiving end is gone.
    #[error("input channel is closed")]
    Closed,
    /// The transport failed to write the entry.
    #[error("input channel write failed: {0}")]
    Write(String),
}

/// Why a [`Dispatcher::pilfer_pointers`](crate::Dispatcher::pilfer_pointers) request was refused.
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum PilferError {
    /// The connection does not hold any pointer that is currently down.
    #[error("connection {0:?} holds no active pointers")]
    NoActivePointers(Token),
}

/// Errors from the [`Dispatcher`](crate::Dispatcher) and its
/// [`DispatcherThread`](crate::DispatcherThread) handle.
#[derive(Debug, thiserror::Error)]
pub enum DispatcherError {
    /// A connection with this token is already registered.
    #[error("connection {0:?} is already registered")]
    AlreadyRegistered(Token),
    /// The dispatch thread could not be started.
    #[error("failed to spawn the dispatch thread")]
    Spawn(#[from] std::io::Error),
    /// The dispatch thread has exited and no longer accepts commands.
    #[error("the dispatch thread is no longer running")]
    Disconnected,
    /// The dispatch thread panicked.
    #[error("the dispatch thread panicked")]
    Panicked,
}

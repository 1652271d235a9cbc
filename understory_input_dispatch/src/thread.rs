// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The dispatch thread.
//!
//! A [`Dispatcher`] is owned by one thread. Producers post commands to it over an unbounded
//! channel; the thread applies them in order and sleeps until the next command or the
//! dispatcher's next deadline, whichever comes first.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use kurbo::Affine;
use tracing::debug;
use understory_window_registry::{DisplayId, ProcessId, Token, UserId, WindowDescriptor};

use crate::config::DispatcherConfig;
use crate::connection::InputChannel;
use crate::dispatcher::Dispatcher;
use crate::error::{DispatcherError, PilferError};
use crate::event::{InputEvent, KeyEvent, MotionEvent};
use crate::focus::FocusedApplication;
use crate::injection::{InjectionResult, InjectionSync};
use crate::policy::{DispatchPolicy, DispatchTracer};

enum Command {
    Motion(MotionEvent),
    Key(KeyEvent),
    Finished {
        token: Token,
        seq: u32,
    },
    UpdateWindows {
        display: DisplayId,
        windows: Vec<WindowDescriptor>,
    },
    SetDisplayTransform {
        display: DisplayId,
        transform: Affine,
    },
    SetFocusedWindow {
        display: DisplayId,
        token: Option<Token>,
    },
    SetFocusedApplication {
        display: DisplayId,
        application: Option<FocusedApplication>,
    },
    RegisterWindow {
        token: Token,
        name: String,
        channel: Box<dyn InputChannel>,
        timeout: Option<Duration>,
        reply: Sender<Result<(), DispatcherError>>,
    },
    RegisterMonitor {
        token: Token,
        name: String,
        display: DisplayId,
        pid: Option<ProcessId>,
        channel: Box<dyn InputChannel>,
        reply: Sender<Result<(), DispatcherError>>,
    },
    Unregister {
        token: Token,
    },
    SetTracer(Box<dyn DispatchTracer>),
    Pilfer {
        token: Token,
        reply: Sender<Result<(), PilferError>>,
    },
    Transfer {
        from: Token,
        to: Token,
        reply: Sender<bool>,
    },
    CancelAllTouches {
        display: DisplayId,
        reason: String,
    },
    Inject {
        event: InputEvent,
        sync: InjectionSync,
        target_uid: Option<UserId>,
        reply: Sender<Receiver<InjectionResult>>,
    },
    Shutdown,
}

/// Handle to a [`Dispatcher`] running on its own thread.
///
/// Every method posts a command and returns; methods with a result wait for the thread to
/// reply. Methods fail with [`DispatcherError::Disconnected`] once the thread has exited.
pub struct DispatcherThread<P: DispatchPolicy + Send + 'static> {
    commands: Sender<Command>,
    handle: JoinHandle<Dispatcher<P>>,
}

impl<P: DispatchPolicy + Send + 'static> core::fmt::Debug for DispatcherThread<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DispatcherThread")
            .field("queued", &self.commands.len())
            .field("thread", &self.handle.thread().name())
            .finish_non_exhaustive()
    }
}

impl<P: DispatchPolicy + Send + 'static> DispatcherThread<P> {
    /// Start a dispatcher on a new thread named `input-dispatcher`.
    pub fn spawn(config: DispatcherConfig, policy: P) -> Result<Self, DispatcherError> {
        let (commands, inbox) = crossbeam_channel::unbounded();
        let handle = thread::Builder::new()
            .name("input-dispatcher".into())
            .spawn(move || run(Dispatcher::new(config, policy), &inbox))?;
        Ok(Self { commands, handle })
    }

    fn post(&self, command: Command) -> Result<(), DispatcherError> {
        self.commands
            .send(command)
            .map_err(|_| DispatcherError::Disconnected)
    }

    /// A cloneable handle for transports to acknowledge entries from their own threads.
    pub fn ack_sender(&self) -> AckSender {
        AckSender {
            commands: self.commands.clone(),
        }
    }

    /// See [`Dispatcher::notify_motion`].
    pub fn notify_motion(&self, event: MotionEvent) -> Result<(), DispatcherError> {
        self.post(Command::Motion(event))
    }

    /// See [`Dispatcher::notify_key`].
    pub fn notify_key(&self, event: KeyEvent) -> Result<(), DispatcherError> {
        self.post(Command::Key(event))
    }

    /// See [`Dispatcher::finish`].
    pub fn finished(&self, token: Token, seq: u32) -> Result<(), DispatcherError> {
        self.post(Command::Finished { token, seq })
    }

    /// See [`Dispatcher::update_windows`].
    pub fn update_windows(
        &self,
        display: DisplayId,
        windows: Vec<WindowDescriptor>,
    ) -> Result<(), DispatcherError> {
        self.post(Command::UpdateWindows { display, windows })
    }

    /// See [`Dispatcher::set_display_transform`].
    pub fn set_display_transform(
        &self,
        display: DisplayId,
        transform: Affine,
    ) -> Result<(), DispatcherError> {
        self.post(Command::SetDisplayTransform { display, transform })
    }

    /// See [`Dispatcher::set_focused_window`].
    pub fn set_focused_window(
        &self,
        display: DisplayId,
        token: Option<Token>,
    ) -> Result<(), DispatcherError> {
        self.post(Command::SetFocusedWindow { display, token })
    }

    /// See [`Dispatcher::set_focused_application`].
    pub fn set_focused_application(
        &self,
        display: DisplayId,
        application: Option<FocusedApplication>,
    ) -> Result<(), DispatcherError> {
        self.post(Command::SetFocusedApplication {
            display,
            application,
        })
    }

    /// See [`Dispatcher::register_window_connection`].
    pub fn register_window_connection(
        &self,
        token: Token,
        name: impl Into<String>,
        channel: Box<dyn InputChannel>,
        timeout: Option<Duration>,
    ) -> Result<(), DispatcherError> {
        let (reply, rx) = crossbeam_channel::bounded(1);
        self.post(Command::RegisterWindow {
            token,
            name: name.into(),
            channel,
            timeout,
            reply,
        })?;
        rx.recv().map_err(|_| DispatcherError::Disconnected)?
    }

    /// See [`Dispatcher::register_monitor`].
    pub fn register_monitor(
        &self,
        token: Token,
        name: impl Into<String>,
        display: DisplayId,
        pid: Option<ProcessId>,
        channel: Box<dyn InputChannel>,
    ) -> Result<(), DispatcherError> {
        let (reply, rx) = crossbeam_channel::bounded(1);
        self.post(Command::RegisterMonitor {
            token,
            name: name.into(),
            display,
            pid,
            channel,
            reply,
        })?;
        rx.recv().map_err(|_| DispatcherError::Disconnected)?
    }

    /// See [`Dispatcher::unregister_connection`].
    pub fn unregister_connection(&self, token: Token) -> Result<(), DispatcherError> {
        self.post(Command::Unregister { token })
    }

    /// See [`Dispatcher::set_tracer`].
    pub fn set_tracer(&self, tracer: Box<dyn DispatchTracer>) -> Result<(), DispatcherError> {
        self.post(Command::SetTracer(tracer))
    }

    /// See [`Dispatcher::pilfer_pointers`].
    pub fn pilfer_pointers(&self, token: Token) -> Result<Result<(), PilferError>, DispatcherError> {
        let (reply, rx) = crossbeam_channel::bounded(1);
        self.post(Command::Pilfer { token, reply })?;
        rx.recv().map_err(|_| DispatcherError::Disconnected)
    }

    /// See [`Dispatcher::transfer_touch_gesture`].
    pub fn transfer_touch_gesture(&self, from: Token, to: Token) -> Result<bool, DispatcherError> {
        let (reply, rx) = crossbeam_channel::bounded(1);
        self.post(Command::Transfer { from, to, reply })?;
        rx.recv().map_err(|_| DispatcherError::Disconnected)
    }

    /// See [`Dispatcher::cancel_all_touches_on_display`].
    pub fn cancel_all_touches_on_display(
        &self,
        display: DisplayId,
        reason: impl Into<String>,
    ) -> Result<(), DispatcherError> {
        self.post(Command::CancelAllTouches {
            display,
            reason: reason.into(),
        })
    }

    /// Inject `event` and wait up to `timeout` for the result `sync` asks for.
    ///
    /// With [`InjectionSync::None`] this returns [`InjectionResult::Succeeded`] as soon as
    /// the event is posted. [`InjectionResult::TimedOut`] is returned when `timeout` elapses
    /// first.
    pub fn inject(
        &self,
        event: InputEvent,
        sync: InjectionSync,
        target_uid: Option<UserId>,
        timeout: Duration,
    ) -> Result<InjectionResult, DispatcherError> {
        let deadline = Instant::now() + timeout;
        let (reply, rx) = crossbeam_channel::bounded(1);
        self.post(Command::Inject {
            event,
            sync,
            target_uid,
            reply,
        })?;
        if sync == InjectionSync::None {
            return Ok(InjectionResult::Succeeded);
        }
        let result = match rx.recv_deadline(deadline) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => return Ok(InjectionResult::TimedOut),
            Err(RecvTimeoutError::Disconnected) => return Err(DispatcherError::Disconnected),
        };
        match result.recv_deadline(deadline) {
            Ok(result) => Ok(result),
            Err(RecvTimeoutError::Timeout) => Ok(InjectionResult::TimedOut),
            // The dispatcher went away with the injection unresolved.
            Err(RecvTimeoutError::Disconnected) => Ok(InjectionResult::Failed),
        }
    }

    /// Stop the thread and hand back the dispatcher with its final state.
    pub fn shutdown(self) -> Result<Dispatcher<P>, DispatcherError> {
        // A send failure means the thread is already gone; joining reports why.
        let _ = self.commands.send(Command::Shutdown);
        self.handle.join().map_err(|_| DispatcherError::Panicked)
    }
}

/// Acknowledges entries on behalf of a transport.
#[derive(Clone)]
pub struct AckSender {
    commands: Sender<Command>,
}

impl core::fmt::Debug for AckSender {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AckSender").finish_non_exhaustive()
    }
}

impl AckSender {
    /// Acknowledge entry `seq` of connection `token`.
    pub fn finished(&self, token: Token, seq: u32) -> Result<(), DispatcherError> {
        self.commands
            .send(Command::Finished { token, seq })
            .map_err(|_| DispatcherError::Disconnected)
    }
}

fn run<P: DispatchPolicy>(mut dispatcher: Dispatcher<P>, inbox: &Receiver<Command>) -> Dispatcher<P> {
    debug!("dispatch thread started");
    loop {
        dispatcher.process_timeouts(Instant::now());
        let received = match dispatcher.next_wakeup() {
            Some(deadline) => match inbox.recv_deadline(deadline) {
                Ok(command) => Some(command),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => None,
            },
            None => inbox.recv().ok(),
        };
        let Some(command) = received else {
            break;
        };
        if !apply(&mut dispatcher, command) {
            break;
        }
    }
    debug!("dispatch thread exiting");
    dispatcher
}

/// Apply one command. Returns `false` on shutdown.
fn apply<P: DispatchPolicy>(dispatcher: &mut Dispatcher<P>, command: Command) -> bool {
    let now = Instant::now();
    match command {
        Command::Motion(event) => dispatcher.notify_motion(event, now),
        Command::Key(event) => dispatcher.notify_key(event, now),
        Command::Finished { token, seq } => dispatcher.finish(token, seq, now),
        Command::UpdateWindows { display, windows } => {
            dispatcher.update_windows(display, windows, now);
        }
        Command::SetDisplayTransform { display, transform } => {
            dispatcher.set_display_transform(display, transform);
        }
        Command::SetFocusedWindow { display, token } => {
            dispatcher.set_focused_window(display, token, now);
        }
        Command::SetFocusedApplication {
            display,
            application,
        } => dispatcher.set_focused_application(display, application, now),
        Command::RegisterWindow {
            token,
            name,
            channel,
            timeout,
            reply,
        } => {
            let _ = reply.send(dispatcher.register_window_connection(token, name, channel, timeout));
        }
        Command::RegisterMonitor {
            token,
            name,
            display,
            pid,
            channel,
            reply,
        } => {
            let _ = reply.send(dispatcher.register_monitor(token, name, display, pid, channel));
        }
        Command::Unregister { token } => {
            dispatcher.unregister_connection(token, now);
        }
        Command::SetTracer(tracer) => dispatcher.set_tracer(tracer),
        Command::Pilfer { token, reply } => {
            let _ = reply.send(dispatcher.pilfer_pointers(token, now));
        }
        Command::Transfer { from, to, reply } => {
            let _ = reply.send(dispatcher.transfer_touch_gesture(from, to, now));
        }
        Command::CancelAllTouches { display, reason } => {
            dispatcher.cancel_all_touches_on_display(display, &reason, now);
        }
        Command::Inject {
            event,
            sync,
            target_uid,
            reply,
        } => {
            let _ = reply.send(dispatcher.inject(event, sync, target_uid, now));
        }
        Command::Shutdown => return false,
    }
    true
}

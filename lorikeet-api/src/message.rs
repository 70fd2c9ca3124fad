//! # Messages and Exit Reasons
//!
//! Processes receive two classes of traffic. User messages are arbitrary boxed
//! values; system messages are the fixed control-plane protocol used for fault
//! propagation:
//!
//! - `Signal`: an explicit exit request sent to a process
//! - `Exit`: a linked peer terminated
//! - `Down`: a monitored peer terminated
//!
//! Every system message carries the sender and an [`ExitReason`].
//!
//! ## Usage Example
//!
//! ```rust
//! use lorikeet_api::{ExitReason, Message};
//!
//! fn describe(msg: Message) -> String {
//!     match msg {
//!         Message::System(sys) if sys.reason.is_normal() => format!("{} finished", sys.sender),
//!         Message::System(sys) => format!("{} failed: {}", sys.sender, sys.reason),
//!         Message::User(payload) => match payload.downcast::<String>() {
//!             Ok(text) => *text,
//!             Err(_) => "unknown payload".to_string(),
//!         },
//!     }
//! }
//! ```

use crate::pid::ProcessRef;
use crate::types::BoxedMessage;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Why a process terminated.
#[derive(Debug, Clone)]
pub enum ExitReason {
    /// The process finished on its own.
    Normal,
    /// The process was asked to stop, usually through cancellation.
    Shutdown,
    /// Untrappable termination.
    Kill,
    /// A handler returned an error.
    Error(Arc<anyhow::Error>),
    /// A handler panicked; the payload is rendered as text.
    Panic(String),
}

impl ExitReason {
    pub fn error<E>(err: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        ExitReason::Error(Arc::new(err.into()))
    }

    /// Builds a reason from a recovered panic payload.
    pub fn panic(payload: Box<dyn Any + Send>) -> Self {
        ExitReason::Panic(panic_message(payload))
    }

    pub fn is_normal(&self) -> bool {
        matches!(self, ExitReason::Normal)
    }

    pub fn is_shutdown(&self) -> bool {
        matches!(self, ExitReason::Shutdown)
    }

    pub fn is_kill(&self) -> bool {
        matches!(self, ExitReason::Kill)
    }

    /// Anything other than `Normal` or `Shutdown`.
    pub fn is_abnormal(&self) -> bool {
        !matches!(self, ExitReason::Normal | ExitReason::Shutdown)
    }

    /// Downcasts the wrapped error, if this reason carries one.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        match self {
            ExitReason::Error(err) => err.downcast_ref::<E>(),
            _ => None,
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Normal => f.write_str("normal"),
            ExitReason::Shutdown => f.write_str("shutdown"),
            ExitReason::Kill => f.write_str("kill"),
            ExitReason::Error(err) => write!(f, "{:#}", err),
            ExitReason::Panic(msg) => write!(f, "panic: {}", msg),
        }
    }
}

impl PartialEq for ExitReason {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ExitReason::Normal, ExitReason::Normal)
            | (ExitReason::Shutdown, ExitReason::Shutdown)
            | (ExitReason::Kill, ExitReason::Kill) => true,
            (ExitReason::Error(a), ExitReason::Error(b)) => {
                Arc::ptr_eq(a, b) || a.to_string() == b.to_string()
            }
            (ExitReason::Panic(a), ExitReason::Panic(b)) => a == b,
            _ => false,
        }
    }
}

/// Renders a panic payload the way `std` does for `&str` and `String` payloads.
pub fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(msg) => *msg,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(msg) => msg.to_string(),
            Err(_) => "unknown panic payload".to_string(),
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemMessageKind {
    Signal,
    Exit,
    Down,
}

impl fmt::Display for SystemMessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SystemMessageKind::Signal => f.write_str("signal"),
            SystemMessageKind::Exit => f.write_str("exit"),
            SystemMessageKind::Down => f.write_str("down"),
        }
    }
}

/// A control-plane message.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemMessage {
    pub kind: SystemMessageKind,
    pub sender: ProcessRef,
    pub reason: ExitReason,
}

impl SystemMessage {
    pub fn new(kind: SystemMessageKind, sender: ProcessRef, reason: ExitReason) -> Self {
        Self { kind, sender, reason }
    }

    pub fn signal(sender: ProcessRef, reason: ExitReason) -> Self {
        Self::new(SystemMessageKind::Signal, sender, reason)
    }

    pub fn exit(sender: ProcessRef, reason: ExitReason) -> Self {
        Self::new(SystemMessageKind::Exit, sender, reason)
    }

    pub fn down(sender: ProcessRef, reason: ExitReason) -> Self {
        Self::new(SystemMessageKind::Down, sender, reason)
    }
}

/// What a process handler receives.
///
/// System messages only reach the handler when the runtime delegates them:
/// every `Down`, and `Exit`/`Signal` while trapping exits.
#[derive(Debug)]
pub enum Message {
    User(BoxedMessage),
    System(SystemMessage),
}

impl Message {
    pub fn user<M: Any + Send>(msg: M) -> Self {
        Message::User(Box::new(msg))
    }

    pub fn is_system(&self) -> bool {
        matches!(self, Message::System(_))
    }

    pub fn as_system(&self) -> Option<&SystemMessage> {
        match self {
            Message::System(sys) => Some(sys),
            Message::User(_) => None,
        }
    }

    /// Borrows the user payload as `M`.
    pub fn downcast_ref<M: Any>(&self) -> Option<&M> {
        match self {
            Message::User(payload) => payload.downcast_ref::<M>(),
            Message::System(_) => None,
        }
    }

    /// Takes the user payload as `M`, handing the message back on mismatch.
    pub fn downcast<M: Any>(self) -> Result<M, Message> {
        match self {
            Message::User(payload) => match payload.downcast::<M>() {
                Ok(msg) => Ok(*msg),
                Err(payload) => Err(Message::User(payload)),
            },
            sys => Err(sys),
        }
    }
}

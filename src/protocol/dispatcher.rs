use crate::error::{constants, ProtocolError, Result};
use crate::protocol::message::{Message, MessageKind};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::trace;

type HandlerFn<S> = dyn Fn(&S, &Message) -> Result<()> + Send + Sync + 'static;

/// Outcome of routing one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// This many handlers ran, all successfully.
    Handled(usize),
    /// No handler is registered for the message's kind. Nothing ran.
    Unhandled,
}

impl Dispatch {
    pub fn is_handled(self) -> bool {
        matches!(self, Dispatch::Handled(_))
    }
}

/// Routes messages to handlers registered for their exact [`MessageKind`].
///
/// `S` is the sender handed to each handler alongside the message. Handlers for the
/// same kind run in registration order, synchronously, on the dispatching task.
/// A handler must not register new handlers on the dispatcher that is invoking it.
pub struct Dispatcher<S> {
    handlers: RwLock<HashMap<MessageKind, Vec<Box<HandlerFn<S>>>>>,
}

impl<S> Default for Dispatcher<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Dispatcher<S> {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Append a handler for `kind`.
    pub fn register<F>(&self, kind: MessageKind, handler: F) -> Result<()>
    where
        F: Fn(&S, &Message) -> Result<()> + Send + Sync + 'static,
    {
        let mut handlers = self.handlers.write().map_err(|_| {
            ProtocolError::Custom(constants::ERR_DISPATCHER_WRITE_LOCK.to_string())
        })?;

        handlers.entry(kind).or_default().push(Box::new(handler));
        Ok(())
    }

    /// Invoke every handler registered for `msg.kind()`.
    ///
    /// A lookup miss is not an error. If a handler fails, the handlers after it are
    /// skipped and the error is returned; the table itself is left unchanged.
    pub fn dispatch(&self, sender: &S, msg: &Message) -> Result<Dispatch> {
        let kind = msg.kind();

        let handlers = self.handlers.read().map_err(|_| {
            ProtocolError::Custom(constants::ERR_DISPATCHER_READ_LOCK.to_string())
        })?;

        let Some(list) = handlers.get(&kind).filter(|list| !list.is_empty()) else {
            trace!(%kind, "No handler registered");
            return Ok(Dispatch::Unhandled);
        };

        for handler in list {
            handler(sender, msg)?;
        }

        Ok(Dispatch::Handled(list.len()))
    }

    /// Number of handlers registered for `kind`.
    pub fn handler_count(&self, kind: MessageKind) -> usize {
        self.handlers
            .read()
            .map(|handlers| handlers.get(&kind).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    pub fn is_registered(&self, kind: MessageKind) -> bool {
        self.handler_count(kind) > 0
    }
}

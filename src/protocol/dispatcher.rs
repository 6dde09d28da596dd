use crate::core::frame::{Frame, MessageType};
use crate::error::{constants, ProtocolError, Result};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

type HandlerFn = dyn Fn(&Frame) -> Result<()> + Send + Sync + 'static;

/// Routes intact frames to the application, keyed by message kind.
///
/// Handlers observe frames; they do not produce replies. A kind with no handler is still
/// acknowledged by the session. Cloning shares the handler table.
#[derive(Clone)]
pub struct Dispatcher {
    handlers: Arc<RwLock<HashMap<MessageType, Box<HandlerFn>>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kinds: Vec<MessageType> = self
            .handlers
            .read()
            .map(|handlers| handlers.keys().copied().collect())
            .unwrap_or_default();
        f.debug_struct("Dispatcher").field("kinds", &kinds).finish()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register (or replace) the handler for one message kind
    pub fn register<F>(&self, kind: MessageType, handler: F) -> Result<()>
    where
        F: Fn(&Frame) -> Result<()> + Send + Sync + 'static,
    {
        let mut handlers = self
            .handlers
            .write()
            .map_err(|_| ProtocolError::Custom(constants::ERR_DISPATCHER_WRITE_LOCK.into()))?;

        handlers.insert(kind, Box::new(handler));
        Ok(())
    }

    /// Register the same handler for every message kind
    pub fn register_all<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(&Frame) -> Result<()> + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        for kind in MessageType::ALL {
            let handler = Arc::clone(&handler);
            self.register(kind, move |frame| (*handler)(frame))?;
        }
        Ok(())
    }

    /// Run the handler for `frame`, if any. Returns whether a handler ran.
    pub fn dispatch(&self, frame: &Frame) -> Result<bool> {
        let handlers = self
            .handlers
            .read()
            .map_err(|_| ProtocolError::Custom(constants::ERR_DISPATCHER_READ_LOCK.into()))?;

        match handlers.get(&frame.message_type()) {
            Some(handler) => handler(frame).map(|()| true),
            None => Ok(false),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn routes_by_message_kind() {
        let dispatcher = Dispatcher::new();
        let texts = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&texts);
        dispatcher
            .register(MessageType::Text, move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        assert!(dispatcher.dispatch(&Frame::text("a")).unwrap());
        assert!(!dispatcher.dispatch(&Frame::command("c", "p")).unwrap());
        assert_eq!(texts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handler_errors_propagate() {
        let dispatcher = Dispatcher::new();
        dispatcher
            .register(MessageType::Command, |_| {
                Err(ProtocolError::Custom("refused".into()))
            })
            .unwrap();
        assert!(dispatcher.dispatch(&Frame::command("x", "y")).is_err());
    }

    #[test]
    fn register_all_covers_every_kind() {
        let dispatcher = Dispatcher::new();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        dispatcher
            .register_all(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        dispatcher.dispatch(&Frame::text("a")).unwrap();
        dispatcher.dispatch(&Frame::command("b", "c")).unwrap();
        dispatcher.dispatch(&Frame::data_packet(1, 2.0, "d")).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}

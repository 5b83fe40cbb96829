//! Message routing.
//!
//! Inbound frames carry a message name followed by the payload. The
//! router looks the name up in an explicit handler table built at
//! startup and hands the payload over. Unknown names are logged and
//! dropped; a handler failure is a protocol fault and propagates to the
//! caller, which treats it as fatal for the connection.

use std::collections::HashMap;

use anyhow::Context;
use tracing::warn;

use sync_shared::wire::split_named;

use crate::client::ClientWorld;

pub type Handler = fn(&mut ClientWorld, &[u8]) -> anyhow::Result<()>;

/// Static name → handler mapping.
#[derive(Default)]
pub struct MessageRouter {
    handlers: HashMap<&'static str, Handler>,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &'static str, handler: Handler) {
        self.handlers.insert(name, handler);
    }

    /// Splits a frame into name and payload and invokes the handler.
    pub fn dispatch(&self, world: &mut ClientWorld, frame: &[u8]) -> anyhow::Result<()> {
        let (name, payload) = split_named(frame).context("split message frame")?;
        match self.handlers.get(name) {
            Some(handler) => handler(world, payload).with_context(|| format!("handle `{name}`")),
            None => {
                warn!(message = %name, "no handler registered, dropping");
                Ok(())
            }
        }
    }
}

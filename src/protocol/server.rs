use std::collections::HashMap;
use std::net::TcpListener;

use log::{info, warn};

use super::transport::{recv_message, send_message};
use super::RequestKind;
use crate::wire::WireMessage;

/// One registered request handler. `S` is the service state shared by all
/// handlers of an endpoint; it is only ever touched from the endpoint's
/// single serve loop, so no locking is involved.
pub trait RequestHandler<S>: Send {
    fn handle(&mut self, service: &mut S, request: &WireMessage) -> WireMessage;
}

/// Decodes requests, dispatches them by [`RequestKind`] and returns the
/// encoded reply. Requests whose `(ptype, pname)` pair has no registered
/// handler fall through to an `ERROR` reply naming the pair.
pub struct ProtocolServer<S> {
    service: S,
    handlers: HashMap<RequestKind, Box<dyn RequestHandler<S>>>,
}

impl<S> ProtocolServer<S> {
    pub fn new(service: S) -> Self {
        Self {
            service,
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, kind: RequestKind, handler: Box<dyn RequestHandler<S>>) {
        self.handlers.insert(kind, handler);
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Answers one decoded request. Infallible: anything unroutable gets an
    /// `ERROR` reply instead.
    pub fn process(&mut self, request: &WireMessage) -> WireMessage {
        let kind = match (request.ptype(), request.pname()) {
            (Some(ptype), Some(pname)) => RequestKind::from_pair(ptype, pname),
            _ => None,
        };
        match kind.and_then(|kind| self.handlers.get_mut(&kind)) {
            Some(handler) => handler.handle(&mut self.service, request),
            None => {
                let ptype = request.ptype().unwrap_or("<missing>");
                let pname = request.pname().unwrap_or("<missing>");
                warn!("No handler for ({ptype}, {pname})");
                WireMessage::error(&format!("No handler for ({ptype}, {pname})"))
            }
        }
    }

    /// Accepts one connection and answers its requests until the peer
    /// disconnects. Strict turn-taking: one request, one reply, in order.
    pub fn serve_next(&mut self, listener: &TcpListener) -> std::io::Result<()> {
        let (mut stream, peer) = listener.accept()?;
        info!("Client connected from {peer}");
        while let Some(request) = recv_message(&mut stream)? {
            let reply = self.process(&request);
            send_message(&mut stream, &reply)?;
        }
        info!("Client {peer} disconnected");
        Ok(())
    }

    /// Serves clients forever, one at a time. A connection failing mid-
    /// request never takes the endpoint down.
    pub fn serve(&mut self, listener: &TcpListener) {
        loop {
            if let Err(e) = self.serve_next(listener) {
                warn!("Connection error: {e}");
            }
        }
    }
}

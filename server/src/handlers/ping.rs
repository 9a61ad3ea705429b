//! Keepalive

use crate::dispatcher::{Handler, HandlerContext};
use crate::error::HandlerError;
use shared::{Packet, ServerPingResponse};

/// Answers a client ping
pub struct PingHandler;

impl PingHandler {
    pub fn from_packet(packet: Packet) -> Option<Self> {
        match packet {
            Packet::ClientPing(_) => Some(PingHandler),
            _ => None,
        }
    }
}

impl Handler for PingHandler {
    fn requires_login(&self) -> bool {
        false
    }

    fn handle(&mut self, ctx: &HandlerContext<'_>) -> Result<(), HandlerError> {
        ctx.send(ServerPingResponse {});
        Ok(())
    }
}

/// Reply to a server ping; dispatching it already refreshed the session
pub struct PongHandler;

impl PongHandler {
    pub fn from_packet(packet: Packet) -> Option<Self> {
        match packet {
            Packet::ClientPingResponse(_) => Some(PongHandler),
            _ => None,
        }
    }
}

impl Handler for PongHandler {
    fn requires_login(&self) -> bool {
        false
    }

    fn handle(&mut self, _ctx: &HandlerContext<'_>) -> Result<(), HandlerError> {
        Ok(())
    }
}

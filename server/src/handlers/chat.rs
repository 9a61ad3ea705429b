use crate::dispatcher::{Handler, HandlerContext};
use crate::error::HandlerError;
use log::debug;
use shared::{ClientChat, Packet, ServerChat};

/// Relays a chat line to the sender's room, or to the lobby outside rooms
pub struct ChatHandler {
    chat: ClientChat,
}

impl ChatHandler {
    pub fn from_packet(packet: Packet) -> Option<Self> {
        match packet {
            Packet::ClientChat(chat) => Some(Self { chat }),
            _ => None,
        }
    }
}

impl Handler for ChatHandler {
    fn handle(&mut self, ctx: &HandlerContext<'_>) -> Result<(), HandlerError> {
        let message = self.chat.message.trim();
        if message.is_empty() {
            return Ok(());
        }

        let recipients = match ctx.room {
            Some(room) => ctx.server.connections_in(room, None),
            None => ctx.server.lobby_connections(),
        };
        debug!(
            "Chat from '{}' to {} connections",
            ctx.user_name(),
            recipients.len()
        );
        ctx.server.broadcast(
            &recipients,
            ServerChat {
                message: format!("{}: {}", ctx.user_name(), message),
            },
        );
        Ok(())
    }
}

use crate::dispatcher::{Handler, HandlerContext};
use crate::error::HandlerError;
use log::info;
use shared::{ClientHello, Packet, ServerHello, PROTOCOL_VERSION};

/// Records the client's name and version and introduces the server
pub struct HelloHandler {
    hello: ClientHello,
}

impl HelloHandler {
    pub fn from_packet(packet: Packet) -> Option<Self> {
        match packet {
            Packet::ClientHello(hello) => Some(Self { hello }),
            _ => None,
        }
    }
}

impl Handler for HelloHandler {
    fn requires_login(&self) -> bool {
        false
    }

    fn handle(&mut self, ctx: &HandlerContext<'_>) -> Result<(), HandlerError> {
        info!(
            "{} is {} (protocol {})",
            ctx.conn.addr(),
            self.hello.name,
            self.hello.version
        );

        let name = std::mem::take(&mut self.hello.name);
        let version = self.hello.version;
        ctx.conn.with_session(|s| {
            s.client_name = Some(name);
            s.client_version = Some(version);
        });

        ctx.send(ServerHello {
            version: PROTOCOL_VERSION,
            name: ctx.server.config().name.clone(),
        });
        Ok(())
    }
}

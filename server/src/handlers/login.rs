//! Login and logout

use crate::connection::SessionUser;
use crate::dispatcher::{Handler, HandlerContext};
use crate::error::HandlerError;
use log::{debug, info};
use shared::{Login, LoginResponse, Packet, SystemMessage};

/// Binds a user to the connection, creating the user on first login
pub struct LoginHandler {
    login: Login,
}

impl LoginHandler {
    pub fn from_packet(packet: Packet) -> Option<Self> {
        match packet {
            Packet::Login(login) => Some(Self { login }),
            _ => None,
        }
    }

    fn reject(ctx: &HandlerContext<'_>, text: &str) {
        ctx.send(LoginResponse {
            approval: false,
            text: text.to_string(),
        });
    }
}

impl Handler for LoginHandler {
    fn requires_login(&self) -> bool {
        false
    }

    fn handle(&mut self, ctx: &HandlerContext<'_>) -> Result<(), HandlerError> {
        let name = self.login.username.trim();
        if name.is_empty() {
            Self::reject(ctx, "A user name is required");
            return Ok(());
        }

        if let Some(current) = &ctx.user {
            if current.name == name {
                ctx.send(LoginResponse {
                    approval: true,
                    text: "Already logged in".to_string(),
                });
                return Ok(());
            }
            ctx.server.logout(ctx.conn);
        }

        let user = match ctx.storage().find_user(name) {
            Some(user) => user,
            // Another connection may create the same user first
            None => ctx
                .storage()
                .create_user(name, &self.login.password)
                .or_else(|e| ctx.storage().find_user(name).ok_or(e))?,
        };

        if user.password != self.login.password {
            info!("Wrong password for '{}' from {}", name, ctx.conn.addr());
            Self::reject(ctx, "Wrong password");
            return Ok(());
        }

        if !ctx.storage().set_user_online(user.id, true)? {
            debug!("'{}' is already online", name);
            Self::reject(ctx, "Already logged in elsewhere");
            return Ok(());
        }

        let session_user = SessionUser {
            id: user.id,
            name: user.name.clone(),
        };
        ctx.conn.with_session(|s| {
            s.user = Some(session_user);
            s.online = true;
        });
        info!(
            "'{}' logged in from {} (player {})",
            user.name,
            ctx.conn.addr(),
            self.login.player_number
        );

        ctx.send(LoginResponse {
            approval: true,
            text: "Successfully logged in".to_string(),
        });
        let motd = &ctx.server.config().motd;
        if !motd.is_empty() {
            ctx.send(SystemMessage {
                message: motd.clone(),
            });
        }
        ctx.server.send_user_list(None);
        Ok(())
    }
}

pub struct LogoutHandler;

impl LogoutHandler {
    pub fn from_packet(packet: Packet) -> Option<Self> {
        match packet {
            Packet::Logout(_) => Some(LogoutHandler),
            _ => None,
        }
    }
}

impl Handler for LogoutHandler {
    fn handle(&mut self, ctx: &HandlerContext<'_>) -> Result<(), HandlerError> {
        ctx.server.logout(ctx.conn);
        Ok(())
    }
}

//! Command dispatch
//!
//! Maps each command to a factory that builds a handler bound to the decoded
//! packet. Preconditions a handler declares (login, room membership,
//! privilege level) are checked here against a snapshot of the session, so
//! `handle` only ever runs when they held at dispatch time.

use crate::connection::{Connection, SessionUser};
use crate::error::HandlerError;
use crate::facade::Server;
use crate::handlers;
use crate::room::RoomId;
use crate::storage::Storage;
use crate::utils::get_timestamp;
use log::{debug, error, warn};
use shared::{Command, Packet};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// What a handler sees of the server and the sending connection
pub struct HandlerContext<'a> {
    pub server: &'a Server,
    pub conn: &'a Arc<Connection>,
    /// User bound to the connection when the packet was dispatched
    pub user: Option<SessionUser>,
    /// Room the connection was in when the packet was dispatched
    pub room: Option<RoomId>,
}

impl HandlerContext<'_> {
    /// Replies to the sending connection
    pub fn send(&self, packet: impl Into<Packet>) -> bool {
        self.conn.send(packet)
    }

    pub fn storage(&self) -> &dyn Storage {
        self.server.storage()
    }

    /// Name of the logged-in user, empty when anonymous
    pub fn user_name(&self) -> &str {
        self.user.as_ref().map_or("", |user| user.name.as_str())
    }
}

/// A command handler bound to one inbound packet
pub trait Handler: Send {
    fn requires_login(&self) -> bool {
        true
    }

    fn requires_room(&self) -> bool {
        false
    }

    /// Minimum user level, checked in the user's current room when in one
    fn required_level(&self) -> u8 {
        0
    }

    /// Runs instead of `handle` when login is required but missing
    fn on_unauthenticated(&self, _ctx: &HandlerContext<'_>) {}

    /// Runs instead of `handle` when the user's level is too low
    fn on_forbidden(&self, _ctx: &HandlerContext<'_>) {}

    fn handle(&mut self, ctx: &HandlerContext<'_>) -> Result<(), HandlerError>;
}

type HandlerFactory = Box<dyn Fn(Packet) -> Option<Box<dyn Handler>> + Send + Sync>;

/// Result of dispatching one packet; none of these end the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Handled,
    UnknownCommand(u32),
    AuthenticationRequired,
    RoomRequired,
    Forbidden,
    HandlerFault,
}

#[derive(Default)]
pub struct Dispatcher {
    factories: HashMap<Command, HandlerFactory>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatcher with every built-in handler registered
    pub fn with_default_handlers() -> Self {
        let mut dispatcher = Self::new();
        handlers::register_all(&mut dispatcher);
        dispatcher
    }

    /// Registers the handler factory of `command`, replacing any previous one
    ///
    /// The factory returns `None` when handed a packet of another command.
    pub fn register<H, F>(&mut self, command: Command, factory: F)
    where
        H: Handler + 'static,
        F: Fn(Packet) -> Option<H> + Send + Sync + 'static,
    {
        self.factories.insert(
            command,
            Box::new(move |packet| factory(packet).map(|h| Box::new(h) as Box<dyn Handler>)),
        );
    }

    pub fn handles(&self, command: Command) -> bool {
        self.factories.contains_key(&command)
    }

    /// Routes one packet from `conn` to its handler
    pub fn dispatch(&self, server: &Server, conn: &Arc<Connection>, packet: Packet) -> DispatchOutcome {
        let command_id = packet.command_id();
        let (user, room) = conn.with_session(|s| {
            s.last_seen = get_timestamp();
            (s.user.clone(), s.room)
        });

        let factory = packet.command().and_then(|command| self.factories.get(&command));
        let Some(mut handler) = factory.and_then(|factory| factory(packet)) else {
            debug!("Dropping command {} from {}: no handler", command_id, conn.addr());
            return DispatchOutcome::UnknownCommand(command_id);
        };

        let ctx = HandlerContext {
            server,
            conn,
            user,
            room,
        };

        if handler.requires_login() && ctx.user.is_none() {
            debug!("Command {} from {} requires login", command_id, conn.addr());
            handler.on_unauthenticated(&ctx);
            return DispatchOutcome::AuthenticationRequired;
        }

        if handler.requires_room() && ctx.room.is_none() {
            debug!("Command {} from {} requires a room", command_id, conn.addr());
            return DispatchOutcome::RoomRequired;
        }

        let required = handler.required_level();
        if required > 0 {
            let level = ctx
                .user
                .as_ref()
                .map_or(0, |user| server.storage().user_level(user.id, ctx.room));
            if level < required {
                debug!(
                    "Command {} from '{}' needs level {}, has {}",
                    command_id,
                    ctx.user_name(),
                    required,
                    level
                );
                handler.on_forbidden(&ctx);
                return DispatchOutcome::Forbidden;
            }
        }

        match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(&ctx))) {
            Ok(Ok(())) => DispatchOutcome::Handled,
            Ok(Err(e)) => {
                warn!("Command {} from {} failed: {}", command_id, conn.addr(), e);
                DispatchOutcome::HandlerFault
            }
            Err(_) => {
                error!("Handler for command {} panicked ({})", command_id, conn.addr());
                DispatchOutcome::HandlerFault
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::connection::testing::{drain, test_connection};
    use crate::storage::{MemoryStorage, OWNER_LEVEL};
    use shared::{ClientChat, ClientPing, ServerPingResponse, SystemMessage};

    struct EchoHandler {
        chat: ClientChat,
    }

    impl Handler for EchoHandler {
        fn requires_login(&self) -> bool {
            false
        }

        fn handle(&mut self, ctx: &HandlerContext<'_>) -> Result<(), HandlerError> {
            ctx.send(SystemMessage {
                message: self.chat.message.clone(),
            });
            Ok(())
        }
    }

    struct GuardedHandler {
        level: u8,
        room: bool,
    }

    impl Handler for GuardedHandler {
        fn requires_room(&self) -> bool {
            self.room
        }

        fn required_level(&self) -> u8 {
            self.level
        }

        fn on_unauthenticated(&self, ctx: &HandlerContext<'_>) {
            ctx.send(SystemMessage {
                message: "login first".to_string(),
            });
        }

        fn on_forbidden(&self, ctx: &HandlerContext<'_>) {
            ctx.send(SystemMessage {
                message: "forbidden".to_string(),
            });
        }

        fn handle(&mut self, ctx: &HandlerContext<'_>) -> Result<(), HandlerError> {
            ctx.send(ServerPingResponse {});
            Ok(())
        }
    }

    struct FailingHandler {
        panic: bool,
    }

    impl Handler for FailingHandler {
        fn requires_login(&self) -> bool {
            false
        }

        fn handle(&mut self, ctx: &HandlerContext<'_>) -> Result<(), HandlerError> {
            ctx.conn.with_session(|s| {
                if self.panic {
                    panic!("handler bug");
                }
                s.ready = true;
            });
            Err(HandlerError::InvalidRequest("nope".to_string()))
        }
    }

    fn test_server() -> Server {
        Server::new(ServerConfig::default(), Arc::new(MemoryStorage::new()))
    }

    fn echo_dispatcher() -> Dispatcher {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(Command::ClientChat, |packet| match packet {
            Packet::ClientChat(chat) => Some(EchoHandler { chat }),
            _ => None,
        });
        dispatcher
    }

    fn login(server: &Server, conn: &Arc<Connection>) -> SessionUser {
        let user = server.storage().create_user("dancer", "").unwrap();
        let user = SessionUser {
            id: user.id,
            name: user.name,
        };
        conn.with_session(|s| s.user = Some(user.clone()));
        user
    }

    #[test]
    fn test_dispatch_to_registered_handler() {
        let server = test_server();
        let dispatcher = echo_dispatcher();
        let (conn, mut rx) = test_connection();

        let outcome = dispatcher.dispatch(
            &server,
            &conn,
            ClientChat {
                message: "hello".to_string(),
            }
            .into(),
        );
        assert_eq!(outcome, DispatchOutcome::Handled);
        assert_eq!(
            drain(&mut rx),
            vec![Packet::from(SystemMessage {
                message: "hello".to_string(),
            })]
        );
    }

    #[test]
    fn test_unknown_command_is_dropped() {
        let server = test_server();
        let dispatcher = echo_dispatcher();
        let (conn, mut rx) = test_connection();

        let unknown = Packet::Unknown {
            command: 9999,
            raw: b"{\"_command\":9999}".to_vec(),
        };
        assert_eq!(
            dispatcher.dispatch(&server, &conn, unknown),
            DispatchOutcome::UnknownCommand(9999)
        );
        assert_eq!(
            dispatcher.dispatch(&server, &conn, ClientPing {}.into()),
            DispatchOutcome::UnknownCommand(0)
        );
        assert!(drain(&mut rx).is_empty());

        // The connection keeps working
        assert_eq!(
            dispatcher.dispatch(&server, &conn, ClientChat::default().into()),
            DispatchOutcome::Handled
        );
    }

    #[test]
    fn test_dispatch_updates_last_seen() {
        let server = test_server();
        let (conn, _rx) = test_connection();
        conn.with_session(|s| s.last_seen = 0);

        echo_dispatcher().dispatch(&server, &conn, ClientPing {}.into());
        assert!(conn.with_session(|s| s.last_seen) > 0);
    }

    #[test]
    fn test_login_required() {
        let server = test_server();
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(Command::ClientPing, |_| {
            Some(GuardedHandler {
                level: 0,
                room: false,
            })
        });
        let (conn, mut rx) = test_connection();

        assert_eq!(
            dispatcher.dispatch(&server, &conn, ClientPing {}.into()),
            DispatchOutcome::AuthenticationRequired
        );
        assert_eq!(
            drain(&mut rx),
            vec![Packet::from(SystemMessage {
                message: "login first".to_string(),
            })]
        );

        login(&server, &conn);
        assert_eq!(
            dispatcher.dispatch(&server, &conn, ClientPing {}.into()),
            DispatchOutcome::Handled
        );
        assert_eq!(drain(&mut rx), vec![Packet::from(ServerPingResponse {})]);
    }

    #[test]
    fn test_room_required() {
        let server = test_server();
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(Command::ClientPing, |_| {
            Some(GuardedHandler {
                level: 0,
                room: true,
            })
        });
        let (conn, mut rx) = test_connection();
        login(&server, &conn);

        assert_eq!(
            dispatcher.dispatch(&server, &conn, ClientPing {}.into()),
            DispatchOutcome::RoomRequired
        );
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_level_is_checked_in_current_room() {
        let server = test_server();
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(Command::ClientPing, |_| {
            Some(GuardedHandler {
                level: OWNER_LEVEL,
                room: true,
            })
        });
        let (conn, mut rx) = test_connection();
        let user = login(&server, &conn);
        let room = server.storage().create_room("Lobby", "", None).unwrap();
        conn.with_session(|s| s.room = Some(room.id));

        assert_eq!(
            dispatcher.dispatch(&server, &conn, ClientPing {}.into()),
            DispatchOutcome::Forbidden
        );
        assert_eq!(
            drain(&mut rx),
            vec![Packet::from(SystemMessage {
                message: "forbidden".to_string(),
            })]
        );

        server
            .storage()
            .set_room_level(user.id, room.id, OWNER_LEVEL)
            .unwrap();
        assert_eq!(
            dispatcher.dispatch(&server, &conn, ClientPing {}.into()),
            DispatchOutcome::Handled
        );
    }

    #[test]
    fn test_handler_error_keeps_connection() {
        let server = test_server();
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(Command::ClientPing, |_| Some(FailingHandler { panic: false }));
        let (conn, _rx) = test_connection();

        assert_eq!(
            dispatcher.dispatch(&server, &conn, ClientPing {}.into()),
            DispatchOutcome::HandlerFault
        );
        assert!(conn.is_ready());
    }

    #[test]
    fn test_handler_panic_is_contained() {
        let server = test_server();
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(Command::ClientPing, |_| Some(FailingHandler { panic: true }));
        dispatcher.register(Command::ClientChat, |packet| match packet {
            Packet::ClientChat(chat) => Some(EchoHandler { chat }),
            _ => None,
        });
        let (conn, mut rx) = test_connection();

        assert_eq!(
            dispatcher.dispatch(&server, &conn, ClientPing {}.into()),
            DispatchOutcome::HandlerFault
        );

        // The session lock is usable again after the panic
        assert!(!conn.is_ready());
        assert_eq!(
            dispatcher.dispatch(&server, &conn, ClientChat::default().into()),
            DispatchOutcome::Handled
        );
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn test_default_handlers_cover_client_commands() {
        let dispatcher = Dispatcher::with_default_handlers();
        for command in [
            Command::ClientPing,
            Command::ClientPingResponse,
            Command::ClientHello,
            Command::GameStartRequest,
            Command::GameOverNotice,
            Command::GameStatusUpdate,
            Command::ClientChat,
            Command::ClientRequestStartGame,
            Command::ScreenStatus,
            Command::Login,
            Command::EnterRoom,
            Command::CreateRoom,
            Command::Logout,
        ] {
            assert!(dispatcher.handles(command), "{:?} has no handler", command);
        }
        assert!(!dispatcher.handles(Command::AllowStart));
    }
}

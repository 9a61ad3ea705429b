//! Built-in command handlers
//!
//! One module per protocol area. Each handler is built from its packet by a
//! `from_packet` constructor, which is also the factory registered with the
//! [`Dispatcher`].

pub mod chat;
pub mod game_start;
pub mod game_status;
pub mod hello;
pub mod login;
pub mod ping;
pub mod room;
pub mod screen;
pub mod song;

use crate::dispatcher::Dispatcher;
use shared::Command;

/// Registers every built-in handler
pub fn register_all(dispatcher: &mut Dispatcher) {
    dispatcher.register(Command::ClientPing, ping::PingHandler::from_packet);
    dispatcher.register(Command::ClientPingResponse, ping::PongHandler::from_packet);
    dispatcher.register(Command::ClientHello, hello::HelloHandler::from_packet);
    dispatcher.register(Command::Login, login::LoginHandler::from_packet);
    dispatcher.register(Command::Logout, login::LogoutHandler::from_packet);
    dispatcher.register(Command::CreateRoom, room::CreateRoomHandler::from_packet);
    dispatcher.register(Command::EnterRoom, room::EnterRoomHandler::from_packet);
    dispatcher.register(Command::ClientChat, chat::ChatHandler::from_packet);
    dispatcher.register(Command::ScreenStatus, screen::ScreenStatusHandler::from_packet);
    dispatcher.register(
        Command::ClientRequestStartGame,
        song::SongSelectionHandler::from_packet,
    );
    dispatcher.register(
        Command::GameStartRequest,
        game_start::GameStartHandler::from_packet,
    );
    dispatcher.register(
        Command::GameStatusUpdate,
        game_status::GameStatusHandler::from_packet,
    );
    dispatcher.register(
        Command::GameOverNotice,
        game_status::GameOverHandler::from_packet,
    );
}

//! Protocol messages exchanged between the game client and the session server
//!
//! Every command has a stable numeric identifier and a payload struct. The
//! payload's fields are serialized in declaration order by the binary
//! encoding and by name by the JSON encoding, so reordering fields is a
//! protocol break while adding a new command is not.
//!
//! Client commands occupy `0..128`, server commands `128..256`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Source of a command payload for one transport encoding
pub(crate) trait PayloadReader {
    type Error;

    fn read<T: DeserializeOwned>(self) -> Result<T, Self::Error>;
}

/// Sink for a command payload for one transport encoding
pub(crate) trait PayloadWriter {
    type Output;
    type Error;

    fn write<T: Serialize>(self, payload: &T) -> Result<Self::Output, Self::Error>;
}

macro_rules! packets {
    ($($(#[$doc:meta])* $variant:ident($payload:ident) = $id:literal,)*) => {
        /// Known command identifiers
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum Command {
            $($(#[$doc])* $variant = $id,)*
        }

        impl Command {
            /// Wire identifier of this command
            pub const fn id(self) -> u8 {
                self as u8
            }

            /// Looks up a command by identifier, `None` for ids this build does not know
            pub fn from_id(id: u32) -> Option<Self> {
                match id {
                    $($id => Some(Command::$variant),)*
                    _ => None,
                }
            }
        }

        /// One decoded protocol unit
        #[derive(Debug, Clone, PartialEq)]
        pub enum Packet {
            $($variant($payload),)*
            /// A command this build does not know, kept verbatim so it can be
            /// forwarded or logged instead of failing the connection
            Unknown { command: u32, raw: Vec<u8> },
        }

        impl Packet {
            /// The known command of this packet, `None` for [`Packet::Unknown`]
            pub fn command(&self) -> Option<Command> {
                match self {
                    $(Packet::$variant(_) => Some(Command::$variant),)*
                    Packet::Unknown { .. } => None,
                }
            }

            pub(crate) fn read_payload<R: PayloadReader>(
                command: Command,
                reader: R,
            ) -> Result<Self, R::Error> {
                match command {
                    $(Command::$variant => reader.read::<$payload>().map(Packet::$variant),)*
                }
            }

            /// Serializes the payload of a known packet; `None` for unknown packets
            pub(crate) fn write_payload<W: PayloadWriter>(
                &self,
                writer: W,
            ) -> Option<Result<W::Output, W::Error>> {
                match self {
                    $(Packet::$variant(payload) => Some(writer.write(payload)),)*
                    Packet::Unknown { .. } => None,
                }
            }
        }

        $(
            impl From<$payload> for Packet {
                fn from(payload: $payload) -> Self {
                    Packet::$variant(payload)
                }
            }
        )*
    };
}

packets! {
    ClientPing(ClientPing) = 0,
    ClientPingResponse(ClientPingResponse) = 1,
    ClientHello(ClientHello) = 2,
    /// Ask to start the selected song; answered by [`Command::AllowStart`]
    /// once every participant has asked
    GameStartRequest(GameStartRequest) = 3,
    GameOverNotice(GameOverNotice) = 4,
    GameStatusUpdate(GameStatusUpdate) = 5,
    ClientChat(ClientChat) = 7,
    ClientRequestStartGame(ClientRequestStartGame) = 8,
    ScreenStatus(ScreenStatus) = 10,
    Login(Login) = 12,
    EnterRoom(EnterRoom) = 13,
    CreateRoom(CreateRoom) = 14,
    Logout(Logout) = 15,

    ServerPing(ServerPing) = 128,
    ServerPingResponse(ServerPingResponse) = 129,
    ServerHello(ServerHello) = 130,
    /// Synchronized start signal released by the room barrier
    AllowStart(AllowStart) = 131,
    SystemMessage(SystemMessage) = 134,
    ServerChat(ServerChat) = 135,
    ServerRequestStartGame(ServerRequestStartGame) = 136,
    UserList(UserList) = 137,
    LoginResponse(LoginResponse) = 140,
    RoomList(RoomList) = 141,
    EnterRoomResponse(EnterRoomResponse) = 142,
}

impl Packet {
    /// Numeric identifier, including the identifier of unknown packets
    pub fn command_id(&self) -> u32 {
        match self {
            Packet::Unknown { command, .. } => *command,
            known => known.command().map_or(0, |c| u32::from(c.id())),
        }
    }
}

/// What a song-selection packet means, carried in its `usage` byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SongUsage {
    /// The sender has the song locally and can play it
    HasSong = 0,
    /// The sender does not have the song
    MissingSong = 1,
    /// The sender picks this song for the room
    Select = 2,
}

impl SongUsage {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(SongUsage::HasSong),
            1 => Some(SongUsage::MissingSong),
            2 => Some(SongUsage::Select),
            _ => None,
        }
    }
}

// Client -> server

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientPing {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientPingResponse {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientHello {
    pub version: u8,
    pub name: String,
}

/// Start request for one song, carrying both player slots
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStartRequest {
    pub first_player_feet: u8,
    pub second_player_feet: u8,
    pub first_player_difficulty: u8,
    pub second_player_difficulty: u8,
    pub start_position: u8,
    pub song_title: String,
    pub song_subtitle: String,
    pub song_artist: String,
    pub course_title: String,
    pub song_options: String,
    pub first_player_options: String,
    pub second_player_options: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameOverNotice {}

/// Per-step progress of one player during a song
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStatusUpdate {
    pub player_id: u8,
    pub step_id: u8,
    pub grade: u8,
    pub score: u32,
    pub combo: u16,
    pub health: u16,
    /// Timing offset of the step in milliseconds, negative when early
    pub offset: i16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientChat {
    pub message: String,
}

/// Song selection handshake, see [`SongUsage`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRequestStartGame {
    pub usage: u8,
    pub song_title: String,
    pub song_artist: String,
    pub song_subtitle: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenStatus {
    pub action: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Login {
    pub player_number: u8,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnterRoom {
    /// `false` leaves the current room
    pub enter: bool,
    pub room_name: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRoom {
    pub room_type: u8,
    pub title: String,
    pub description: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Logout {}

// Server -> client

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerPing {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerPingResponse {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerHello {
    pub version: u8,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowStart {
    /// Synchronized start time in milliseconds since the Unix epoch, equal
    /// for every participant of one release
    pub start_at: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemMessage {
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerChat {
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRequestStartGame {
    pub usage: u8,
    pub song_title: String,
    pub song_artist: String,
    pub song_subtitle: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    pub status: u8,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserList {
    pub max_players: u8,
    pub users: Vec<UserEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub approval: bool,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomEntry {
    pub title: String,
    pub description: String,
    pub status: u8,
    pub player_count: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomList {
    pub rooms: Vec<RoomEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnterRoomResponse {
    pub entered: bool,
    pub room_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_ids_are_stable() {
        assert_eq!(Command::ClientPing.id(), 0);
        assert_eq!(Command::GameStartRequest.id(), 3);
        assert_eq!(Command::Login.id(), 12);
        assert_eq!(Command::ServerHello.id(), 130);
        assert_eq!(Command::AllowStart.id(), 131);
        assert_eq!(Command::EnterRoomResponse.id(), 142);
    }

    #[test]
    fn test_command_lookup() {
        assert_eq!(Command::from_id(2), Some(Command::ClientHello));
        assert_eq!(Command::from_id(137), Some(Command::UserList));
        assert_eq!(Command::from_id(6), None);
        assert_eq!(Command::from_id(9999), None);
    }

    #[test]
    fn test_packet_command() {
        let packet = Packet::from(ClientChat {
            message: "hi".to_string(),
        });
        assert_eq!(packet.command(), Some(Command::ClientChat));
        assert_eq!(packet.command_id(), 7);

        let unknown = Packet::Unknown {
            command: 9999,
            raw: Vec::new(),
        };
        assert_eq!(unknown.command(), None);
        assert_eq!(unknown.command_id(), 9999);
    }

    #[test]
    fn test_song_usage() {
        assert_eq!(SongUsage::from_u8(0), Some(SongUsage::HasSong));
        assert_eq!(SongUsage::from_u8(1), Some(SongUsage::MissingSong));
        assert_eq!(SongUsage::from_u8(2), Some(SongUsage::Select));
        assert_eq!(SongUsage::from_u8(3), None);
    }
}

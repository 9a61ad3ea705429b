//! Integration tests for the session server
//!
//! These tests run the real listeners on ephemeral ports and talk to them
//! over TCP in both encodings.

use server::config::ServerConfig;
use server::dispatcher::Dispatcher;
use server::facade::Server;
use server::network::NetworkServer;
use server::storage::MemoryStorage;
use shared::{
    ClientHello, ClientPing, ClientRequestStartGame, CodecError, CreateRoom, EnterRoom, Encoding,
    GameStartRequest, Login, Packet, ServerPing, ServerPingResponse, SongUsage,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

const REPLY_TIMEOUT: Duration = Duration::from_secs(2);

struct Addrs {
    binary: SocketAddr,
    json: SocketAddr,
}

impl Addrs {
    fn for_encoding(&self, encoding: Encoding) -> SocketAddr {
        match encoding {
            Encoding::Binary => self.binary,
            Encoding::Json => self.json,
        }
    }
}

async fn start_server(config: ServerConfig) -> Addrs {
    let config = ServerConfig {
        binary_addr: "127.0.0.1:0".to_string(),
        json_addr: "127.0.0.1:0".to_string(),
        ..config
    };
    let server = Arc::new(Server::new(config, Arc::new(MemoryStorage::new())));
    let network = NetworkServer::bind(server, Arc::new(Dispatcher::with_default_handlers()))
        .await
        .expect("Failed to bind listeners");
    let addrs = Addrs {
        binary: network.binary_addr().unwrap(),
        json: network.json_addr().unwrap(),
    };
    tokio::spawn(network.run_until(std::future::pending()));
    addrs
}

struct TestClient {
    stream: TcpStream,
    encoding: Encoding,
    buffer: Vec<u8>,
}

impl TestClient {
    async fn connect(addrs: &Addrs, encoding: Encoding) -> Self {
        let stream = TcpStream::connect(addrs.for_encoding(encoding))
            .await
            .expect("Failed to connect");
        Self {
            stream,
            encoding,
            buffer: Vec::new(),
        }
    }

    async fn send(&mut self, packet: impl Into<Packet>) {
        let bytes = self.encoding.encode(&packet.into()).unwrap();
        self.stream.write_all(&bytes).await.unwrap();
    }

    async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    /// Next packet other than a keepalive ping
    async fn recv(&mut self) -> Packet {
        loop {
            match self.encoding.decode(&self.buffer) {
                Ok((packet, used)) => {
                    self.buffer.drain(..used);
                    if packet != Packet::from(ServerPing {}) {
                        return packet;
                    }
                }
                Err(CodecError::IncompleteFrame) => {
                    let mut chunk = [0u8; 1024];
                    let read = timeout(REPLY_TIMEOUT, self.stream.read(&mut chunk))
                        .await
                        .expect("Timed out waiting for the server")
                        .unwrap();
                    assert!(read > 0, "Server closed the connection");
                    self.buffer.extend_from_slice(&chunk[..read]);
                }
                Err(e) => panic!("Server sent an undecodable message: {}", e),
            }
        }
    }

    /// Skips packets until `select` accepts one
    async fn wait_for<T>(&mut self, select: impl Fn(&Packet) -> Option<T>) -> T {
        loop {
            let packet = self.recv().await;
            if let Some(found) = select(&packet) {
                return found;
            }
        }
    }

    /// Pings and collects everything received before the answer
    async fn fence(&mut self) -> Vec<Packet> {
        self.send(ClientPing {}).await;
        let mut before = Vec::new();
        loop {
            let packet = self.recv().await;
            if packet == Packet::from(ServerPingResponse {}) {
                return before;
            }
            before.push(packet);
        }
    }

    async fn login(&mut self, name: &str) {
        self.send(Login {
            player_number: 0,
            username: name.to_string(),
            password: String::new(),
        })
        .await;
        let approved = self
            .wait_for(|packet| match packet {
                Packet::LoginResponse(response) => Some(response.approval),
                _ => None,
            })
            .await;
        assert!(approved, "{} was not logged in", name);
    }

    async fn create_room(&mut self, title: &str) {
        self.send(CreateRoom {
            room_type: 0,
            title: title.to_string(),
            description: String::new(),
            password: String::new(),
        })
        .await;
        self.wait_entered().await;
    }

    async fn enter_room(&mut self, name: &str) {
        self.send(EnterRoom {
            enter: true,
            room_name: name.to_string(),
            password: String::new(),
        })
        .await;
        self.wait_entered().await;
    }

    async fn wait_entered(&mut self) {
        let entered = self
            .wait_for(|packet| match packet {
                Packet::EnterRoomResponse(response) => Some(response.entered),
                _ => None,
            })
            .await;
        assert!(entered);
    }

    async fn song(&mut self, usage: SongUsage) {
        self.send(ClientRequestStartGame {
            usage: usage as u8,
            song_title: "Song".to_string(),
            song_artist: "Artist".to_string(),
            song_subtitle: String::new(),
        })
        .await;
    }

    async fn request_start(&mut self) {
        self.send(GameStartRequest {
            first_player_feet: 9,
            song_title: "Song".to_string(),
            song_artist: "Artist".to_string(),
            ..GameStartRequest::default()
        })
        .await;
    }

    async fn wait_start(&mut self) -> u64 {
        self.wait_for(|packet| match packet {
            Packet::AllowStart(allow) => Some(allow.start_at),
            _ => None,
        })
        .await
    }
}

fn has_start(packets: &[Packet]) -> bool {
    packets
        .iter()
        .any(|packet| matches!(packet, Packet::AllowStart(_)))
}

/// WIRE PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    fn hello() -> ClientHello {
        ClientHello {
            version: 40,
            name: "stepmania".to_string(),
        }
    }

    #[tokio::test]
    async fn hello_in_both_encodings() {
        let addrs = start_server(ServerConfig::default()).await;

        for encoding in [Encoding::Binary, Encoding::Json] {
            let mut client = TestClient::connect(&addrs, encoding).await;
            client.send(hello()).await;
            match client.recv().await {
                Packet::ServerHello(reply) => assert_eq!(reply.name, "stepnet"),
                other => panic!("Expected a server hello, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn binary_frame_fed_byte_by_byte() {
        let addrs = start_server(ServerConfig::default()).await;
        let mut client = TestClient::connect(&addrs, Encoding::Binary).await;

        let frame = Encoding::Binary.encode(&hello().into()).unwrap();
        for byte in frame {
            client.send_raw(&[byte]).await;
            client.stream.flush().await.unwrap();
        }
        assert!(matches!(client.recv().await, Packet::ServerHello(_)));
    }

    #[tokio::test]
    async fn unknown_command_keeps_connection_usable() {
        let addrs = start_server(ServerConfig::default()).await;
        let mut client = TestClient::connect(&addrs, Encoding::Json).await;

        let unknown = serde_json::json!({ "_command": 9999, "payload": [1, 2, 3] });
        client.send_raw(format!("{}\n", unknown).as_bytes()).await;
        client.send_raw(b"this is not json\n").await;

        assert!(client.fence().await.is_empty());
        client.send(hello()).await;
        assert!(matches!(client.recv().await, Packet::ServerHello(_)));
    }

    #[tokio::test]
    async fn oversized_frame_closes_connection() {
        let config = ServerConfig {
            max_frame_size: 64,
            ..ServerConfig::default()
        };
        let addrs = start_server(config).await;
        let mut client = TestClient::connect(&addrs, Encoding::Binary).await;

        client.send_raw(&1000u32.to_be_bytes()).await;
        let mut chunk = [0u8; 64];
        let read = timeout(REPLY_TIMEOUT, client.stream.read(&mut chunk))
            .await
            .expect("Server kept the connection open");
        assert!(matches!(read, Ok(0) | Err(_)));
    }
}

/// SESSION TESTS
mod session_tests {
    use super::*;

    #[tokio::test]
    async fn room_commands_require_login() {
        let addrs = start_server(ServerConfig::default()).await;
        let mut client = TestClient::connect(&addrs, Encoding::Binary).await;

        client
            .send(CreateRoom {
                room_type: 0,
                title: "Arena".to_string(),
                description: String::new(),
                password: String::new(),
            })
            .await;
        assert!(client.fence().await.is_empty());

        client.login("dancer").await;
        client.create_room("Arena").await;
    }

    #[tokio::test]
    async fn encodings_share_one_room() {
        let addrs = start_server(ServerConfig::default()).await;
        let mut alice = TestClient::connect(&addrs, Encoding::Binary).await;
        let mut bob = TestClient::connect(&addrs, Encoding::Json).await;

        alice.login("alice").await;
        alice.create_room("Arena").await;
        bob.login("bob").await;
        bob.enter_room("Arena").await;

        bob.send(shared::ClientChat {
            message: "hello alice".to_string(),
        })
        .await;
        let line = alice
            .wait_for(|packet| match packet {
                Packet::ServerChat(chat) => Some(chat.message.clone()),
                _ => None,
            })
            .await;
        assert_eq!(line, "bob: hello alice");
    }
}

/// ROOM START BARRIER TESTS
mod barrier_tests {
    use super::*;

    #[tokio::test]
    async fn two_players_start_together() {
        let addrs = start_server(ServerConfig::default()).await;
        let mut alice = TestClient::connect(&addrs, Encoding::Binary).await;
        let mut bob = TestClient::connect(&addrs, Encoding::Json).await;

        alice.login("alice").await;
        alice.create_room("Arena").await;
        bob.login("bob").await;
        bob.enter_room("Arena").await;

        alice.song(SongUsage::Select).await;
        let offered = bob
            .wait_for(|packet| match packet {
                Packet::ServerRequestStartGame(offer) => Some(offer.song_title.clone()),
                _ => None,
            })
            .await;
        assert_eq!(offered, "Song");
        bob.song(SongUsage::HasSong).await;
        bob.fence().await;

        alice.request_start().await;
        assert!(!has_start(&alice.fence().await));

        bob.request_start().await;
        let bob_start = bob.wait_start().await;
        let alice_start = alice.wait_start().await;
        assert_eq!(alice_start, bob_start);

        // The room shows up as playing
        alice.send(shared::ScreenStatus { action: 7 }).await;
        let list = alice
            .wait_for(|packet| match packet {
                Packet::RoomList(list) => Some(list.clone()),
                _ => None,
            })
            .await;
        assert_eq!(list.rooms[0].title, "Arena");
        assert_eq!(list.rooms[0].status, 2);
        assert_eq!(list.rooms[0].player_count, 2);
    }

    #[tokio::test]
    async fn disconnect_during_handshake_releases_the_rest() {
        let addrs = start_server(ServerConfig::default()).await;
        let mut alice = TestClient::connect(&addrs, Encoding::Binary).await;
        let mut bob = TestClient::connect(&addrs, Encoding::Binary).await;
        let mut carol = TestClient::connect(&addrs, Encoding::Json).await;

        alice.login("alice").await;
        alice.create_room("Arena").await;
        bob.login("bob").await;
        bob.enter_room("Arena").await;
        carol.login("carol").await;
        carol.enter_room("Arena").await;

        alice.song(SongUsage::Select).await;
        alice.fence().await;
        for client in [&mut bob, &mut carol] {
            client.song(SongUsage::HasSong).await;
            client.fence().await;
        }

        alice.request_start().await;
        bob.request_start().await;
        assert!(!has_start(&alice.fence().await));
        assert!(!has_start(&bob.fence().await));

        drop(carol);
        let alice_start = alice.wait_start().await;
        let bob_start = bob.wait_start().await;
        assert_eq!(alice_start, bob_start);
    }

    #[tokio::test]
    async fn solo_room_starts_immediately() {
        let addrs = start_server(ServerConfig::default()).await;
        let mut solo = TestClient::connect(&addrs, Encoding::Json).await;

        solo.login("solo").await;
        solo.create_room("Practice").await;
        solo.request_start().await;
        solo.wait_start().await;

        // A second request mid-song does not start it again
        solo.request_start().await;
        assert!(!has_start(&solo.fence().await));
    }
}

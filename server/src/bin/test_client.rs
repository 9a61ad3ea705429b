//! Smoke-test client: says hello, logs in, enters a room and plays one song

use clap::Parser;
use shared::{
    ClientHello, CreateRoom, Encoding, GameOverNotice, GameStartRequest, Login, Packet,
    PROTOCOL_VERSION,
};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8765")]
    server: String,

    /// Speak the JSON protocol instead of the binary one
    #[arg(long)]
    json: bool,

    /// User name to log in with
    #[arg(short, long, default_value = "tester")]
    user: String,

    /// Room to create and play in
    #[arg(short, long, default_value = "smoke test")]
    room: String,
}

struct TestClient {
    stream: TcpStream,
    encoding: Encoding,
    buffer: Vec<u8>,
}

impl TestClient {
    async fn send(&mut self, packet: impl Into<Packet>) -> Result<(), Box<dyn std::error::Error>> {
        let packet = packet.into();
        println!("-> {:?}", packet);
        self.stream.write_all(&self.encoding.encode(&packet)?).await?;
        Ok(())
    }

    /// Prints everything received until the server has been quiet for a while
    async fn print_replies(&mut self) -> Result<Vec<Packet>, Box<dyn std::error::Error>> {
        let mut packets = Vec::new();
        let mut chunk = [0u8; 2048];

        while let Ok(read) = timeout(Duration::from_millis(500), self.stream.read(&mut chunk)).await {
            let read = read?;
            if read == 0 {
                println!("Server closed the connection");
                break;
            }
            self.buffer.extend_from_slice(&chunk[..read]);

            while let Ok((packet, used)) = self.encoding.decode(&self.buffer) {
                self.buffer.drain(..used);
                println!("<- {:?}", packet);
                packets.push(packet);
            }
        }
        Ok(packets)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let encoding = if args.json {
        Encoding::Json
    } else {
        Encoding::Binary
    };

    println!("Connecting to {} ({})", args.server, encoding);
    let mut client = TestClient {
        stream: TcpStream::connect(&args.server).await?,
        encoding,
        buffer: Vec::new(),
    };

    client
        .send(ClientHello {
            version: PROTOCOL_VERSION,
            name: "test_client".to_string(),
        })
        .await?;
    client
        .send(Login {
            player_number: 0,
            username: args.user.clone(),
            password: String::new(),
        })
        .await?;
    client
        .send(CreateRoom {
            room_type: 0,
            title: args.room.clone(),
            description: "created by test_client".to_string(),
            password: String::new(),
        })
        .await?;
    client.print_replies().await?;

    client
        .send(GameStartRequest {
            first_player_feet: 5,
            song_title: "Test Song".to_string(),
            song_artist: "Test Artist".to_string(),
            ..GameStartRequest::default()
        })
        .await?;
    let replies = client.print_replies().await?;

    match replies.iter().find_map(|packet| match packet {
        Packet::AllowStart(allow) => Some(allow.start_at),
        _ => None,
    }) {
        Some(start_at) => println!("Song starts at {}", start_at),
        None => println!("No start signal received"),
    }

    client.send(GameOverNotice {}).await?;
    client.print_replies().await?;

    println!("Test client finished");
    Ok(())
}

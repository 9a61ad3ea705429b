//! Runtime configuration of the session server

use shared::DEFAULT_MAX_FRAME_SIZE;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address of the length-framed binary listener
    pub binary_addr: String,
    /// Address of the newline-delimited JSON listener
    pub json_addr: String,
    /// Name announced in the server hello
    pub name: String,
    /// Message sent to users after login, empty for none
    pub motd: String,
    pub max_connections: usize,
    /// Player count advertised in user lists
    pub max_players: u8,
    pub ping_interval: Duration,
    /// Connections silent for longer than this are dropped
    pub idle_timeout: Duration,
    pub max_frame_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            binary_addr: "127.0.0.1:8765".to_string(),
            json_addr: "127.0.0.1:8766".to_string(),
            name: "stepnet".to_string(),
            motd: String::new(),
            max_connections: 256,
            max_players: 255,
            ping_interval: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(30),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

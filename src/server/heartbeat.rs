use crate::protocol::ServerMessage;

use super::message_router::HandlerResult;
use super::GameServer;

impl GameServer {
    /// `ping` needs no authentication; the reply carries server time so
    /// clients can sync their clocks.
    pub(crate) fn handle_ping(&self) -> HandlerResult {
        HandlerResult::reply(ServerMessage::Pong {
            server_time: chrono::Utc::now(),
        })
    }
}

use std::sync::Arc;

use rampart::config::Config;
use rampart::http::{ContentType, ServerConnection, ServerHandler, StatusCode};
use rampart::server;
use rampart::websocket::{Message, MessageType, OpCode};

/// Demo application: a greeting, a health check and a WebSocket echo of
/// `Call` messages.
struct App;

impl ServerHandler for App {
    fn on_request(&self, conn: &mut ServerConnection) {
        match conn.request().path() {
            "/" => {
                conn.reply_mut().content = b"Hello from rampart\n".to_vec();
                conn.send_reply(StatusCode::Ok, Some(ContentType::Text));
            }
            "/health" => {
                conn.reply_mut().content = br#"{"status":"ok"}"#.to_vec();
                conn.send_reply(StatusCode::Ok, Some(ContentType::Json));
            }
            "/ws" => {
                if !conn.switching_protocols(None) {
                    conn.send_stock_reply(StatusCode::BadRequest);
                }
            }
            _ => conn.send_stock_reply(StatusCode::NotFound),
        }
    }

    fn on_web_socket(&self, conn: &mut ServerConnection) {
        if conn.web_socket().opcode() != Some(OpCode::Text) {
            return;
        }
        let text = String::from_utf8_lossy(conn.web_socket().payload()).into_owned();

        let reply = match Message::from_json(&text) {
            Ok(message) if message.message_type == MessageType::Call => {
                message.call_result(message.payload.clone())
            }
            Ok(message) => message.call_error(400, "only Call messages are accepted"),
            Err(e) => {
                tracing::warn!(conn = conn.id(), error = %e, "Invalid WebSocket message");
                return;
            }
        };
        match reply.to_json() {
            Ok(json) => conn.send_web_socket_text(&json),
            Err(e) => tracing::error!(conn = conn.id(), error = %e, "Cannot encode reply"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;

    tokio::select! {
        res = server::run(&cfg, Arc::new(App)) => {
            res?;
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}

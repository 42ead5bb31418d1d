use crate::error::ChartError;
use crate::game::types::FeedConfig;
use crate::game::SUBSCRIBE_MESSAGE;
use futures_util::SinkExt;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};

pub type GameWsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Serialize)]
struct SubscribeData<'a> {
    channel: &'a str,
}

#[derive(Debug, Serialize)]
struct SubscribeFrame<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    data: SubscribeData<'a>,
}

pub(crate) fn ws_endpoint(config: &FeedConfig) -> String {
    match config.room_id.as_deref() {
        Some(room_id) => {
            let separator = if config.url.contains('?') { '&' } else { '?' };
            format!("{}{separator}roomId={room_id}", config.url)
        }
        None => config.url.clone(),
    }
}

pub(crate) fn subscribe_payload(channel: &str) -> Result<String, ChartError> {
    let frame = SubscribeFrame {
        kind: SUBSCRIBE_MESSAGE,
        data: SubscribeData { channel },
    };
    Ok(simd_json::serde::to_string(&frame)?)
}

pub async fn connect_game_stream(config: &FeedConfig) -> Result<GameWsStream, ChartError> {
    let ws_config = WebSocketConfig {
        max_message_size: Some(64 << 20),
        max_frame_size: Some(16 << 20),
        ..Default::default()
    };

    let request = ws_endpoint(config);
    let (mut stream, _) = connect_async_with_config(request, Some(ws_config), true).await?;
    stream
        .send(Message::Text(subscribe_payload(&config.channel)?))
        .await?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::types::FeedArgs;

    fn config(url: &str, room_id: Option<&str>) -> FeedConfig {
        FeedArgs {
            url: Some(url.to_string()),
            room_id: room_id.map(str::to_string),
            ..FeedArgs::default()
        }
        .normalize()
        .expect("feed args should be valid")
    }

    #[test]
    fn main_game_endpoint_is_base_url() {
        let endpoint = ws_endpoint(&config("ws://localhost:3001/ws", None));
        assert_eq!(endpoint, "ws://localhost:3001/ws");
    }

    #[test]
    fn room_endpoint_appends_room_query() {
        let endpoint = ws_endpoint(&config("wss://game.example/ws", Some("room-42")));
        assert_eq!(endpoint, "wss://game.example/ws?roomId=room-42");
    }

    #[test]
    fn room_endpoint_extends_existing_query() {
        let endpoint = ws_endpoint(&config("ws://localhost:3001/ws?v=2", Some("r1")));
        assert_eq!(endpoint, "ws://localhost:3001/ws?v=2&roomId=r1");
    }

    #[test]
    fn subscribe_payload_names_channel() {
        let payload = subscribe_payload("crash").expect("payload should serialize");
        assert_eq!(payload, r#"{"type":"subscribe","data":{"channel":"crash"}}"#);
    }
}

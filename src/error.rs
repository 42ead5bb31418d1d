use serde::ser::Serializer;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("unknown message type: {0}")]
    UnknownMessage(String),
    #[error("room session not found: {0}")]
    SessionNotFound(String),
    #[error("websocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("json decode error: {0}")]
    SimdJson(#[from] simd_json::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for ChartError {
    fn from(value: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(value))
    }
}

impl serde::Serialize for ChartError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_display_string() {
        let error = ChartError::SessionNotFound("room-9".to_string());
        let encoded = simd_json::serde::to_string(&error).expect("error should serialize");
        assert_eq!(encoded, r#""room session not found: room-9""#);
    }

    #[test]
    fn boxes_websocket_errors() {
        let error: ChartError = tokio_tungstenite::tungstenite::Error::ConnectionClosed.into();
        assert!(matches!(error, ChartError::WebSocket(_)));
        assert!(error.to_string().starts_with("websocket error:"));
    }
}

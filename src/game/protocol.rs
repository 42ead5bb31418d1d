use crate::error::ChartError;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use simd_json::OwnedValue;

use super::{COUNTDOWN_MESSAGE, GAME_END_MESSAGE, GAME_START_MESSAGE, PRICE_UPDATE_MESSAGE};

/// Canonical inbound event, independent of transport and message spelling.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    RoundStarted {
        round_id: String,
        baseline_value: Option<f64>,
    },
    CountdownTick {
        seconds_remaining: f64,
    },
    PriceTick {
        value: f64,
        round_id: Option<String>,
        round_ended: bool,
    },
    RoundEnded {
        peak_value: f64,
        abnormal_termination: bool,
        round_id: Option<String>,
    },
}

impl GameEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RoundStarted { .. } => GAME_START_MESSAGE,
            Self::CountdownTick { .. } => COUNTDOWN_MESSAGE,
            Self::PriceTick { .. } => PRICE_UPDATE_MESSAGE,
            Self::RoundEnded { .. } => GAME_END_MESSAGE,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessageEnvelopeWire {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Option<OwnedValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GameStartWire {
    #[serde(default)]
    game_id: Option<String>,
    #[serde(default)]
    starting_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CountdownWire {
    #[serde(default)]
    countdown: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceUpdateWire {
    #[serde(default)]
    game_id: Option<String>,
    #[serde(default)]
    price: Option<f64>,
    #[serde(default)]
    multiplier: Option<f64>,
    #[serde(default)]
    game_ended: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GameEndWire {
    #[serde(default)]
    game_id: Option<String>,
    #[serde(default)]
    peak_multiplier: Option<f64>,
    #[serde(default)]
    final_price: Option<f64>,
    #[serde(default)]
    rugged: bool,
}

fn decode_data<T: DeserializeOwned>(kind: &str, data: Option<OwnedValue>) -> Result<T, ChartError> {
    let data = data
        .ok_or_else(|| ChartError::InvalidArgument(format!("'{kind}' message has no data")))?;
    Ok(simd_json::serde::from_owned_value(data)?)
}

impl TryFrom<MessageEnvelopeWire> for GameEvent {
    type Error = ChartError;

    fn try_from(value: MessageEnvelopeWire) -> Result<Self, Self::Error> {
        let kind = value.kind.as_str();
        match kind {
            GAME_START_MESSAGE => {
                let wire: GameStartWire = decode_data(kind, value.data)?;
                Ok(Self::RoundStarted {
                    round_id: wire.game_id.unwrap_or_default(),
                    baseline_value: wire.starting_price,
                })
            }
            COUNTDOWN_MESSAGE => {
                let wire: CountdownWire = decode_data(kind, value.data)?;
                Ok(Self::CountdownTick {
                    seconds_remaining: wire.countdown.unwrap_or(0.0),
                })
            }
            PRICE_UPDATE_MESSAGE => {
                let wire: PriceUpdateWire = decode_data(kind, value.data)?;
                let value = wire.price.or(wire.multiplier).ok_or_else(|| {
                    ChartError::InvalidArgument(
                        "price_update carries neither price nor multiplier".to_string(),
                    )
                })?;
                Ok(Self::PriceTick {
                    value,
                    round_id: wire.game_id.filter(|id| !id.is_empty()),
                    round_ended: wire.game_ended,
                })
            }
            GAME_END_MESSAGE => {
                let wire: GameEndWire = decode_data(kind, value.data)?;
                let peak_value = wire.peak_multiplier.or(wire.final_price).ok_or_else(|| {
                    ChartError::InvalidArgument(
                        "game_end carries neither peakMultiplier nor finalPrice".to_string(),
                    )
                })?;
                Ok(Self::RoundEnded {
                    peak_value,
                    abnormal_termination: wire.rugged,
                    round_id: wire.game_id.filter(|id| !id.is_empty()),
                })
            }
            other => Err(ChartError::UnknownMessage(other.to_string())),
        }
    }
}

/// Decodes one inbound frame. The buffer is parsed in place.
pub fn decode_server_message(payload: &mut [u8]) -> Result<GameEvent, ChartError> {
    let envelope: MessageEnvelopeWire = simd_json::serde::from_slice(payload)?;
    envelope.try_into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(text: &str) -> Result<GameEvent, ChartError> {
        let mut payload = text.as_bytes().to_vec();
        decode_server_message(payload.as_mut_slice())
    }

    #[test]
    fn decodes_game_start() {
        let event = decode(
            r#"{"type":"game_start","data":{"gameId":"g-1","serverSeedHash":"abc","startingPrice":1.0,"connectedUsers":4}}"#,
        )
        .expect("game_start should decode");

        assert_eq!(
            event,
            GameEvent::RoundStarted {
                round_id: "g-1".to_string(),
                baseline_value: Some(1.0),
            }
        );
    }

    #[test]
    fn decodes_countdown() {
        let event = decode(r#"{"type":"countdown","data":{"countdown":3}}"#)
            .expect("countdown should decode");
        assert_eq!(
            event,
            GameEvent::CountdownTick {
                seconds_remaining: 3.0
            }
        );
    }

    #[test]
    fn countdown_text_message_maps_to_zero_remaining() {
        let event = decode(r#"{"type":"countdown","data":{"roomId":"r1","message":"flip!"}}"#)
            .expect("countdown text should decode");
        assert_eq!(
            event,
            GameEvent::CountdownTick {
                seconds_remaining: 0.0
            }
        );
    }

    #[test]
    fn decodes_price_update_preferring_price_over_multiplier() {
        let event = decode(
            r#"{"type":"price_update","data":{"gameId":"g-1","tick":7,"price":1.25,"multiplier":1.2,"gameEnded":false,"connectedUsers":4}}"#,
        )
        .expect("price_update should decode");

        assert_eq!(
            event,
            GameEvent::PriceTick {
                value: 1.25,
                round_id: Some("g-1".to_string()),
                round_ended: false,
            }
        );
    }

    #[test]
    fn rejects_price_update_without_value() {
        let result = decode(r#"{"type":"price_update","data":{"tick":7}}"#);
        assert!(matches!(result, Err(ChartError::InvalidArgument(_))));
    }

    #[test]
    fn decodes_game_end_from_peak_or_final_price() {
        let crash = decode(
            r#"{"type":"game_end","data":{"gameId":"g-1","peakMultiplier":3.5,"rugged":true,"totalTicks":250}}"#,
        )
        .expect("crash game_end should decode");
        assert_eq!(
            crash,
            GameEvent::RoundEnded {
                peak_value: 3.5,
                abnormal_termination: true,
                round_id: Some("g-1".to_string()),
            }
        );

        let flip = decode(
            r#"{"type":"game_end","data":{"roomId":"r1","finalPrice":0.92,"winner":"RED"}}"#,
        )
        .expect("room game_end should decode");
        assert_eq!(
            flip,
            GameEvent::RoundEnded {
                peak_value: 0.92,
                abnormal_termination: false,
                round_id: None,
            }
        );
    }

    #[test]
    fn reports_unknown_discriminant() {
        let result = decode(r#"{"type":"chat_message","username":"a","message":"hi"}"#);
        match result {
            Err(ChartError::UnknownMessage(kind)) => assert_eq!(kind, "chat_message"),
            other => panic!("expected unknown message, got {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_payload() {
        assert!(decode("{not json").is_err());
        assert!(decode(r#"{"type":"game_start"}"#).is_err());
    }

    #[test]
    fn event_kind_names_wire_discriminant() {
        let event = decode(r#"{"type":"countdown","data":{"countdown":3}}"#)
            .expect("countdown should decode");
        assert_eq!(event.kind(), COUNTDOWN_MESSAGE);

        let event = decode(r#"{"type":"price_update","data":{"price":1.1}}"#)
            .expect("price update should decode");
        assert_eq!(event.kind(), PRICE_UPDATE_MESSAGE);
    }
}

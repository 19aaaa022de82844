use serde_json::Value;

use crate::types::Direction;

#[derive(Debug, PartialEq)]
pub enum ParsedClientMessage {
    Hello { name: String },
    Input { dir: Direction },
    Pause,
    Resume,
    TogglePause,
    PlayAgain,
    Quit,
    Ping { t: f64 },
}

pub fn parse_client_message(raw: &str) -> Option<ParsedClientMessage> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;
    let message_type = object.get("type")?.as_str()?;

    match message_type {
        "hello" => {
            let name = object.get("name")?.as_str()?.to_string();
            Some(ParsedClientMessage::Hello { name })
        }
        "input" => {
            let dir = Direction::parse_move(object.get("dir")?.as_str()?)?;
            Some(ParsedClientMessage::Input { dir })
        }
        "pause" => Some(ParsedClientMessage::Pause),
        "resume" => Some(ParsedClientMessage::Resume),
        "toggle_pause" => Some(ParsedClientMessage::TogglePause),
        "play_again" => Some(ParsedClientMessage::PlayAgain),
        "quit" => Some(ParsedClientMessage::Quit),
        "ping" => {
            let t = object.get("t")?.as_f64()?;
            if !t.is_finite() {
                return None;
            }
            Some(ParsedClientMessage::Ping { t })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hello_message() {
        let parsed = parse_client_message(r#"{"type":"hello","name":"A"}"#)
            .expect("hello message should parse");
        assert_eq!(
            parsed,
            ParsedClientMessage::Hello {
                name: "A".to_string()
            }
        );
    }

    #[test]
    fn parse_input_rejects_invalid_or_missing_direction() {
        assert!(parse_client_message(r#"{"type":"input","dir":"invalid"}"#).is_none());
        assert!(parse_client_message(r#"{"type":"input"}"#).is_none());
        assert!(parse_client_message(r#"{"type":"input","dir":3}"#).is_none());
    }

    #[test]
    fn parse_input_accepts_none_direction() {
        let parsed = parse_client_message(r#"{"type":"input","dir":"none"}"#);
        assert_eq!(
            parsed,
            Some(ParsedClientMessage::Input {
                dir: Direction::None
            })
        );
    }

    #[test]
    fn parse_control_messages() {
        assert_eq!(
            parse_client_message(r#"{"type":"pause"}"#),
            Some(ParsedClientMessage::Pause)
        );
        assert_eq!(
            parse_client_message(r#"{"type":"toggle_pause"}"#),
            Some(ParsedClientMessage::TogglePause)
        );
        assert_eq!(
            parse_client_message(r#"{"type":"play_again"}"#),
            Some(ParsedClientMessage::PlayAgain)
        );
        assert!(parse_client_message(r#"{"type":"teleport"}"#).is_none());
        assert!(parse_client_message("not json").is_none());
    }

    #[test]
    fn parse_ping_requires_number() {
        let parsed = parse_client_message(r#"{"type":"ping","t":12.5}"#);
        assert_eq!(parsed, Some(ParsedClientMessage::Ping { t: 12.5 }));
        assert!(parse_client_message(r#"{"type":"ping","t":"soon"}"#).is_none());
    }
}

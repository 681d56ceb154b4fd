//! The simulator's socket.io style framing: event frames are the characters
//! "42" followed by a JSON array of event name and payload.

use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, PartialEq)]
pub enum Event {
    Telemetry(Value),
    /// Anything else the simulator sends while the user drives manually,
    /// including telemetry events with a null payload.
    Manual,
}

/// Splits an incoming frame into its event. Frames without the event prefix
/// carry no event and get no response.
pub fn decode(frame: &str) -> Option<Event> {
    let body = frame.strip_prefix("42")?;
    match serde_json::from_str::<(String, Value)>(body) {
        Ok((event, payload)) if event == "telemetry" && payload.is_object() => {
            Some(Event::Telemetry(payload))
        }
        _ => Some(Event::Manual),
    }
}

pub fn encode<T: Serialize>(event: &str, payload: &T) -> String {
    format!("42{}", json!([event, payload]))
}

pub fn manual() -> String {
    "42[\"manual\",{}]".to_owned()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn telemetry_frame_decodes_to_its_payload() {
        let event = decode(r#"42["telemetry",{"x":1.5,"y":-2.0}]"#).unwrap();
        match event {
            Event::Telemetry(payload) => {
                assert_eq!(payload["x"], json!(1.5));
                assert_eq!(payload["y"], json!(-2.0));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn null_payload_means_manual_driving() {
        assert_eq!(decode(r#"42["telemetry",null]"#), Some(Event::Manual));
    }

    #[test]
    fn unknown_events_mean_manual_driving() {
        assert_eq!(decode(r#"42["reset",{}]"#), Some(Event::Manual));
        assert_eq!(decode("42garbage"), Some(Event::Manual));
    }

    #[test]
    fn control_frames_are_ignored() {
        assert_eq!(decode("40"), None);
        assert_eq!(decode("3"), None);
        assert_eq!(decode(""), None);
    }

    #[test]
    fn encode_produces_the_event_prefix() {
        let frame = encode("steer", &json!({"steering_angle": 0.1}));
        assert_eq!(frame, r#"42["steer",{"steering_angle":0.1}]"#);
        assert_eq!(decode(&manual()), Some(Event::Manual));
    }
}

//! Topic builders for the gridhub MQTT hierarchy.
//!
//! Bridge topics use a flat scheme: `gridhub/{category}/{protocol}/{address}`.
//! The address segment for command/ack/state traffic is the device id, so a
//! single wildcard subscription covers every bridge.

/// Base prefix for all bridge-facing topics.
pub const PREFIX: &str = "gridhub";

/// Base prefix for topics published by the core itself.
pub const CORE_PREFIX: &str = "gridhub/core";

pub fn command(protocol: &str, device_id: &str) -> String {
    format!("{PREFIX}/command/{protocol}/{device_id}")
}

pub fn ack(protocol: &str, device_id: &str) -> String {
    format!("{PREFIX}/ack/{protocol}/{device_id}")
}

pub fn state(protocol: &str, device_id: &str) -> String {
    format!("{PREFIX}/state/{protocol}/{device_id}")
}

pub fn request(protocol: &str, request_id: &str) -> String {
    format!("{PREFIX}/request/{protocol}/{request_id}")
}

pub fn response(protocol: &str, request_id: &str) -> String {
    format!("{PREFIX}/response/{protocol}/{request_id}")
}

pub fn health(protocol: &str) -> String {
    format!("{PREFIX}/health/{protocol}")
}

/// Canonical state republished by the core after merge and attribution.
pub fn core_device_state(device_id: &str) -> String {
    format!("{CORE_PREFIX}/device/{device_id}/state")
}

pub fn core_event(event_type: &str) -> String {
    format!("{CORE_PREFIX}/event/{event_type}")
}

pub fn core_scene_progress(scene_id: &str) -> String {
    format!("{CORE_PREFIX}/scene/{scene_id}/progress")
}

pub fn core_mode() -> String {
    format!("{CORE_PREFIX}/mode")
}

/// UIs publish here to activate a scene.
pub fn core_scene_activate(scene_id: &str) -> String {
    format!("{CORE_PREFIX}/scene/{scene_id}/activate")
}

/// UIs publish here to change the house mode.
pub fn core_mode_set() -> String {
    format!("{CORE_PREFIX}/mode/set")
}

pub fn all_scene_activations() -> String {
    format!("{CORE_PREFIX}/scene/+/activate")
}

pub fn all_acks() -> String {
    format!("{PREFIX}/ack/+/+")
}

pub fn all_states() -> String {
    format!("{PREFIX}/state/+/+")
}

pub fn all_health() -> String {
    format!("{PREFIX}/health/+")
}

pub fn all_responses() -> String {
    format!("{PREFIX}/response/+/+")
}

/// A bridge topic broken into its segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedTopic {
    Ack { protocol: String, device_id: String },
    State { protocol: String, device_id: String },
    Health { protocol: String },
    Response { protocol: String, request_id: String },
}

/// Splits an inbound bridge topic. Returns `None` for topics outside the
/// hierarchy, including the core's own publications.
pub fn parse(topic: &str) -> Option<ParsedTopic> {
    let mut parts = topic.split('/');
    if parts.next()? != PREFIX {
        return None;
    }
    match (parts.next()?, parts.next(), parts.next(), parts.next()) {
        ("ack", Some(protocol), Some(device_id), None) => Some(ParsedTopic::Ack {
            protocol: protocol.to_string(),
            device_id: device_id.to_string(),
        }),
        ("state", Some(protocol), Some(device_id), None) => Some(ParsedTopic::State {
            protocol: protocol.to_string(),
            device_id: device_id.to_string(),
        }),
        ("health", Some(protocol), None, None) => Some(ParsedTopic::Health {
            protocol: protocol.to_string(),
        }),
        ("response", Some(protocol), Some(request_id), None) => Some(ParsedTopic::Response {
            protocol: protocol.to_string(),
            request_id: request_id.to_string(),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_topic_layout() {
        assert_eq!(command("knx", "light-living-1"), "gridhub/command/knx/light-living-1");
        assert_eq!(health("dali"), "gridhub/health/dali");
    }

    #[test]
    fn test_parse_roundtrip() {
        assert_eq!(
            parse(&ack("knx", "light-1")),
            Some(ParsedTopic::Ack {
                protocol: "knx".into(),
                device_id: "light-1".into()
            })
        );
        assert_eq!(
            parse("gridhub/health/modbus_tcp"),
            Some(ParsedTopic::Health {
                protocol: "modbus_tcp".into()
            })
        );
    }

    #[test]
    fn test_parse_rejects_foreign_and_core_topics() {
        assert_eq!(parse("other/ack/knx/light-1"), None);
        assert_eq!(parse("gridhub/core/device/light-1/state"), None);
        assert_eq!(parse("gridhub/ack/knx"), None);
        assert_eq!(parse("gridhub/health/knx/extra"), None);
    }
}

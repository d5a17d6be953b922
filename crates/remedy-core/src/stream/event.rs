//! Typed progress events decoded from executor frames.
//!
//! Frames are JSON objects discriminated by `type`:
//!
//! ```json
//! {"type": "step_started", "step_id": 0, "start_time": "2024-05-01T10:00:00Z"}
//! {"type": "step_completed", "step_id": 0, "end_time": "2024-05-01T10:00:04Z", "output": "ok"}
//! {"type": "output", "step_id": 0, "data": "restarting nginx..."}
//! {"type": "deployment_completed", "total_duration": 42.5}
//! ```
//!
//! Kinds this crate does not know decode to [`StreamEvent::Unknown`] so newer
//! executors can add events without breaking older consumers.

use jiff::Timestamp;
use serde::{Deserialize, Deserializer, Serialize};

use crate::{error::Result, models::StepId};

/// One decoded progress event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    StepStarted(StepEvent),
    StepCompleted(StepEvent),
    StepFailed(StepEvent),
    DeploymentCompleted(DeploymentCompleted),
    DeploymentFailed(DeploymentFailed),
    RollbackCompleted(RollbackCompleted),
    Output(StepEvent),
    #[serde(other)]
    Unknown,
}

/// Payload shared by the step-scoped event kinds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepEvent {
    #[serde(
        default,
        deserialize_with = "lenient_index",
        skip_serializing_if = "Option::is_none"
    )]
    pub step_id: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_index: Option<usize>,
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_time: Option<Timestamp>,
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub end_time: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl StepEvent {
    /// Step the event refers to; `step_id` wins over `step_index`.
    pub fn step(&self) -> Option<StepId> {
        self.step_id.or(self.step_index).map(StepId)
    }

    /// Text carried by an `output` event.
    pub fn text(&self) -> Option<&str> {
        self.data.as_deref().or(self.output.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentCompleted {
    /// Seconds, as reported by the executor
    #[serde(
        default,
        deserialize_with = "lenient_seconds",
        skip_serializing_if = "Option::is_none"
    )]
    pub total_duration: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentFailed {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RollbackCompleted {
    #[serde(
        default,
        deserialize_with = "lenient_seconds",
        skip_serializing_if = "Option::is_none"
    )]
    pub total_duration: Option<f64>,
}

impl StreamEvent {
    /// Wire name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::StepStarted(_) => "step_started",
            StreamEvent::StepCompleted(_) => "step_completed",
            StreamEvent::StepFailed(_) => "step_failed",
            StreamEvent::DeploymentCompleted(_) => "deployment_completed",
            StreamEvent::DeploymentFailed(_) => "deployment_failed",
            StreamEvent::RollbackCompleted(_) => "rollback_completed",
            StreamEvent::Output(_) => "output",
            StreamEvent::Unknown => "unknown",
        }
    }
}

/// Decodes one text frame.
///
/// # Errors
///
/// Returns `EngineError::Decode` for frames that are not JSON objects with a
/// string `type` field or whose known fields have the wrong shape.
pub fn decode_frame(frame: &str) -> Result<StreamEvent> {
    Ok(serde_json::from_str(frame)?)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(f64),
    String(String),
}

/// Accepts `3`, `"3"` and `"step-3"`.
fn lenient_index<'de, D>(deserializer: D) -> std::result::Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<NumberOrString>::deserialize(deserializer)?;
    Ok(match value {
        Some(NumberOrString::Number(n)) if n >= 0.0 && n.fract() == 0.0 => Some(n as usize),
        Some(NumberOrString::String(s)) => {
            let digits = s
                .rsplit(|c: char| !c.is_ascii_digit())
                .next()
                .unwrap_or_default();
            digits.parse().ok()
        }
        _ => None,
    })
}

/// Accepts RFC 3339 strings and epoch milliseconds.
fn lenient_timestamp<'de, D>(deserializer: D) -> std::result::Result<Option<Timestamp>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<NumberOrString>::deserialize(deserializer)?;
    Ok(match value {
        Some(NumberOrString::String(s)) => s.parse::<Timestamp>().ok(),
        Some(NumberOrString::Number(ms)) => Timestamp::from_millisecond(ms as i64).ok(),
        None => None,
    })
}

fn lenient_seconds<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<NumberOrString>::deserialize(deserializer)?;
    let secs: Option<f64> = match value {
        Some(NumberOrString::Number(n)) => Some(n),
        Some(NumberOrString::String(s)) => s.trim().parse().ok(),
        None => None,
    };
    Ok(secs.filter(|s| s.is_finite() && *s >= 0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_step_started() {
        let event =
            decode_frame(r#"{"type":"step_started","step_id":1,"start_time":"2024-05-01T10:00:00Z"}"#)
                .unwrap();
        match event {
            StreamEvent::StepStarted(e) => {
                assert_eq!(e.step(), Some(StepId(1)));
                assert_eq!(
                    e.start_time,
                    Some("2024-05-01T10:00:00Z".parse().unwrap())
                );
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_decode_step_id_variants() {
        let from_string = decode_frame(r#"{"type":"step_completed","step_id":"2"}"#).unwrap();
        let from_label = decode_frame(r#"{"type":"step_completed","step_id":"step-2"}"#).unwrap();
        let from_index = decode_frame(r#"{"type":"step_completed","step_index":2}"#).unwrap();
        for event in [from_string, from_label, from_index] {
            match event {
                StreamEvent::StepCompleted(e) => assert_eq!(e.step(), Some(StepId(2))),
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[test]
    fn test_decode_epoch_millis_timestamp() {
        let event =
            decode_frame(r#"{"type":"step_failed","step_id":0,"end_time":1714557600000,"error":"boom"}"#)
                .unwrap();
        match event {
            StreamEvent::StepFailed(e) => {
                assert_eq!(e.end_time, Some("2024-05-01T10:00:00Z".parse().unwrap()));
                assert_eq!(e.error.as_deref(), Some("boom"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_decode_output_prefers_data() {
        let event = decode_frame(r#"{"type":"output","data":"line 1\n"}"#).unwrap();
        match event {
            StreamEvent::Output(e) => {
                assert_eq!(e.step(), None);
                assert_eq!(e.text(), Some("line 1\n"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_decode_unknown_kind() {
        let event = decode_frame(r#"{"type":"heartbeat","seq":7}"#).unwrap();
        assert_eq!(event, StreamEvent::Unknown);
    }

    #[test]
    fn test_decode_deployment_completed_duration() {
        let event = decode_frame(r#"{"type":"deployment_completed","total_duration":"12.5"}"#).unwrap();
        assert_eq!(
            event,
            StreamEvent::DeploymentCompleted(DeploymentCompleted {
                total_duration: Some(12.5)
            })
        );
    }

    #[test]
    fn test_decode_malformed_frame() {
        assert!(decode_frame("not json").is_err());
        assert!(decode_frame(r#"{"step_id":1}"#).is_err());
    }
}

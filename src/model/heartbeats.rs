//! Health samples reported by agents.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Id, Validate, ValidationError, ValidationResult, check};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HeartbeatType {
    Ping,
    Hardware,
}

impl fmt::Display for HeartbeatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeartbeatType::Ping => write!(f, "PING"),
            HeartbeatType::Hardware => write!(f, "HARDWARE"),
        }
    }
}

impl FromStr for HeartbeatType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PING" => Ok(HeartbeatType::Ping),
            "HARDWARE" => Ok(HeartbeatType::Hardware),
            other => Err(ValidationError::new(
                "heartbeatType",
                format!("unknown heartbeat type '{other}'"),
            )),
        }
    }
}

// ============================================================================
// Instance heartbeats (ping + hardware)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSample {
    pub heartbeat_type: HeartbeatType,
    pub success: bool,
    pub response_time_ms: Option<i32>,
    pub packet_loss: Option<f64>,
    pub jitter_ms: Option<i32>,
    pub cpu_usage: Option<f64>,
    pub memory_usage: Option<f64>,
    pub disk_usage: Option<f64>,
    pub load_average: Option<f64>,
    pub process_count: Option<i32>,
    pub network_rx_bytes: Option<i64>,
    pub network_tx_bytes: Option<i64>,
    pub uptime_seconds: Option<i64>,
    pub status: String,
    pub error_message: Option<String>,
    pub error_type: Option<String>,
    pub metadata: Option<Value>,
    pub agent_id: Option<Id>,
    pub instance_id: Id,
}

impl InstanceSample {
    pub fn new(instance_id: Id, heartbeat_type: HeartbeatType, success: bool, status: impl Into<String>) -> Self {
        Self {
            heartbeat_type,
            success,
            response_time_ms: None,
            packet_loss: None,
            jitter_ms: None,
            cpu_usage: None,
            memory_usage: None,
            disk_usage: None,
            load_average: None,
            process_count: None,
            network_rx_bytes: None,
            network_tx_bytes: None,
            uptime_seconds: None,
            status: status.into(),
            error_message: None,
            error_type: None,
            metadata: None,
            agent_id: None,
            instance_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewInstanceHeartbeat {
    pub executed_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub sample: InstanceSample,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceHeartbeat {
    pub id: Id,
    pub executed_at: DateTime<Utc>,
    #[serde(flatten)]
    pub sample: InstanceSample,
}

impl Validate for NewInstanceHeartbeat {
    fn validate(&self) -> ValidationResult {
        let s = &self.sample;
        check::required("status", &s.status, 50)?;
        check::opt_non_negative("responseTimeMs", s.response_time_ms)?;
        check::opt_non_negative("jitterMs", s.jitter_ms)?;
        check::opt_non_negative("processCount", s.process_count)?;
        check::opt_percent("packetLoss", s.packet_loss)?;
        check::opt_percent("cpuUsage", s.cpu_usage)?;
        check::opt_percent("memoryUsage", s.memory_usage)?;
        check::opt_percent("diskUsage", s.disk_usage)?;
        check::opt_len("errorType", s.error_type.as_ref(), 50)
    }
}

// ============================================================================
// HTTP heartbeats
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpSample {
    pub success: bool,
    pub response_time_ms: Option<i32>,
    pub response_size_bytes: Option<i32>,
    pub response_status_code: Option<i32>,
    pub response_content_type: Option<String>,
    pub dns_lookup_ms: Option<i32>,
    pub tcp_connect_ms: Option<i32>,
    pub tls_handshake_ms: Option<i32>,
    pub time_to_first_byte_ms: Option<i32>,
    pub warning_threshold_ms: Option<i32>,
    pub critical_threshold_ms: Option<i32>,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    pub agent_id: Option<Id>,
    pub monitor_id: Id,
}

impl HttpSample {
    pub fn new(monitor_id: Id, success: bool) -> Self {
        Self {
            success,
            response_time_ms: None,
            response_size_bytes: None,
            response_status_code: None,
            response_content_type: None,
            dns_lookup_ms: None,
            tcp_connect_ms: None,
            tls_handshake_ms: None,
            time_to_first_byte_ms: None,
            warning_threshold_ms: None,
            critical_threshold_ms: None,
            error_type: None,
            error_message: None,
            agent_id: None,
            monitor_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewHttpHeartbeat {
    pub executed_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub sample: HttpSample,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpHeartbeat {
    pub id: Id,
    pub executed_at: DateTime<Utc>,
    #[serde(flatten)]
    pub sample: HttpSample,
}

impl Validate for NewHttpHeartbeat {
    fn validate(&self) -> ValidationResult {
        let s = &self.sample;
        check::opt_non_negative("responseTimeMs", s.response_time_ms)?;
        check::opt_non_negative("responseSizeBytes", s.response_size_bytes)?;
        check::opt_non_negative("dnsLookupMs", s.dns_lookup_ms)?;
        check::opt_non_negative("tcpConnectMs", s.tcp_connect_ms)?;
        check::opt_non_negative("tlsHandshakeMs", s.tls_handshake_ms)?;
        check::opt_non_negative("timeToFirstByteMs", s.time_to_first_byte_ms)?;
        check::opt_len("responseContentType", s.response_content_type.as_ref(), 100)?;
        check::opt_len("errorType", s.error_type.as_ref(), 50)
    }
}

// ============================================================================
// Service heartbeats
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSample {
    pub success: bool,
    pub status: String,
    pub response_time_ms: Option<i32>,
    pub error_message: Option<String>,
    pub metadata: Option<Value>,
    pub agent_id: Option<Id>,
    pub monitored_service_id: Id,
    /// The instance of the service that was checked, when known
    pub service_instance_id: Option<Id>,
}

impl ServiceSample {
    pub fn new(monitored_service_id: Id, success: bool, status: impl Into<String>) -> Self {
        Self {
            success,
            status: status.into(),
            response_time_ms: None,
            error_message: None,
            metadata: None,
            agent_id: None,
            monitored_service_id,
            service_instance_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewServiceHeartbeat {
    pub executed_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub sample: ServiceSample,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceHeartbeat {
    pub id: Id,
    pub executed_at: DateTime<Utc>,
    #[serde(flatten)]
    pub sample: ServiceSample,
}

impl Validate for NewServiceHeartbeat {
    fn validate(&self) -> ValidationResult {
        check::required("status", &self.sample.status, 50)?;
        check::opt_non_negative("responseTimeMs", self.sample.response_time_ms)
    }
}

/// Published on the hub's broadcast channel for every accepted sample
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HeartbeatEvent {
    Instance(InstanceHeartbeat),
    Http(HttpHeartbeat),
    Service(ServiceHeartbeat),
    #[serde(rename_all = "camelCase")]
    AgentSeen {
        agent_id: Id,
        seen_at: DateTime<Utc>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_heartbeat_type_round_trips_through_text() {
        assert_eq!("ping".parse::<HeartbeatType>().unwrap(), HeartbeatType::Ping);
        assert_eq!(HeartbeatType::Hardware.to_string(), "HARDWARE");
        assert_matches!("disk".parse::<HeartbeatType>(), Err(ValidationError { .. }));
    }

    #[test]
    fn test_instance_heartbeat_payload() {
        let payload: NewInstanceHeartbeat = serde_json::from_str(
            r#"{"heartbeatType":"HARDWARE","success":true,"status":"UP","cpuUsage":42.5,"instanceId":3}"#,
        )
        .unwrap();

        assert!(payload.executed_at.is_none());
        assert_eq!(payload.sample.heartbeat_type, HeartbeatType::Hardware);
        assert_eq!(payload.sample.instance_id, 3);
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn test_instance_heartbeat_rejects_bad_usage() {
        let mut sample = InstanceSample::new(1, HeartbeatType::Hardware, true, "UP");
        sample.memory_usage = Some(140.0);
        let payload = NewInstanceHeartbeat {
            executed_at: None,
            sample,
        };
        assert_eq!(payload.validate().unwrap_err().field, "memoryUsage");
    }

    #[test]
    fn test_service_heartbeat_payload_without_instance() {
        let payload: NewServiceHeartbeat =
            serde_json::from_str(r#"{"monitoredServiceId":2,"success":false,"status":"DOWN"}"#).unwrap();

        assert_eq!(payload.sample.service_instance_id, None);
        assert_eq!(payload.sample, ServiceSample::new(2, false, "DOWN"));
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn test_event_is_tagged() {
        let event = HeartbeatEvent::AgentSeen {
            agent_id: 4,
            seen_at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "agent_seen");
        assert_eq!(json["agentId"], 4);
    }
}

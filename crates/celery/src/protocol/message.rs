//! Broker envelope

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{ProtocolError, TaskMessage};

const CONTENT_TYPE_JSON: &str = "application/json";
const CONTENT_ENCODING_UTF8: &str = "utf-8";
const BODY_ENCODING_BASE64: &str = "base64";
const DEFAULT_QUEUE: &str = "celery";
const PERSISTENT_DELIVERY: u8 = 2;

/// Message envelope moved through the broker
///
/// The body is the base64-encoded JSON of a [`TaskMessage`]; the broker never
/// looks inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CeleryMessage {
    pub body: String,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub headers: Map<String, Value>,

    #[serde(rename = "content-type")]
    pub content_type: String,

    pub properties: CeleryProperties,

    #[serde(rename = "content-encoding")]
    pub content_encoding: String,
}

/// Envelope properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CeleryProperties {
    pub body_encoding: String,
    pub correlation_id: String,
    pub reply_to: String,
    pub delivery_info: DeliveryInfo,
    pub delivery_mode: u8,
    pub delivery_tag: String,
}

/// Routing information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryInfo {
    pub priority: u8,
    pub routing_key: String,
    pub exchange: String,
}

impl Default for DeliveryInfo {
    fn default() -> Self {
        Self {
            priority: 0,
            routing_key: DEFAULT_QUEUE.to_string(),
            exchange: DEFAULT_QUEUE.to_string(),
        }
    }
}

impl CeleryMessage {
    /// Wrap an already-encoded task body
    pub fn new(body: String) -> Self {
        Self {
            body,
            headers: Map::new(),
            content_type: CONTENT_TYPE_JSON.to_string(),
            properties: CeleryProperties {
                body_encoding: BODY_ENCODING_BASE64.to_string(),
                correlation_id: Uuid::new_v4().to_string(),
                reply_to: Uuid::new_v4().to_string(),
                delivery_info: DeliveryInfo::default(),
                delivery_mode: PERSISTENT_DELIVERY,
                delivery_tag: Uuid::new_v4().to_string(),
            },
            content_encoding: CONTENT_ENCODING_UTF8.to_string(),
        }
    }

    /// Encode a task and wrap it
    pub fn from_task(task: &TaskMessage) -> Result<Self, ProtocolError> {
        let mut message = Self::new(task.encode()?);
        message.properties.correlation_id = task.id.clone();
        Ok(message)
    }

    /// Decode the task carried in the body
    pub fn task_message(&self) -> Result<TaskMessage, ProtocolError> {
        if self.content_type != CONTENT_TYPE_JSON {
            return Err(ProtocolError::Unsupported {
                field: "content-type",
                value: self.content_type.clone(),
            });
        }
        if self.properties.body_encoding != BODY_ENCODING_BASE64 {
            return Err(ProtocolError::Unsupported {
                field: "body_encoding",
                value: self.properties.body_encoding.clone(),
            });
        }
        TaskMessage::decode(&self.body)
    }

    /// Serialize the envelope for a transport
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Parse an envelope received from a transport
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}

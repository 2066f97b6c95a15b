//! Response envelope: `{<resource_key>: data, meta: {http-status, result, message?, errors?}}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct Meta {
    #[serde(rename = "http-status")]
    pub http_status: u16,
    pub result: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Data is keyed by the resource key, so the field name differs per resource.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    pub resource_key: String,
    pub data: Value,
    pub meta: Meta,
}

impl Envelope {
    pub fn ok(resource_key: impl Into<String>, data: Value) -> Self {
        Envelope {
            resource_key: resource_key.into(),
            data,
            meta: Meta {
                http_status: StatusCode::OK.as_u16(),
                result: true,
                message: None,
                errors: Vec::new(),
            },
        }
    }

    pub fn failure(resource_key: impl Into<String>, data: Value, status: StatusCode, message: impl Into<String>) -> Self {
        Envelope {
            resource_key: resource_key.into(),
            data,
            meta: Meta {
                http_status: status.as_u16(),
                result: false,
                message: Some(message.into()),
                errors: Vec::new(),
            },
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.meta.message = Some(message.into());
        self
    }

    pub fn with_errors(mut self, errors: Vec<String>) -> Self {
        self.meta.errors = errors;
        self
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.meta.http_status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry(&self.resource_key, &self.data)?;
        map.serialize_entry("meta", &self.meta)?;
        map.end()
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use super::display;
use super::errors::PersistenceError;
use super::repository::Row;

pub const DEFAULT_SOURCE: &str = "web";

/// Fields a caller may never set through an update.
pub const IMMUTABLE_FIELDS: [&str; 3] = ["id", "created_at", "updated_at"];

/// Lifecycle stage of a service request.
///
/// Values outside the four canonical ones are kept verbatim in `Other`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RequestStatus {
    #[default]
    New,
    InProgress,
    Completed,
    Cancelled,
    Other(String),
}

impl RequestStatus {
    /// Never fails; an empty value reads as `New`.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "" | "new" => RequestStatus::New,
            "in_progress" => RequestStatus::InProgress,
            "completed" => RequestStatus::Completed,
            "cancelled" => RequestStatus::Cancelled,
            other => RequestStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RequestStatus::New => "new",
            RequestStatus::InProgress => "in_progress",
            RequestStatus::Completed => "completed",
            RequestStatus::Cancelled => "cancelled",
            RequestStatus::Other(raw) => raw,
        }
    }

    pub fn display_label(&self) -> &str {
        display::status_label(self.as_str())
    }

    pub fn is_canonical(&self) -> bool {
        !matches!(self, RequestStatus::Other(_))
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for RequestStatus {
    fn from(raw: String) -> Self { RequestStatus::parse(&raw) }
}

impl From<&str> for RequestStatus {
    fn from(raw: &str) -> Self { RequestStatus::parse(raw) }
}

impl From<RequestStatus> for String {
    fn from(status: RequestStatus) -> Self {
        match status {
            RequestStatus::Other(raw) => raw,
            canonical => canonical.as_str().to_string(),
        }
    }
}

/// A customer-submitted appliance-repair request, as loaded from the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub id: Uuid,
    pub device_type: String,
    pub device_type_display: String,
    pub brand: Option<String>,
    pub issue: String,
    pub region: String,
    pub region_display: String,
    pub phone: String,
    pub source: String,
    pub whatsapp_sent: bool,
    pub status: RequestStatus,
    pub created_at: DateTime<FixedOffset>,
    pub updated_at: Option<DateTime<FixedOffset>>,
}

impl ServiceRequest {
    pub fn is_new(&self) -> bool { self.status == RequestStatus::New }
    pub fn is_in_progress(&self) -> bool { self.status == RequestStatus::InProgress }
    pub fn is_completed(&self) -> bool { self.status == RequestStatus::Completed }
    pub fn is_cancelled(&self) -> bool { self.status == RequestStatus::Cancelled }

    /// Localized status label, or the raw stored value when it is not a known status.
    pub fn status_display(&self) -> &str {
        self.status.display_label()
    }

    pub fn formatted_created_at(&self) -> String {
        display::format_long_tr(&self.created_at)
    }

    /// Empty until the first update.
    pub fn formatted_updated_at(&self) -> String {
        self.updated_at.as_ref().map(display::format_long_tr).unwrap_or_default()
    }
}

impl From<Row> for ServiceRequest {
    fn from(row: Row) -> Self {
        let source = if row.source.is_empty() { DEFAULT_SOURCE.to_string() } else { row.source };
        Self {
            id: row.id,
            device_type: row.device_type,
            device_type_display: row.device_type_display,
            brand: row.brand,
            issue: row.issue,
            region: row.region,
            region_display: row.region_display,
            phone: row.phone,
            source,
            whatsapp_sent: row.whatsapp_sent,
            status: RequestStatus::parse(&row.status),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Creation input. `source`, `whatsapp_sent` and `status` fall back to
/// `"web"`, `false` and `new` when left out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewServiceRequest {
    pub device_type: String,
    pub device_type_display: String,
    #[serde(default)]
    pub brand: Option<String>,
    pub issue: String,
    pub region: String,
    pub region_display: String,
    pub phone: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub whatsapp_sent: Option<bool>,
    #[serde(default)]
    pub status: Option<RequestStatus>,
}

/// Partial update. Only the fields listed here can change; identity and
/// timestamps are owned by the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceRequestPatch {
    #[serde(default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub device_type_display: Option<String>,
    /// `Some(None)` clears the brand.
    #[serde(default, deserialize_with = "nullable")]
    pub brand: Option<Option<String>>,
    #[serde(default)]
    pub issue: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub region_display: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub whatsapp_sent: Option<bool>,
    #[serde(default)]
    pub status: Option<RequestStatus>,
}

fn nullable<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

impl ServiceRequestPatch {
    pub fn status_change(status: RequestStatus) -> Self {
        Self { status: Some(status), ..Default::default() }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Parse an untyped patch object, refusing `id`, `created_at`, `updated_at`
    /// and any field that is not updatable.
    pub fn from_json(value: serde_json::Value) -> Result<Self, PersistenceError> {
        let serde_json::Value::Object(map) = &value else {
            return Err(PersistenceError::InvalidInput("patch must be a JSON object".into()));
        };
        if let Some(field) = IMMUTABLE_FIELDS.iter().find(|f| map.contains_key(**f)) {
            return Err(PersistenceError::ImmutableField((*field).to_string()));
        }
        serde_json::from_value(value).map_err(|e| PersistenceError::InvalidInput(e.to_string()))
    }
}

/// Equality filters for listing; unset or empty fields are unconstrained.
///
/// `status` is kept as the raw value so an empty one stays unconstrained
/// instead of reading as `new`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRequestFilter {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub device_type: Option<String>,
}

impl ServiceRequestFilter {
    pub fn new() -> Self { Self::default() }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_device_type(mut self, device_type: impl Into<String>) -> Self {
        self.device_type = Some(device_type.into());
        self
    }
}

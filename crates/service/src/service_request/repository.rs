use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use uuid::Uuid;

use super::errors::RecordStoreError;

/// Raw persisted row.
pub type Row = models::service_request::Model;

/// Equality constraint on a single column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowFilter {
    Id(Uuid),
    /// Matches any of the listed values.
    StatusIn(Vec<String>),
    Region(String),
    DeviceType(String),
}

impl RowFilter {
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            RowFilter::Id(id) => row.id == *id,
            RowFilter::StatusIn(any) => any.iter().any(|s| row.status == *s),
            RowFilter::Region(r) => row.region == *r,
            RowFilter::DeviceType(d) => row.device_type == *d,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RowOrder {
    #[default]
    Unordered,
    /// Most recent `created_at` first.
    CreatedAtDesc,
}

/// Filters are AND-combined.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowQuery {
    pub filters: Vec<RowFilter>,
    pub order: RowOrder,
}

impl RowQuery {
    pub fn by_id(id: Uuid) -> Self {
        Self { filters: vec![RowFilter::Id(id)], order: RowOrder::Unordered }
    }

    pub fn filter(mut self, f: RowFilter) -> Self {
        self.filters.push(f);
        self
    }

    pub fn newest_first(mut self) -> Self {
        self.order = RowOrder::CreatedAtDesc;
        self
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.filters.iter().all(|f| f.matches(row))
    }

    /// True when the query is an exact-match lookup by primary key.
    pub fn is_id_lookup(&self) -> bool {
        self.filters.iter().any(|f| matches!(f, RowFilter::Id(_)))
    }
}

/// Row to insert. The backend assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertRow {
    pub device_type: String,
    pub device_type_display: String,
    pub brand: Option<String>,
    pub issue: String,
    pub region: String,
    pub region_display: String,
    pub phone: String,
    pub source: String,
    pub whatsapp_sent: bool,
    pub status: String,
}

/// Column changes for an update; `None` leaves a column as is.
#[derive(Debug, Clone, PartialEq)]
pub struct RowChanges {
    pub device_type: Option<String>,
    pub device_type_display: Option<String>,
    pub brand: Option<Option<String>>,
    pub issue: Option<String>,
    pub region: Option<String>,
    pub region_display: Option<String>,
    pub phone: Option<String>,
    pub source: Option<String>,
    pub whatsapp_sent: Option<bool>,
    pub status: Option<String>,
    pub updated_at: DateTime<FixedOffset>,
}

impl RowChanges {
    pub fn apply_to(self, row: &mut Row) {
        if let Some(v) = self.device_type { row.device_type = v; }
        if let Some(v) = self.device_type_display { row.device_type_display = v; }
        if let Some(v) = self.brand { row.brand = v; }
        if let Some(v) = self.issue { row.issue = v; }
        if let Some(v) = self.region { row.region = v; }
        if let Some(v) = self.region_display { row.region_display = v; }
        if let Some(v) = self.phone { row.phone = v; }
        if let Some(v) = self.source { row.source = v; }
        if let Some(v) = self.whatsapp_sent { row.whatsapp_sent = v; }
        if let Some(v) = self.status { row.status = v; }
        row.updated_at = Some(self.updated_at);
    }
}

/// The persistence backend holding service-request rows.
#[async_trait]
pub trait ServiceRequestRecordStore: Send + Sync {
    async fn insert(&self, row: InsertRow) -> Result<Row, RecordStoreError>;
    async fn select(&self, query: &RowQuery) -> Result<Vec<Row>, RecordStoreError>;
    /// `Ok(None)` when no row has this id.
    async fn update(&self, id: Uuid, changes: RowChanges) -> Result<Option<Row>, RecordStoreError>;
    /// Number of rows removed.
    async fn delete(&self, id: Uuid) -> Result<u64, RecordStoreError>;
}

/// In-memory record store for tests and doc examples
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use chrono::Utc;

    #[derive(Default)]
    pub struct InMemoryRecordStore {
        rows: Mutex<Vec<Row>>,                    // insertion order
        failures: Mutex<VecDeque<RecordStoreError>>,
        strict_single: bool,
    }

    impl InMemoryRecordStore {
        /// Report an id lookup with no match as `RecordStoreError::NoRows`
        /// instead of an empty result, like single-row query APIs do.
        pub fn strict_single() -> Self {
            Self { strict_single: true, ..Default::default() }
        }

        /// Make the next call fail with `err`.
        pub fn fail_next(&self, err: RecordStoreError) {
            self.failures.lock().unwrap().push_back(err);
        }

        /// Seed a row as-is, bypassing id and timestamp assignment.
        pub fn seed(&self, row: Row) {
            self.rows.lock().unwrap().push(row);
        }

        pub fn len(&self) -> usize {
            self.rows.lock().unwrap().len()
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }

        fn take_failure(&self) -> Result<(), RecordStoreError> {
            match self.failures.lock().unwrap().pop_front() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl ServiceRequestRecordStore for InMemoryRecordStore {
        async fn insert(&self, row: InsertRow) -> Result<Row, RecordStoreError> {
            self.take_failure()?;
            let created = Row {
                id: Uuid::new_v4(),
                device_type: row.device_type,
                device_type_display: row.device_type_display,
                brand: row.brand,
                issue: row.issue,
                region: row.region,
                region_display: row.region_display,
                phone: row.phone,
                source: row.source,
                whatsapp_sent: row.whatsapp_sent,
                status: row.status,
                created_at: Utc::now().into(),
                updated_at: None,
            };
            self.rows.lock().unwrap().push(created.clone());
            Ok(created)
        }

        async fn select(&self, query: &RowQuery) -> Result<Vec<Row>, RecordStoreError> {
            self.take_failure()?;
            let rows = self.rows.lock().unwrap();
            let mut out: Vec<Row> = rows.iter().filter(|r| query.matches(r)).cloned().collect();
            if query.order == RowOrder::CreatedAtDesc {
                // Ties keep the latest insertion first.
                out.reverse();
                out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            }
            if out.is_empty() && self.strict_single && query.is_id_lookup() {
                return Err(RecordStoreError::NoRows);
            }
            Ok(out)
        }

        async fn update(&self, id: Uuid, changes: RowChanges) -> Result<Option<Row>, RecordStoreError> {
            self.take_failure()?;
            let mut rows = self.rows.lock().unwrap();
            match rows.iter_mut().find(|r| r.id == id) {
                Some(row) => {
                    changes.apply_to(row);
                    Ok(Some(row.clone()))
                }
                None if self.strict_single => Err(RecordStoreError::NoRows),
                None => Ok(None),
            }
        }

        async fn delete(&self, id: Uuid) -> Result<u64, RecordStoreError> {
            self.take_failure()?;
            let mut rows = self.rows.lock().unwrap();
            let before = rows.len();
            rows.retain(|r| r.id != id);
            Ok((before - rows.len()) as u64)
        }
    }
}

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::domain::{
    NewServiceRequest, RequestStatus, ServiceRequest, ServiceRequestFilter, ServiceRequestPatch,
    DEFAULT_SOURCE,
};
use super::errors::{PersistenceError, RecordStoreError};
use super::repository::{InsertRow, RowChanges, RowFilter, RowQuery, ServiceRequestRecordStore};

/// Data-access layer for service requests.
///
/// The only component that talks to the record store. Every failure is logged
/// with the operation and record id, then returned to the caller.
pub struct ServiceRequestStore<R: ServiceRequestRecordStore> {
    repo: Arc<R>,
}

impl<R: ServiceRequestRecordStore> Clone for ServiceRequestStore<R> {
    fn clone(&self) -> Self { Self { repo: Arc::clone(&self.repo) } }
}

fn insert_row(input: NewServiceRequest) -> InsertRow {
    InsertRow {
        device_type: input.device_type,
        device_type_display: input.device_type_display,
        brand: input.brand,
        issue: input.issue,
        region: input.region,
        region_display: input.region_display,
        phone: input.phone,
        source: input
            .source
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
        whatsapp_sent: input.whatsapp_sent.unwrap_or(false),
        status: input.status.unwrap_or_default().into(),
    }
}

fn row_changes(patch: ServiceRequestPatch) -> RowChanges {
    RowChanges {
        device_type: patch.device_type,
        device_type_display: patch.device_type_display,
        brand: patch.brand,
        issue: patch.issue,
        region: patch.region,
        region_display: patch.region_display,
        phone: patch.phone,
        source: patch.source,
        whatsapp_sent: patch.whatsapp_sent,
        status: patch.status.map(String::from),
        updated_at: Utc::now().into(),
    }
}

fn list_query(filter: &ServiceRequestFilter) -> RowQuery {
    let mut q = RowQuery::default().newest_first();
    if let Some(status) = filter.status.as_ref().filter(|s| !s.is_empty()) {
        // Blank stored statuses load as `new`, so they list as `new` too.
        let values = match RequestStatus::parse(status) {
            RequestStatus::New => vec![RequestStatus::New.as_str().to_string(), String::new()],
            other => vec![String::from(other)],
        };
        q = q.filter(RowFilter::StatusIn(values));
    }
    if let Some(region) = filter.region.as_ref().filter(|r| !r.is_empty()) {
        q = q.filter(RowFilter::Region(region.clone()));
    }
    if let Some(device_type) = filter.device_type.as_ref().filter(|d| !d.is_empty()) {
        q = q.filter(RowFilter::DeviceType(device_type.clone()));
    }
    q
}

fn backend_failure(op: &'static str, id: Option<Uuid>, err: RecordStoreError) -> PersistenceError {
    let err = PersistenceError::Backend(err);
    error!(op, id = ?id, code = err.code(), error = %err, "service_request_operation_failed");
    err
}

impl<R: ServiceRequestRecordStore> ServiceRequestStore<R> {
    pub fn new(repo: Arc<R>) -> Self { Self { repo } }

    /// Create a request; `source`, `whatsapp_sent` and `status` default to
    /// `"web"`, `false` and `new`.
    ///
    /// # Examples
    /// ```
    /// use service::service_request::{ServiceRequestStore, NewServiceRequest, repository::mock::InMemoryRecordStore};
    /// use std::sync::Arc;
    /// let store = ServiceRequestStore::new(Arc::new(InMemoryRecordStore::default()));
    /// let input = NewServiceRequest { device_type: "washer".into(), region: "buca".into(), phone: "05550001122".into(), ..Default::default() };
    /// let created = tokio_test::block_on(store.create(input)).unwrap();
    /// assert!(created.is_new());
    /// assert_eq!(created.source, "web");
    /// assert!(!created.whatsapp_sent);
    /// ```
    #[instrument(skip(self, input), fields(device_type = %input.device_type, region = %input.region))]
    pub async fn create(&self, input: NewServiceRequest) -> Result<ServiceRequest, PersistenceError> {
        let row = self
            .repo
            .insert(insert_row(input))
            .await
            .map_err(|e| backend_failure("create", None, e))?;
        let created = ServiceRequest::from(row);
        info!(id = %created.id, status = %created.status, source = %created.source, "service_request_created");
        Ok(created)
    }

    /// Exact-match lookup. A missing id is `Ok(None)`, whether the backend
    /// returns zero rows or signals `NoRows`.
    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<ServiceRequest>, PersistenceError> {
        let rows = match self.repo.select(&RowQuery::by_id(id)).await {
            Ok(rows) => rows,
            Err(RecordStoreError::NoRows) => {
                debug!(%id, "service_request_absent");
                return Ok(None);
            }
            Err(e) => return Err(backend_failure("find_by_id", Some(id), e)),
        };
        Ok(rows.into_iter().next().map(ServiceRequest::from))
    }

    /// All requests matching every set filter, most recent first.
    #[instrument(skip(self))]
    pub async fn find_all(&self, filter: &ServiceRequestFilter) -> Result<Vec<ServiceRequest>, PersistenceError> {
        let rows = self
            .repo
            .select(&list_query(filter))
            .await
            .map_err(|e| backend_failure("find_all", None, e))?;
        debug!(count = rows.len(), "service_requests_listed");
        Ok(rows.into_iter().map(ServiceRequest::from).collect())
    }

    /// Merge `patch` into the stored record and stamp `updated_at`.
    /// Any status may move to any other status.
    #[instrument(skip(self, patch))]
    pub async fn update(&self, id: Uuid, patch: ServiceRequestPatch) -> Result<ServiceRequest, PersistenceError> {
        match self.repo.update(id, row_changes(patch)).await {
            Ok(Some(row)) => {
                let updated = ServiceRequest::from(row);
                info!(id = %updated.id, status = %updated.status, "service_request_updated");
                Ok(updated)
            }
            Ok(None) | Err(RecordStoreError::NoRows) => {
                let err = PersistenceError::NotFound(id);
                error!(op = "update", %id, code = err.code(), "service_request_operation_failed");
                Err(err)
            }
            Err(e) => Err(backend_failure("update", Some(id), e)),
        }
    }

    /// Like [`update`](Self::update), taking an untyped patch object. Attempts to
    /// write `id`, `created_at` or `updated_at` are rejected before any write.
    #[instrument(skip(self, patch))]
    pub async fn update_from_json(&self, id: Uuid, patch: serde_json::Value) -> Result<ServiceRequest, PersistenceError> {
        let patch = ServiceRequestPatch::from_json(patch).map_err(|e| {
            warn!(op = "update", %id, code = e.code(), error = %e, "service_request_patch_rejected");
            e
        })?;
        self.update(id, patch).await
    }

    /// Update and refresh the caller's instance to the stored state.
    pub async fn update_record(&self, record: &mut ServiceRequest, patch: ServiceRequestPatch) -> Result<(), PersistenceError> {
        *record = self.update(record.id, patch).await?;
        Ok(())
    }

    pub async fn set_status(&self, id: Uuid, status: RequestStatus) -> Result<ServiceRequest, PersistenceError> {
        self.update(id, ServiceRequestPatch::status_change(status)).await
    }

    /// Physically remove a record. Returns `false` when nothing matched;
    /// deleting a missing id is not an error.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<bool, PersistenceError> {
        match self.repo.delete(id).await {
            Ok(0) | Err(RecordStoreError::NoRows) => {
                debug!(%id, "service_request_delete_noop");
                Ok(false)
            }
            Ok(_) => {
                info!(%id, "service_request_deleted");
                Ok(true)
            }
            Err(e) => Err(backend_failure("delete", Some(id), e)),
        }
    }

    pub async fn delete_record(&self, record: ServiceRequest) -> Result<bool, PersistenceError> {
        self.delete(record.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service_request::repository::mock::InMemoryRecordStore;
    use crate::service_request::repository::Row;
    use chrono::{Duration, FixedOffset};
    use serde_json::json;

    fn store() -> (Arc<InMemoryRecordStore>, ServiceRequestStore<InMemoryRecordStore>) {
        let repo = Arc::new(InMemoryRecordStore::default());
        (repo.clone(), ServiceRequestStore::new(repo))
    }

    fn washer_in_buca() -> NewServiceRequest {
        NewServiceRequest {
            device_type: "washer".into(),
            device_type_display: "Çamaşır Makinesi".into(),
            brand: Some("Vestel".into()),
            issue: "water does not drain".into(),
            region: "buca".into(),
            region_display: "Buca".into(),
            phone: "05551234567".into(),
            ..Default::default()
        }
    }

    fn seeded_row(status: &str, region: &str, device_type: &str, created_at: chrono::DateTime<FixedOffset>) -> Row {
        Row {
            id: Uuid::new_v4(),
            device_type: device_type.into(),
            device_type_display: device_type.into(),
            brand: None,
            issue: "issue".into(),
            region: region.into(),
            region_display: region.into(),
            phone: "05550000000".into(),
            source: "web".into(),
            whatsapp_sent: false,
            status: status.into(),
            created_at,
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn create_applies_defaults() {
        let (_, store) = store();
        let created = store.create(washer_in_buca()).await.unwrap();
        assert_eq!(created.status, RequestStatus::New);
        assert_eq!(created.source, "web");
        assert!(!created.whatsapp_sent);
        assert!(created.updated_at.is_none());
        assert_eq!(created.device_type, "washer");
        assert_eq!(created.region, "buca");
        assert_ne!(created.id, Uuid::nil());
    }

    #[tokio::test]
    async fn create_keeps_explicit_values() {
        let (_, store) = store();
        let input = NewServiceRequest {
            source: Some("whatsapp".into()),
            whatsapp_sent: Some(true),
            status: Some(RequestStatus::InProgress),
            ..washer_in_buca()
        };
        let created = store.create(input).await.unwrap();
        assert_eq!(created.source, "whatsapp");
        assert!(created.whatsapp_sent);
        assert!(created.is_in_progress());

        let stored = store.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(stored, created);
    }

    #[tokio::test]
    async fn create_treats_empty_source_as_missing() {
        let (_, store) = store();
        let input = NewServiceRequest { source: Some(String::new()), ..washer_in_buca() };
        assert_eq!(store.create(input).await.unwrap().source, "web");
    }

    #[tokio::test]
    async fn create_surfaces_backend_rejection() {
        let (repo, store) = store();
        repo.fail_next(RecordStoreError::Constraint("phone must not be null".into()));
        let err = store.create(washer_in_buca()).await.unwrap_err();
        assert!(matches!(err, PersistenceError::Backend(RecordStoreError::Constraint(_))));
        assert_eq!(err.code(), 2102);
        assert!(repo.is_empty());
    }

    #[tokio::test]
    async fn find_by_id_missing_is_absent_on_empty_result() {
        let (_, store) = store();
        assert!(store.find_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn find_by_id_missing_is_absent_on_no_rows_signal() {
        let store = ServiceRequestStore::new(Arc::new(InMemoryRecordStore::strict_single()));
        assert!(store.find_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn find_by_id_backend_fault_is_an_error() {
        let (repo, store) = store();
        let created = store.create(washer_in_buca()).await.unwrap();
        repo.fail_next(RecordStoreError::Backend("connection reset".into()));
        let err = store.find_by_id(created.id).await.unwrap_err();
        assert!(matches!(err, PersistenceError::Backend(RecordStoreError::Backend(_))));
    }

    #[tokio::test]
    async fn find_all_orders_newest_first() {
        let (repo, store) = store();
        let base = Utc::now().fixed_offset();
        repo.seed(seeded_row("new", "buca", "washer", base - Duration::hours(2)));
        repo.seed(seeded_row("new", "buca", "washer", base));
        repo.seed(seeded_row("completed", "bornova", "fridge", base - Duration::hours(1)));
        store.create(washer_in_buca()).await.unwrap();

        let all = store.find_all(&ServiceRequestFilter::new()).await.unwrap();
        assert_eq!(all.len(), 4);
        assert!(all.windows(2).all(|w| w[0].created_at >= w[1].created_at));
        assert_eq!(all[3].created_at, base - Duration::hours(2));
    }

    #[tokio::test]
    async fn find_all_filters_combine_with_and() {
        let (repo, store) = store();
        let now = Utc::now().fixed_offset();
        repo.seed(seeded_row("completed", "buca", "washer", now));
        repo.seed(seeded_row("completed", "bornova", "washer", now));
        repo.seed(seeded_row("completed", "buca", "fridge", now));
        repo.seed(seeded_row("new", "buca", "washer", now));

        let done = store.find_all(&ServiceRequestFilter::new().with_status("completed")).await.unwrap();
        assert_eq!(done.len(), 3);
        assert!(done.iter().all(|r| r.is_completed()));

        let narrowed = store
            .find_all(&ServiceRequestFilter::new().with_status("completed").with_region("buca").with_device_type("washer"))
            .await
            .unwrap();
        assert_eq!(narrowed.len(), 1);
        assert_eq!((narrowed[0].region.as_str(), narrowed[0].device_type.as_str()), ("buca", "washer"));

        let none = store.find_all(&ServiceRequestFilter::new().with_region("karsiyaka")).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn find_all_empty_filters_are_unconstrained() {
        let (_, store) = store();
        store.create(washer_in_buca()).await.unwrap();
        store
            .create(NewServiceRequest { status: Some(RequestStatus::Completed), ..washer_in_buca() })
            .await
            .unwrap();

        let filter = ServiceRequestFilter::new().with_status("").with_region("").with_device_type("");
        assert_eq!(store.find_all(&filter).await.unwrap().len(), 2);
        assert_eq!(store.find_all(&ServiceRequestFilter::new().with_status("")).await.unwrap().len(), 2);
        assert_eq!(store.find_all(&ServiceRequestFilter::new().with_region("")).await.unwrap().len(), 2);
        assert_eq!(store.find_all(&ServiceRequestFilter::new().with_device_type("")).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn find_all_new_filter_includes_blank_stored_status() {
        let (repo, store) = store();
        let now = Utc::now().fixed_offset();
        let blank = seeded_row("", "buca", "washer", now);
        let blank_id = blank.id;
        repo.seed(blank);
        repo.seed(seeded_row("cancelled", "buca", "washer", now));

        let fresh = store.find_all(&ServiceRequestFilter::new().with_status(RequestStatus::New)).await.unwrap();
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].id, blank_id);
        assert!(fresh[0].is_new());
    }

    #[tokio::test]
    async fn find_all_status_scenario() {
        let (_, store) = store();
        let first = store.create(washer_in_buca()).await.unwrap();
        let second = store
            .create(NewServiceRequest { status: Some(RequestStatus::Completed), ..washer_in_buca() })
            .await
            .unwrap();

        let fresh = store.find_all(&ServiceRequestFilter::new().with_status(RequestStatus::New)).await.unwrap();
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].id, first.id);
        assert_ne!(fresh[0].id, second.id);
    }

    #[tokio::test]
    async fn find_all_propagates_backend_failure() {
        let (repo, store) = store();
        repo.fail_next(RecordStoreError::Backend("timeout".into()));
        assert!(store.find_all(&ServiceRequestFilter::new()).await.is_err());
    }

    #[tokio::test]
    async fn update_changes_only_patched_fields() {
        let (_, store) = store();
        let before = store.create(washer_in_buca()).await.unwrap();
        let patch = ServiceRequestPatch { issue: Some("new description".into()), ..Default::default() };
        let after = store.update(before.id, patch).await.unwrap();

        assert_eq!(after.issue, "new description");
        assert_eq!(after.id, before.id);
        assert_eq!(after.created_at, before.created_at);
        assert_eq!(after.status, before.status);
        assert_eq!(after.phone, before.phone);
        assert_eq!(after.brand, before.brand);
        let updated_at = after.updated_at.unwrap();
        assert!(updated_at >= after.created_at);
    }

    #[tokio::test]
    async fn update_bumps_updated_at_each_time() {
        let (_, store) = store();
        let created = store.create(washer_in_buca()).await.unwrap();
        let first = store.update(created.id, ServiceRequestPatch::default()).await.unwrap();
        let second = store.set_status(created.id, RequestStatus::Cancelled).await.unwrap();
        assert!(first.updated_at.is_some());
        assert!(second.updated_at >= first.updated_at);
        assert!(second.is_cancelled());
    }

    #[tokio::test]
    async fn update_allows_any_status_transition() {
        let (_, store) = store();
        let created = store
            .create(NewServiceRequest { status: Some(RequestStatus::Completed), ..washer_in_buca() })
            .await
            .unwrap();
        let reopened = store.set_status(created.id, RequestStatus::New).await.unwrap();
        assert!(reopened.is_new());
        let odd = store.set_status(created.id, RequestStatus::parse("waiting_parts")).await.unwrap();
        assert_eq!(odd.status_display(), "waiting_parts");
    }

    #[tokio::test]
    async fn update_missing_record_is_not_found() {
        let (_, store) = store();
        let id = Uuid::new_v4();
        let err = store.update(id, ServiceRequestPatch::status_change(RequestStatus::Completed)).await.unwrap_err();
        assert!(matches!(err, PersistenceError::NotFound(missing) if missing == id));

        let strict = ServiceRequestStore::new(Arc::new(InMemoryRecordStore::strict_single()));
        let err = strict.update(id, ServiceRequestPatch::default()).await.unwrap_err();
        assert!(matches!(err, PersistenceError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_from_json_rejects_identity_and_timestamps() {
        let (_, store) = store();
        let created = store.create(washer_in_buca()).await.unwrap();

        let err = store
            .update_from_json(created.id, json!({ "id": Uuid::new_v4(), "issue": "x" }))
            .await
            .unwrap_err();
        assert!(matches!(err, PersistenceError::ImmutableField(ref f) if f == "id"));
        let err = store
            .update_from_json(created.id, json!({ "created_at": "2020-01-01T00:00:00Z" }))
            .await
            .unwrap_err();
        assert!(matches!(err, PersistenceError::ImmutableField(ref f) if f == "created_at"));

        let unchanged = store.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(unchanged, created);

        let ok = store
            .update_from_json(created.id, json!({ "status": "in_progress", "whatsapp_sent": true }))
            .await
            .unwrap();
        assert!(ok.is_in_progress());
        assert!(ok.whatsapp_sent);
        assert_eq!(ok.created_at, created.created_at);
    }

    #[tokio::test]
    async fn update_record_refreshes_caller_instance() {
        let (_, store) = store();
        let mut record = store.create(washer_in_buca()).await.unwrap();
        let patch = ServiceRequestPatch { brand: Some(None), whatsapp_sent: Some(true), ..Default::default() };
        store.update_record(&mut record, patch).await.unwrap();
        assert_eq!(record.brand, None);
        assert!(record.whatsapp_sent);
        assert!(record.updated_at.is_some());
        assert_eq!(store.find_by_id(record.id).await.unwrap().unwrap(), record);
    }

    #[tokio::test]
    async fn update_propagates_backend_failure() {
        let (repo, store) = store();
        let created = store.create(washer_in_buca()).await.unwrap();
        repo.fail_next(RecordStoreError::Backend("read-only transaction".into()));
        let err = store.update(created.id, ServiceRequestPatch::default()).await.unwrap_err();
        assert!(matches!(err, PersistenceError::Backend(_)));
    }

    #[tokio::test]
    async fn delete_then_find_is_absent() {
        let (_, store) = store();
        let created = store.create(washer_in_buca()).await.unwrap();
        assert!(store.delete(created.id).await.unwrap());
        assert!(store.find_by_id(created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_missing_is_noop_success() {
        let (repo, store) = store();
        store.create(washer_in_buca()).await.unwrap();
        assert!(!store.delete(Uuid::new_v4()).await.unwrap());
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn delete_record_consumes_instance() {
        let (repo, store) = store();
        let record = store.create(washer_in_buca()).await.unwrap();
        assert!(store.delete_record(record).await.unwrap());
        assert!(repo.is_empty());
    }

    #[tokio::test]
    async fn delete_propagates_backend_failure() {
        let (repo, store) = store();
        let created = store.create(washer_in_buca()).await.unwrap();
        repo.fail_next(RecordStoreError::Backend("connection refused".into()));
        assert!(store.delete(created.id).await.is_err());
        assert_eq!(repo.len(), 1);
    }
}

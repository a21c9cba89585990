use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set, SqlErr,
};
use tracing::debug;
use uuid::Uuid;

use models::service_request::{ActiveModel, Column, Entity};

use crate::service_request::errors::RecordStoreError;
use crate::service_request::repository::{
    InsertRow, Row, RowChanges, RowFilter, RowOrder, RowQuery, ServiceRequestRecordStore,
};

/// Postgres record store over the `service_requests` table.
pub struct SeaOrmRecordStore {
    pub db: DatabaseConnection,
}

impl SeaOrmRecordStore {
    pub fn new(db: DatabaseConnection) -> Self { Self { db } }
}

fn map_db_err(e: DbErr) -> RecordStoreError {
    if matches!(e, DbErr::RecordNotFound(_) | DbErr::RecordNotUpdated) {
        return RecordStoreError::NoRows;
    }
    match e.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(msg)) | Some(SqlErr::ForeignKeyConstraintViolation(msg)) => {
            RecordStoreError::Constraint(msg)
        }
        _ => RecordStoreError::Backend(e.to_string()),
    }
}

#[async_trait::async_trait]
impl ServiceRequestRecordStore for SeaOrmRecordStore {
    async fn insert(&self, row: InsertRow) -> Result<Row, RecordStoreError> {
        let am = ActiveModel {
            id: Set(Uuid::new_v4()),
            device_type: Set(row.device_type),
            device_type_display: Set(row.device_type_display),
            brand: Set(row.brand),
            issue: Set(row.issue),
            region: Set(row.region),
            region_display: Set(row.region_display),
            phone: Set(row.phone),
            source: Set(row.source),
            whatsapp_sent: Set(row.whatsapp_sent),
            status: Set(row.status),
            created_at: Set(Utc::now().into()),
            updated_at: Set(None),
        };
        am.insert(&self.db).await.map_err(map_db_err)
    }

    async fn select(&self, query: &RowQuery) -> Result<Vec<Row>, RecordStoreError> {
        let mut q = Entity::find();
        for f in &query.filters {
            q = match f {
                RowFilter::Id(id) => q.filter(Column::Id.eq(*id)),
                RowFilter::StatusIn(any) => q.filter(Column::Status.is_in(any.iter().cloned())),
                RowFilter::Region(r) => q.filter(Column::Region.eq(r.clone())),
                RowFilter::DeviceType(d) => q.filter(Column::DeviceType.eq(d.clone())),
            };
        }
        if query.order == RowOrder::CreatedAtDesc {
            q = q.order_by_desc(Column::CreatedAt);
        }
        q.all(&self.db).await.map_err(map_db_err)
    }

    async fn update(&self, id: Uuid, changes: RowChanges) -> Result<Option<Row>, RecordStoreError> {
        let Some(found) = Entity::find_by_id(id).one(&self.db).await.map_err(map_db_err)? else {
            return Ok(None);
        };
        let mut am: ActiveModel = found.into();
        if let Some(v) = changes.device_type { am.device_type = Set(v); }
        if let Some(v) = changes.device_type_display { am.device_type_display = Set(v); }
        if let Some(v) = changes.brand { am.brand = Set(v); }
        if let Some(v) = changes.issue { am.issue = Set(v); }
        if let Some(v) = changes.region { am.region = Set(v); }
        if let Some(v) = changes.region_display { am.region_display = Set(v); }
        if let Some(v) = changes.phone { am.phone = Set(v); }
        if let Some(v) = changes.source { am.source = Set(v); }
        if let Some(v) = changes.whatsapp_sent { am.whatsapp_sent = Set(v); }
        if let Some(v) = changes.status { am.status = Set(v); }
        am.updated_at = Set(Some(changes.updated_at));
        match am.update(&self.db).await {
            Ok(row) => Ok(Some(row)),
            // Row vanished between read and write.
            Err(DbErr::RecordNotUpdated) => {
                debug!(%id, "service request removed before update");
                Ok(None)
            }
            Err(e) => Err(map_db_err(e)),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<u64, RecordStoreError> {
        let res = Entity::delete_by_id(id).exec(&self.db).await.map_err(map_db_err)?;
        Ok(res.rows_affected)
    }
}

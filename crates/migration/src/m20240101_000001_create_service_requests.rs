//! Create `service_requests` table.
//! One row per customer-submitted repair request; listing is newest-first and filtered by status/region/device.
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ServiceRequests::Table)
                    .if_not_exists()
                    .col(uuid(ServiceRequests::Id).primary_key())
                    .col(string_len(ServiceRequests::DeviceType, 64).not_null())
                    .col(string_len(ServiceRequests::DeviceTypeDisplay, 128).not_null())
                    .col(string_len_null(ServiceRequests::Brand, 128))
                    .col(text(ServiceRequests::Issue).not_null())
                    .col(string_len(ServiceRequests::Region, 64).not_null())
                    .col(string_len(ServiceRequests::RegionDisplay, 128).not_null())
                    .col(string_len(ServiceRequests::Phone, 32).not_null())
                    .col(string_len(ServiceRequests::Source, 32).not_null().default("web"))
                    .col(boolean(ServiceRequests::WhatsappSent).not_null().default(false))
                    .col(string_len(ServiceRequests::Status, 32).not_null().default("new"))
                    .col(
                        timestamp_with_time_zone(ServiceRequests::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(timestamp_with_time_zone_null(ServiceRequests::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        // Listing order
        manager
            .create_index(
                Index::create()
                    .name("idx_service_requests_created_at")
                    .table(ServiceRequests::Table)
                    .col(ServiceRequests::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_service_requests_status_region")
                    .table(ServiceRequests::Table)
                    .col(ServiceRequests::Status)
                    .col(ServiceRequests::Region)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ServiceRequests::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ServiceRequests {
    Table,
    Id,
    DeviceType,
    DeviceTypeDisplay,
    Brand,
    Issue,
    Region,
    RegionDisplay,
    Phone,
    Source,
    WhatsappSent,
    Status,
    CreatedAt,
    UpdatedAt,
}

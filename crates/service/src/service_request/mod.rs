//! Service requests: domain, record store boundary, and the store on top of it.
//!
//! `ServiceRequestStore` is the only path to persisted requests; presentation code
//! calls its operations and renders `status_display` / `formatted_created_at`.

pub mod display;
pub mod domain;
pub mod errors;
pub mod repo;
pub mod repository;
pub mod store;

pub use domain::{NewServiceRequest, RequestStatus, ServiceRequest, ServiceRequestFilter, ServiceRequestPatch};
pub use errors::{PersistenceError, RecordStoreError};
pub use repo::SeaOrmRecordStore;
pub use repository::ServiceRequestRecordStore;
pub use store::ServiceRequestStore;

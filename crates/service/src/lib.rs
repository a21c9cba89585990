//! Service layer for the appliance-repair site.
//! - `service_request`: the service-request store and its record store boundary.
//! - `runtime`: config/logging/database bootstrap.

pub mod service_request;
pub mod runtime;
#[cfg(test)]
pub mod test_support;

//! Connection handles and the participant registry

mod handle;
mod registry;

pub use handle::{run_writer, ConnectionHandle, ConnectionId, DeliveryError, DELIVERY_TIMEOUT};
pub use registry::{AdmitError, Registry, RouteError};

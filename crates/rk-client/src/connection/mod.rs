//! Connection to the router

mod connector;
mod reconnect;

pub use connector::{
    attach, run_writer, ActiveConnection, Connector, OUTBOUND_CHANNEL_CAPACITY,
};
pub use reconnect::ExponentialBackoff;

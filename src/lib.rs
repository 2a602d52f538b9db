// Library for the two binaries and for tests

pub mod config;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod routes;
pub mod shutdown;
pub mod snapshot;
pub mod store;
pub mod version;

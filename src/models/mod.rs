// Domain models: telemetry record and the CSV schema it travels in

mod record;
pub mod schema;

pub use record::Record;
pub use schema::{ParseError, RenderError, Schema};

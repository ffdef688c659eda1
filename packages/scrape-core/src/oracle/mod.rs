pub mod client;

pub use client::{lower_schema, truncate_html, FieldDescription, OracleClient, OracleOutcome, OracleRawResponse, OracleTransport, SchemaDescription};

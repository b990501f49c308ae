//! Transports to openGemini.
//!
//! Line protocol and control commands go over http, structured writes
//! over the column write rpc service. Both sit behind a trait so the
//! import can be driven without a running server.

pub use self::builder::{RecordBuilder, WriteRequestBuilder};
pub use self::column::ColumnWriterClient;
pub use self::http::{GeminiHttpClient, QueryResult};
pub use self::proto::{WriteRequest, WriteResponse};

use crate::config::Precision;
use crate::error::ImportResult;

mod builder;
mod column;
#[cfg(test)]
pub mod fake;
mod http;
pub mod proto;

/// Line protocol writes and control commands.
pub trait HttpClient {
    /// Write newline separated line protocol text.
    fn write(
        &self,
        database: &str,
        retention_policy: &str,
        lines: &str,
        precision: Precision,
    ) -> ImportResult<()>;

    /// Run one statement, statement errors are returned as `Query` errors.
    fn query(&self, command: &str, database: Option<&str>) -> ImportResult<QueryResult>;
}

/// Structured writes of column blocks.
pub trait ColumnWriter {
    fn write(&mut self, request: WriteRequest) -> ImportResult<WriteResponse>;
}

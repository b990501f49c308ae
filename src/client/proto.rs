//! Messages of the `proto.WriteService` rpc service.
//!
//! A `Record` carries the rows of one measurement. The envelope follows
//! the service, the `block` payload does not: openGemini expects its own
//! binary column record there. This crate puts a protobuf `ColumnBlock`
//! into it instead, one `Column` per tag, per field and one for the time,
//! each with a presence bitmap and the present values. A stock server
//! rejects such blocks, the layout only works against a receiver that
//! decodes `ColumnBlock`.

/// Rpc method of the structured write.
pub const WRITE_METHOD: &str = "/proto.WriteService/Write";

pub const REQUEST_VERSION: u32 = 1;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WriteRequest {
    #[prost(uint32, tag = "1")]
    pub version: u32,
    #[prost(string, tag = "2")]
    pub database: String,
    #[prost(string, tag = "3")]
    pub retention_policy: String,
    #[prost(string, tag = "4")]
    pub username: String,
    #[prost(string, tag = "5")]
    pub password: String,
    #[prost(message, repeated, tag = "6")]
    pub records: Vec<Record>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Record {
    #[prost(string, tag = "1")]
    pub measurement: String,
    #[prost(int64, tag = "2")]
    pub min_time: i64,
    #[prost(int64, tag = "3")]
    pub max_time: i64,
    #[prost(enumeration = "CompressMethod", tag = "4")]
    pub compress_method: i32,
    #[prost(bytes = "vec", tag = "5")]
    pub block: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WriteResponse {
    #[prost(enumeration = "ResponseCode", tag = "1")]
    pub code: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ColumnBlock {
    #[prost(message, repeated, tag = "1")]
    pub columns: Vec<Column>,
    #[prost(uint32, tag = "2")]
    pub row_count: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Column {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(enumeration = "ColumnType", tag = "2")]
    pub column_type: i32,
    /// Bit `i` is set when row `i` has a value.
    #[prost(bytes = "vec", tag = "3")]
    pub presence: Vec<u8>,
    #[prost(string, repeated, tag = "4")]
    pub string_values: Vec<String>,
    #[prost(int64, repeated, tag = "5")]
    pub integer_values: Vec<i64>,
    #[prost(double, repeated, tag = "6")]
    pub float_values: Vec<f64>,
    #[prost(bool, repeated, tag = "7")]
    pub boolean_values: Vec<bool>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum CompressMethod {
    Uncompressed = 0,
    Lz4Fast = 1,
    ZstdFast = 2,
    Snappy = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ResponseCode {
    Success = 0,
    Partial = 1,
    Failed = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ColumnType {
    Unknown = 0,
    Tag = 1,
    String = 2,
    Integer = 3,
    Float = 4,
    Boolean = 5,
    Time = 6,
}

#[cfg(test)]
mod test {
    use super::*;
    use prost::Message;

    #[test]
    fn test_response_code_decodes() {
        let bytes = WriteResponse { code: 1 }.encode_to_vec();
        let response = WriteResponse::decode(bytes.as_slice()).unwrap();
        assert_eq!(response.code(), ResponseCode::Partial);
        assert_eq!(WriteResponse::default().code(), ResponseCode::Success);
    }
}

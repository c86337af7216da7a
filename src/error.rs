use std::io;

use thiserror::Error;

/// Errors raised while decoding or encoding DNS wire data.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("buffer too small for {what}: need {needed} bytes, have {available}")]
    Truncated {
        what: &'static str,
        needed: usize,
        available: usize,
    },
    #[error("too many compression jumps while parsing name at offset {0}")]
    TooManyJumps(usize),
    #[error("unsupported label type {0:#04x}")]
    BadLabelType(u8),
    #[error("empty label in name {0:?}")]
    EmptyLabel(String),
    #[error("label longer than 63 bytes in name {0:?}")]
    LabelTooLong(String),
    #[error("name longer than 255 bytes: {0:?}")]
    NameTooLong(String),
    #[error("invalid escape sequence in name {0:?}")]
    BadEscape(String),
    #[error("record data of {0} bytes does not fit in RDLENGTH")]
    RdataTooLong(usize),
}

/// Failure of a zone's record lookup.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("no record for {0}")]
    NotFound(String),
    #[error("lookup failed: {0}")]
    Failed(#[from] anyhow::Error),
}

/// Why a single request produced no response. None of these stop the server.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("malformed query: {0}")]
    Decode(#[source] WireError),
    #[error("query carries no question")]
    NoQuestion,
    #[error("message is a response, not a query")]
    NotAQuery,
    #[error("no handler found for {0}")]
    NoHandler(String),
    #[error("query type {qtype} for {name} is not answered")]
    UnsupportedType { name: String, qtype: u16 },
    #[error("failed to encode response: {0}")]
    Encode(#[source] WireError),
    #[error("failed to send response: {0}")]
    Write(#[from] io::Error),
}

/// Invalid command line values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("zone spec {0:?} must look like ZONE=NAME:IP[,NAME:IP...]")]
    Malformed(String),
    #[error("zone name is empty in {0:?}")]
    EmptyZone(String),
    #[error("record {0:?} must look like NAME:IP")]
    BadRecord(String),
    #[error("{address:?} is not an IPv4 address (record {name})")]
    BadAddress { name: String, address: String },
}

//! Authoritative DNS responder that routes each query to the most specific
//! registered zone and answers A queries from that zone's records.

pub mod config;
pub mod dns_header;
pub mod dns_message;
pub mod dns_question_and_answer;
pub mod error;
pub mod responder;
pub mod server;
pub mod zone;

pub use error::{ConfigError, LookupError, ServeError, WireError};
pub use responder::{
    AddressMode, AnswerOptions, LookupFn, RecordSource, ResponseWriter, ZoneHandler,
};
pub use server::DnsServer;
pub use zone::{ZoneKind, ZoneRouter};

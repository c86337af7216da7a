use std::collections::HashMap;
use std::fmt;
use std::io;
use std::net::Ipv4Addr;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::dns_header::ResponseCode;
use crate::dns_message::{create_response_header, DnsMessage};
use crate::dns_question_and_answer::{DnsAnswer, RecordType};
use crate::error::{LookupError, ServeError};

pub const DEFAULT_TTL: u32 = 60;

/// Dynamic record lookup: query name in, address string out.
pub type LookupFn = Arc<dyn Fn(&str) -> Result<String, LookupError> + Send + Sync>;

/// Sink for a serialized response, bound to the peer that asked.
pub trait ResponseWriter {
    fn write(&self, response: &[u8]) -> io::Result<()>;
}

/// How a resolved address is placed into the A record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum AddressMode {
    /// Answer with the address as configured.
    #[default]
    Verbatim,
    /// Answer with the /24 network address (last octet zeroed).
    Slash24Network,
}

impl AddressMode {
    pub fn apply(self, ip: Ipv4Addr) -> Ipv4Addr {
        match self {
            AddressMode::Verbatim => ip,
            AddressMode::Slash24Network => Ipv4Addr::from(u32::from(ip) & 0xFFFF_FF00),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerOptions {
    pub ttl: u32,
    pub address_mode: AddressMode,
}

impl Default for AnswerOptions {
    fn default() -> Self {
        AnswerOptions {
            ttl: DEFAULT_TTL,
            address_mode: AddressMode::default(),
        }
    }
}

/// Where a zone gets its addresses from.
#[derive(Clone)]
pub enum RecordSource {
    /// Fully qualified, lowercased name -> address.
    Static(HashMap<String, String>),
    Dynamic(LookupFn),
}

impl fmt::Debug for RecordSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordSource::Static(records) => f.debug_tuple("Static").field(records).finish(),
            RecordSource::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// Answers queries for one registered zone.
#[derive(Debug, Clone)]
pub struct ZoneHandler {
    zone: String,
    source: RecordSource,
    options: AnswerOptions,
}

impl ZoneHandler {
    pub fn new(zone: impl Into<String>, source: RecordSource, options: AnswerOptions) -> Self {
        ZoneHandler {
            zone: zone.into(),
            source,
            options,
        }
    }

    /// The zone this handler was registered for.
    pub fn zone(&self) -> &str {
        &self.zone
    }

    pub fn resolve(&self, name: &str) -> Result<String, LookupError> {
        match &self.source {
            RecordSource::Static(records) => records
                .get(&name.to_ascii_lowercase())
                .cloned()
                .ok_or_else(|| LookupError::NotFound(name.to_string())),
            RecordSource::Dynamic(lookup) => lookup(name),
        }
    }

    /// Answer the first question of `request` and write the encoded response.
    pub fn serve_dns<W: ResponseWriter + ?Sized>(
        &self,
        request: &DnsMessage,
        writer: &W,
    ) -> Result<(), ServeError> {
        let question = request.questions.first().ok_or(ServeError::NoQuestion)?;

        if question.qtype != RecordType::A.to_u16() {
            return Err(ServeError::UnsupportedType {
                name: question.name.clone(),
                qtype: question.qtype,
            });
        }

        let response = answer_a(request, self)?;
        let bytes = response.to_bytes().map_err(ServeError::Encode)?;
        writer.write(&bytes)?;
        Ok(())
    }
}

/// Build the response to an A query from the handler's records.
///
/// A name the zone does not know gets NXDOMAIN; a failed lookup or an
/// address that is not IPv4 gets SERVFAIL. Both carry no answer.
pub fn answer_a(request: &DnsMessage, handler: &ZoneHandler) -> Result<DnsMessage, ServeError> {
    let question = request.questions.first().ok_or(ServeError::NoQuestion)?;
    let name = &question.name;

    let (rcode, answers) = match handler.resolve(name) {
        Ok(address) => match address.parse::<Ipv4Addr>() {
            Ok(ip) => {
                let ip = handler.options.address_mode.apply(ip);
                debug!(%name, %ip, zone = handler.zone(), "answering A query");
                let answer = DnsAnswer::new_a_record(name.clone(), handler.options.ttl, ip);
                (ResponseCode::NoError, vec![answer])
            }
            Err(_) => {
                warn!(%name, %address, zone = handler.zone(), "record is not an IPv4 address");
                (ResponseCode::ServFail, Vec::new())
            }
        },
        Err(LookupError::NotFound(_)) => {
            debug!(%name, zone = handler.zone(), "no record in zone");
            (ResponseCode::NxDomain, Vec::new())
        }
        Err(err) => {
            warn!(%name, zone = handler.zone(), error = %err, "record lookup failed");
            (ResponseCode::ServFail, Vec::new())
        }
    };

    let header = create_response_header(
        &request.header,
        request.questions.len() as u16,
        answers.len() as u16,
        rcode,
    );

    Ok(DnsMessage {
        header,
        questions: request.questions.clone(),
        answers,
    })
}

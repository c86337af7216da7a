use std::collections::HashMap;
use std::fmt::Write as _;

use tracing::{debug, info, warn};

use crate::dns_message::DnsMessage;
use crate::dns_question_and_answer::RecordType;
use crate::error::ServeError;
use crate::responder::{AnswerOptions, LookupFn, RecordSource, ResponseWriter, ZoneHandler};

/// Key of the root zone, the fallback for every name.
pub const ROOT_ZONE: &str = ".";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneKind {
    /// Name to address.
    Forward,
    /// Address to name. Not served yet.
    Reverse,
}

/// Maps zone names to handlers and picks the handler for a query name.
///
/// Built once before serving, then shared read-only between request threads.
#[derive(Debug, Default)]
pub struct ZoneRouter {
    zones: HashMap<String, ZoneHandler>,
    options: AnswerOptions,
}

impl ZoneRouter {
    pub fn new(options: AnswerOptions) -> Self {
        ZoneRouter {
            zones: HashMap::new(),
            options,
        }
    }

    /// Register `handler` under `zone`. A later registration for the same
    /// (case-insensitive) key replaces the earlier one.
    pub fn register(&mut self, zone: &str, handler: ZoneHandler) {
        self.zones.insert(zone.to_ascii_lowercase(), handler);
    }

    /// Register a forward zone answering from `records`, or from `lookup`
    /// when one is given.
    pub fn add_zone(
        &mut self,
        zone: &str,
        records: HashMap<String, String>,
        lookup: Option<LookupFn>,
        kind: ZoneKind,
    ) {
        if kind != ZoneKind::Forward {
            warn!(zone, ?kind, "only forward lookup zones are supported, skipping");
            return;
        }

        let zone = normalize_name(zone);
        let source = match lookup {
            Some(lookup) => {
                if !records.is_empty() {
                    debug!(%zone, "lookup function given, ignoring static records");
                }
                RecordSource::Dynamic(lookup)
            }
            None => RecordSource::Static(
                records
                    .into_iter()
                    .map(|(name, address)| (normalize_name(&name), address))
                    .collect(),
            ),
        };

        info!(%zone, "registered zone");
        let handler = ZoneHandler::new(zone.clone(), source, self.options);
        self.register(&zone, handler);
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Find the handler for the most specific registered zone enclosing `name`.
    ///
    /// Suffixes are tried from the full name toward the root, one label at a
    /// time, comparing with ASCII case folded. DS queries keep walking and
    /// settle on the outermost registered ancestor, since the parent zone
    /// serves DS. A registered root zone wins whenever the walk did not
    /// return early.
    pub fn find(&self, name: &str, qtype: u16) -> Option<&ZoneHandler> {
        let mut best = None;
        let mut offset = 0;

        loop {
            let key = name[offset..].to_ascii_lowercase();
            if let Some(handler) = self.zones.get(&key) {
                if qtype != RecordType::DS.to_u16() {
                    return Some(handler);
                }
                best = Some(handler);
            }

            match next_label(name.as_bytes(), offset) {
                Some(next) => offset = next,
                None => break,
            }
        }

        self.zones.get(ROOT_ZONE).or(best)
    }

    /// Route the first question of `request` to its zone handler. Responses
    /// are never answered.
    pub fn serve_dns<W: ResponseWriter + ?Sized>(
        &self,
        request: &DnsMessage,
        writer: &W,
    ) -> Result<(), ServeError> {
        if request.header.flags.qr {
            return Err(ServeError::NotAQuery);
        }
        let question = request.questions.first().ok_or(ServeError::NoQuestion)?;

        let handler = self
            .find(&question.name, question.qtype)
            .ok_or_else(|| ServeError::NoHandler(question.name.clone()))?;

        debug!(
            name = %question.name,
            qtype = question.qtype,
            zone = handler.zone(),
            "matched zone"
        );
        handler.serve_dns(request, writer)
    }
}

/// Offset just past the next unescaped dot at or after `offset`. A dot in the
/// final position does not count, so the walk never reduces a name to ".".
fn next_label(name: &[u8], offset: usize) -> Option<usize> {
    let mut escaped = false;

    for (i, &b) in name
        .iter()
        .enumerate()
        .take(name.len().saturating_sub(1))
        .skip(offset)
    {
        match b {
            b'\\' => escaped = !escaped,
            b'.' if escaped => escaped = false,
            b'.' => return Some(i + 1),
            _ => escaped = false,
        }
    }
    None
}

/// Lowercase, render bytes outside printable ASCII as `\DDD` the way the
/// codec does, and make fully qualified.
fn normalize_name(name: &str) -> String {
    let mut normalized = String::with_capacity(name.len());
    for b in name.bytes() {
        match b {
            0x21..=0x7E => normalized.push(b.to_ascii_lowercase() as char),
            _ => {
                let _ = write!(normalized, "\\{:03}", b);
            }
        }
    }

    let mut name = normalized;
    let escapes_before_dot = name
        .strip_suffix('.')
        .map(|rest| rest.bytes().rev().take_while(|&b| b == b'\\').count());
    match escapes_before_dot {
        Some(n) if n % 2 == 0 => {}
        _ => name.push('.'),
    }
    name
}

use bytes::{Bytes, BytesMut};

use crate::dns_header::{DnsFlags, DnsHeader, ResponseCode, HEADER_LEN, OPCODE_QUERY};
use crate::dns_question_and_answer::{DnsAnswer, DnsQuestion};
use crate::error::WireError;

/// A parsed DNS message. Authority and additional sections are not kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsMessage {
    pub header: DnsHeader,
    pub questions: Vec<DnsQuestion>,
    pub answers: Vec<DnsAnswer>,
}

impl DnsMessage {
    /// Build a standard query, mostly useful to clients and tests.
    pub fn query(id: u16, questions: Vec<DnsQuestion>) -> Self {
        DnsMessage {
            header: DnsHeader {
                id,
                flags: DnsFlags {
                    rd: true,
                    ..DnsFlags::default()
                },
                question_count: questions.len() as u16,
                ..DnsHeader::default()
            },
            questions,
            answers: Vec::new(),
        }
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, WireError> {
        let header = DnsHeader::from_bytes(buf)?;
        let mut offset = HEADER_LEN;

        let mut questions = Vec::new();
        for _ in 0..header.question_count {
            let (question, new_offset) = DnsQuestion::from_bytes(buf, offset)?;
            questions.push(question);
            offset = new_offset;
        }

        let mut answers = Vec::new();
        for _ in 0..header.answer_count {
            let (answer, new_offset) = DnsAnswer::from_bytes(buf, offset)?;
            answers.push(answer);
            offset = new_offset;
        }

        Ok(DnsMessage {
            header,
            questions,
            answers,
        })
    }

    pub fn to_bytes(&self) -> Result<Bytes, WireError> {
        build_response(&self.header, &self.questions, &self.answers)
    }
}

/// Create response header based on request header
pub fn create_response_header(
    request_header: &DnsHeader,
    question_count: u16,
    answer_count: u16,
    rcode: ResponseCode,
) -> DnsHeader {
    let request_flags = request_header.flags;
    let standard_query = request_flags.opcode == OPCODE_QUERY;

    let response_flags = DnsFlags {
        qr: true,                                   // This is a response
        opcode: request_flags.opcode,               // Echo opcode
        aa: true,                                   // We only answer for our own zones
        tc: false,                                  // Not truncated
        rd: standard_query && request_flags.rd,     // Echo recursion desired
        ra: false,                                  // Recursion not available
        z: 0,                                       // Reserved
        rcode,
    };

    DnsHeader {
        id: request_header.id, // Echo request ID
        flags: response_flags,
        question_count,
        answer_count,
        authority_count: 0,
        additional_count: 0,
    }
}

/// Serialize a message: header, echoed questions, then answers
pub fn build_response(
    header: &DnsHeader,
    questions: &[DnsQuestion],
    answers: &[DnsAnswer],
) -> Result<Bytes, WireError> {
    let mut response = BytesMut::with_capacity(512);

    header.write_to(&mut response);
    for question in questions {
        question.write_to(&mut response)?;
    }
    for answer in answers {
        answer.write_to(&mut response)?;
    }

    Ok(response.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns_question_and_answer::RecordType;

    #[test]
    fn test_query_from_bytes() {
        let query = DnsMessage::query(
            0xBEEF,
            vec![DnsQuestion::new("www.example.com.", RecordType::A.to_u16())],
        );
        let bytes = query.to_bytes().unwrap();

        let parsed = DnsMessage::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, query);
    }

    #[test]
    fn test_response_header_echoes_request() {
        let mut request = DnsHeader {
            id: 77,
            question_count: 1,
            ..DnsHeader::default()
        };
        request.flags.rd = true;

        let header = create_response_header(&request, 1, 1, ResponseCode::NoError);
        assert_eq!(header.id, 77);
        assert!(header.flags.qr);
        assert!(header.flags.aa);
        assert!(header.flags.rd);
        assert!(!header.flags.ra);
        assert_eq!(header.answer_count, 1);
        assert_eq!(header.flags.rcode, ResponseCode::NoError);
    }

    #[test]
    fn test_response_header_drops_rd_for_non_standard_opcode() {
        let mut request = DnsHeader::default();
        request.flags.rd = true;
        request.flags.opcode = 2;

        let header = create_response_header(&request, 0, 0, ResponseCode::NoError);
        assert_eq!(header.flags.opcode, 2);
        assert!(!header.flags.rd);
    }

    #[test]
    fn test_truncated_question_is_rejected() {
        let query = DnsMessage::query(1, vec![DnsQuestion::new("a.b.", 1)]);
        let bytes = query.to_bytes().unwrap();

        assert!(DnsMessage::from_bytes(&bytes[..bytes.len() - 2]).is_err());
    }

    #[test]
    fn test_counts_beyond_packet_fail_without_reserving() {
        let bytes = [0, 1, 1, 0, 0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0, 0];
        let err = DnsMessage::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, WireError::Truncated { what: "domain name", .. }));
    }

    #[test]
    fn test_unencodable_answer_fails() {
        let answer =
            DnsAnswer::new_a_record("a..b.".to_string(), 0, std::net::Ipv4Addr::LOCALHOST);
        let result = build_response(&DnsHeader::default(), &[], &[answer]);
        assert!(matches!(result, Err(WireError::EmptyLabel(_))));
    }
}

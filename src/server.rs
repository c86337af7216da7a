use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;

use bytes::Bytes;
use threadpool::ThreadPool;
use tracing::{debug, error, trace, warn};

use crate::dns_message::DnsMessage;
use crate::error::ServeError;
use crate::responder::ResponseWriter;
use crate::zone::ZoneRouter;

const MAX_DATAGRAM: usize = 512;

/// Datagrams allowed to wait per worker before new ones are dropped.
const QUEUED_PER_WORKER: usize = 64;

pub const DEFAULT_WORKERS: usize = 4;

/// DNS Server that answers UDP queries from a fixed set of zones
pub struct DnsServer {
    socket: Arc<UdpSocket>,
    router: Arc<ZoneRouter>,
    pool: ThreadPool,
    max_queued: usize,
}

/// The shared socket plus the peer a response goes back to.
pub struct UdpConnection {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
}

impl ResponseWriter for UdpConnection {
    fn write(&self, response: &[u8]) -> io::Result<()> {
        self.socket.send_to(response, self.peer)?;
        Ok(())
    }
}

impl DnsServer {
    /// Create a new DNS server bound to the given address, answering with
    /// `workers` threads. The router is frozen from here on.
    pub fn new(bind_addr: SocketAddr, router: ZoneRouter, workers: usize) -> io::Result<Self> {
        let socket = UdpSocket::bind(bind_addr)?;
        let workers = workers.max(1);

        Ok(Self {
            socket: Arc::new(socket),
            router: Arc::new(router),
            pool: ThreadPool::with_name("dns-worker".to_string(), workers),
            max_queued: workers * QUEUED_PER_WORKER,
        })
    }

    pub fn workers(&self) -> usize {
        self.pool.max_count()
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Run the DNS server main loop.
    /// Datagrams are handed to the worker pool; when its queue is full they
    /// are dropped. Only a receive error that is not transient ends the loop.
    pub fn run(&self) -> io::Result<()> {
        let mut buf = [0u8; MAX_DATAGRAM];

        loop {
            let (size, source) = match self.socket.recv_from(&mut buf) {
                Ok(received) => received,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::Interrupted | io::ErrorKind::ConnectionReset
                    ) =>
                {
                    debug!(error = %e, "transient receive error");
                    continue;
                }
                Err(e) => {
                    error!(error = %e, "error receiving data");
                    return Err(e);
                }
            };
            trace!(size, %source, "received datagram");

            if self.pool.queued_count() >= self.max_queued {
                warn!(%source, "worker queue full, dropping query");
                continue;
            }

            let packet = Bytes::copy_from_slice(&buf[..size]);
            let router = Arc::clone(&self.router);
            let connection = UdpConnection {
                socket: Arc::clone(&self.socket),
                peer: source,
            };

            self.pool.execute(move || handle_datagram(&router, &packet, &connection));
        }
    }
}

/// Decode one datagram, route it and write the answer. Failures are logged
/// and the request is dropped.
pub fn handle_datagram<W: ResponseWriter + ?Sized>(
    router: &ZoneRouter,
    packet: &[u8],
    writer: &W,
) {
    let result = DnsMessage::from_bytes(packet)
        .map_err(ServeError::Decode)
        .and_then(|request| router.serve_dns(&request, writer));

    match result {
        Ok(()) => {}
        Err(
            e @ (ServeError::NoQuestion
            | ServeError::NotAQuery
            | ServeError::UnsupportedType { .. }),
        ) => {
            debug!(error = %e, "dropping request");
        }
        Err(e) => warn!(error = %e, "dropping request"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::dns_header::ResponseCode;
    use crate::dns_question_and_answer::{DnsQuestion, RecordType};
    use crate::error::LookupError;
    use crate::responder::tests::RecordingWriter;
    use crate::responder::LookupFn;
    use crate::zone::ZoneKind;

    fn example_router() -> ZoneRouter {
        let mut router = ZoneRouter::default();
        router.add_zone(
            "example.com.",
            HashMap::from([("www.example.com.".to_string(), "192.168.1.10".to_string())]),
            None,
            ZoneKind::Forward,
        );
        router
    }

    fn a_query(id: u16, name: &str) -> DnsMessage {
        DnsMessage::query(id, vec![DnsQuestion::new(name, RecordType::A.to_u16())])
    }

    fn client() -> UdpSocket {
        let client = UdpSocket::bind("127.0.0.1:0").unwrap();
        client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        client
    }

    #[test]
    fn test_garbage_is_dropped() {
        let writer = RecordingWriter::default();
        handle_datagram(&example_router(), &[0xde, 0xad], &writer);
        assert!(writer.sent.borrow().is_empty());
    }

    #[test]
    fn test_responses_are_not_answered() {
        let mut message = a_query(7, "www.example.com.");
        message.header.flags.qr = true;

        let writer = RecordingWriter::default();
        handle_datagram(&example_router(), &message.to_bytes().unwrap(), &writer);
        assert!(writer.sent.borrow().is_empty());
    }

    #[test]
    fn test_non_query_opcode_is_answered_without_rd() {
        let mut message = a_query(8, "www.example.com.");
        message.header.flags.opcode = 4;

        let writer = RecordingWriter::default();
        handle_datagram(&example_router(), &message.to_bytes().unwrap(), &writer);

        let sent = writer.sent.borrow();
        let response = DnsMessage::from_bytes(&sent[0]).unwrap();
        assert_eq!(response.header.flags.opcode, 4);
        assert!(!response.header.flags.rd);
        assert_eq!(response.answers[0].ipv4(), Some(Ipv4Addr::new(192, 168, 1, 10)));
    }

    #[test]
    fn test_serves_over_udp() {
        let server =
            DnsServer::new("127.0.0.1:0".parse().unwrap(), example_router(), 2).unwrap();
        let server_addr = server.local_addr().unwrap();
        thread::spawn(move || server.run());

        let client = client();

        // unknown zone: nothing comes back, the next query still gets served
        let unknown = a_query(1, "example.org.");
        client.send_to(&unknown.to_bytes().unwrap(), server_addr).unwrap();

        let query = a_query(2, "www.example.com.");
        client.send_to(&query.to_bytes().unwrap(), server_addr).unwrap();

        let mut buf = [0u8; 512];
        let (size, _) = client.recv_from(&mut buf).unwrap();
        let response = DnsMessage::from_bytes(&buf[..size]).unwrap();

        assert_eq!(response.header.id, 2);
        assert_eq!(response.header.flags.rcode, ResponseCode::NoError);
        assert_eq!(response.header.answer_count, 1);
        assert_eq!(response.answers[0].name, "www.example.com.");
        assert_eq!(response.answers[0].ipv4(), Some(Ipv4Addr::new(192, 168, 1, 10)));
    }

    #[test]
    fn test_slow_lookups_stay_within_worker_count() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let lookup: LookupFn = {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            Arc::new(move |_: &str| {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(50));
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, LookupError>("10.0.0.5".to_string())
            })
        };
        let mut router = ZoneRouter::default();
        router.add_zone("slow.", HashMap::new(), Some(lookup), ZoneKind::Forward);

        let server = DnsServer::new("127.0.0.1:0".parse().unwrap(), router, 2).unwrap();
        assert_eq!(server.workers(), 2);
        let server_addr = server.local_addr().unwrap();
        thread::spawn(move || server.run());

        let client = client();
        for id in 0..20 {
            let query = a_query(id, "db.slow.");
            client.send_to(&query.to_bytes().unwrap(), server_addr).unwrap();
        }

        let mut buf = [0u8; 512];
        for _ in 0..20 {
            let (size, _) = client.recv_from(&mut buf).unwrap();
            let response = DnsMessage::from_bytes(&buf[..size]).unwrap();
            assert_eq!(response.answers[0].ipv4(), Some(Ipv4Addr::new(10, 0, 0, 5)));
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}

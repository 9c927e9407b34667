//! The transport FSM: a single in-flight query driven entirely by
//! `check()`, which never blocks. It either makes progress, finishes, or
//! returns `DNSError::Again` for the
//! caller to retry once `pollin()`/`pollout()` says the underlying fd is
//! ready. UDP first, promoted to TCP on a truncated answer or on explicit
//! request; TCP framing is the standard 2-byte big-endian length prefix.
use std::io::{self, Read, Write};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpStream, UdpSocket};
use std::os::unix::io::AsRawFd;
use std::time::{Duration, Instant};

use log::{debug, trace};
use socket2::{Domain, Protocol, Socket as Socket2, Type};

use crate::error::{DNSError, DNSResult};
use crate::packet::Packet;
use crate::prng::{OsPrng, Prng};
use crate::rfc1035::DNSPacketHeader;

/// Bound on spoofed/stale UDP datagrams drained in a single `check()` call
/// before giving up and returning `Again` for this round. Prevents an
/// attacker flooding the socket from starving the caller's event loop.
const MAX_SPURIOUS_DATAGRAMS: usize = 8;

const MIN_TCP_BUF: usize = 512;

/// Number of random ephemeral ports tried before giving up and falling back
/// to letting the OS pick one.
const EPHEMERAL_PORT_ATTEMPTS: usize = 7;
const EPHEMERAL_PORT_LO: u32 = 1025;
const EPHEMERAL_PORT_HI: u32 = 65535;

/// Bind `sock` to `local`: an explicit nonzero port is bound directly; a
/// configured port of 0 (or no configured address at all) means "pick one
/// for me" and tries up to `EPHEMERAL_PORT_ATTEMPTS` random ephemeral ports
/// first. `local == None` leaves the address unspecified, matching
/// `peer`'s family.
fn bind_local(sock: &Socket2, local: Option<SocketAddr>, peer: SocketAddr, prng: &mut dyn Prng) -> io::Result<()> {
    let ip = local.map(|a| a.ip()).unwrap_or_else(|| unspecified_for(peer));
    let port = local.map(|a| a.port()).unwrap_or(0);

    if port != 0 {
        return sock.bind(&SocketAddr::new(ip, port).into());
    }

    let mut last_err = None;
    for _ in 0..EPHEMERAL_PORT_ATTEMPTS {
        let span = EPHEMERAL_PORT_HI - EPHEMERAL_PORT_LO + 1;
        let candidate = EPHEMERAL_PORT_LO + (prng.next_u32() % span);
        match sock.bind(&SocketAddr::new(ip, candidate as u16).into()) {
            Ok(()) => return Ok(()),
            Err(e) => last_err = Some(e),
        }
    }
    // every random attempt collided; let the OS assign a port on first use
    // instead of failing the whole exchange over a transient bind conflict.
    debug!("giving up on explicit ephemeral port after {} attempts: {:?}", EPHEMERAL_PORT_ATTEMPTS, last_err);
    Ok(())
}

fn unspecified_for(peer: SocketAddr) -> IpAddr {
    if peer.is_ipv4() {
        IpAddr::V4(Ipv4Addr::UNSPECIFIED)
    } else {
        IpAddr::V6(Ipv6Addr::UNSPECIFIED)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    UdpInit,
    UdpConnect,
    UdpSend,
    UdpRecv,
    UdpDone,
    TcpInit,
    TcpConnect,
    TcpSend,
    TcpRecv,
    TcpDone,
    Failed,
}

/// The question a received answer is checked against, so a transport
/// handles verification itself rather than leaving it to the resolver:
/// matching transaction ID and an echoed QNAME/QTYPE/QCLASS, both required
/// before an answer is accepted.
#[derive(Debug, Clone)]
struct Expected {
    id: u16,
    qname: String,
    qtype: u16,
    qclass: u16,
}

fn expected_from(query: &Packet) -> DNSResult<Expected> {
    let header = query.header()?;
    let (qname, after_name) = query.expand_name(12)?;
    let qtype = query.read_u16(after_name)?;
    let qclass = query.read_u16(after_name + 2)?;
    Ok(Expected { id: header.id, qname, qtype, qclass })
}

fn verify(answer: &Packet, expected: &Expected) -> DNSResult<bool> {
    let header = answer.header()?;
    if header.id != expected.id || header.qd_count == 0 {
        return Ok(false);
    }
    let (qname, after_name) = answer.expand_name(12)?;
    let qtype = answer.read_u16(after_name)?;
    let qclass = answer.read_u16(after_name + 2)?;
    Ok(qname.eq_ignore_ascii_case(&expected.qname) && qtype == expected.qtype && qclass == expected.qclass)
}

/// One in-flight query/response exchange, restartable across non-blocking
/// `check()` calls. A transport never owns more state than one outstanding
/// exchange.
pub struct Socket {
    state: State,
    peer: SocketAddr,
    local: Option<SocketAddr>,
    query: Vec<u8>,
    sent: usize,
    expected: Expected,
    started_at: Instant,
    timeout: Duration,

    udp: Option<UdpSocket>,
    udp_recv_buf: Vec<u8>,

    tcp_connecting: Option<Socket2>,
    tcp: Option<TcpStream>,
    tcp_out: Vec<u8>,
    tcp_len_buf: [u8; 2],
    tcp_len_got: usize,
    tcp_body: Vec<u8>,
    tcp_body_got: usize,

    answer: Option<Packet>,
}

impl Socket {
    /// Begin a new exchange: `query` must already carry its final
    /// transaction ID (the resolver draws it from a `prng::Permutor`
    /// before calling `submit`, so the permutor's full-period
    /// non-repeating guarantee covers every query this process sends, not
    /// just the ones a given `Socket` happens to carry).
    pub fn submit(query: Packet, peer: SocketAddr, timeout: Duration) -> DNSResult<Self> {
        Self::submit_from(query, peer, None, timeout)
    }

    /// Like `submit`, but binds the UDP (and TCP, if reached) socket to
    /// `local` first — the `ResolverConfig::interface` seam. `local ==
    /// None` leaves the bind address unspecified; a zero port in either
    /// case goes through the random-ephemeral-port retry loop.
    pub fn submit_from(query: Packet, peer: SocketAddr, local: Option<SocketAddr>, timeout: Duration) -> DNSResult<Self> {
        let expected = expected_from(&query)?;
        Ok(Socket {
            state: State::UdpInit,
            peer,
            local,
            query: query.bytes().to_vec(),
            sent: 0,
            expected,
            started_at: Instant::now(),
            timeout,
            udp: None,
            udp_recv_buf: vec![0u8; 65535],
            tcp_connecting: None,
            tcp: None,
            tcp_out: Vec::new(),
            tcp_len_buf: [0u8; 2],
            tcp_len_got: 0,
            tcp_body: Vec::new(),
            tcp_body_got: 0,
            answer: None,
        })
    }

    /// Force promotion to TCP without attempting UDP at all. Used when the
    /// caller already knows the query needs a reliable transport (e.g. an
    /// AXFR-shaped request; out of scope for RR types this crate builds,
    /// but the seam exists for a caller that constructs one itself).
    pub fn submit_tcp(query: Packet, peer: SocketAddr, timeout: Duration) -> DNSResult<Self> {
        let mut socket = Self::submit(query, peer, timeout)?;
        socket.state = State::TcpInit;
        Ok(socket)
    }

    /// Restart the same query/peer/transaction-id over TCP, after a UDP
    /// answer came back truncated (`DNSPacketFlags::truncated`). The
    /// caller is expected to check that flag itself and call this instead
    /// of `fetch()`.
    pub fn retry_over_tcp(&mut self) {
        self.state = State::TcpInit;
        self.sent = 0;
        self.tcp_len_got = 0;
        self.tcp_body.clear();
        self.tcp_body_got = 0;
        self.answer = None;
        self.started_at = Instant::now();
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, State::UdpDone | State::TcpDone)
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    fn timed_out(&self) -> bool {
        self.elapsed() >= self.timeout
    }

    /// The fd `check()` is currently waiting on, for a caller driving its
    /// own `poll`/`select` loop. `None` once the exchange is done or failed.
    fn current_fd(&self) -> Option<i32> {
        match self.state {
            State::UdpConnect | State::UdpSend | State::UdpRecv => self.udp.as_ref().map(|s| s.as_raw_fd()),
            State::TcpConnect | State::TcpSend | State::TcpRecv => self
                .tcp
                .as_ref()
                .map(|s| s.as_raw_fd())
                .or_else(|| self.tcp_connecting.as_ref().map(|s| s.as_raw_fd())),
            _ => None,
        }
    }

    /// Should the caller's poll loop watch for readability?
    pub fn pollin(&self) -> bool {
        matches!(self.state, State::UdpRecv | State::TcpRecv) && self.current_fd().is_some()
    }

    /// Should the caller's poll loop watch for writability (includes a
    /// pending non-blocking `connect()`, which completes as a write-ready
    /// event)?
    pub fn pollout(&self) -> bool {
        matches!(
            self.state,
            State::UdpConnect | State::UdpSend | State::TcpConnect | State::TcpSend
        ) && self.current_fd().is_some()
    }

    /// Take the verified answer once `is_done()`. Returns `Again` if
    /// called before then. Callers should check `is_done()` first; this
    /// is just the safe-by-construction version of that check.
    pub fn fetch(&mut self) -> DNSResult<Packet> {
        if !self.is_done() {
            return Err(DNSError::Again);
        }
        self.answer.take().ok_or(DNSError::Unknown)
    }

    /// Drive the state machine forward without blocking. Returns `Ok(())`
    /// once `is_done()`, `Err(Again)` if it would otherwise block (the
    /// caller should wait on `pollin()`/`pollout()` and call again), or any
    /// other `DNSError` on a real failure (including timeout).
    pub fn check(&mut self) -> DNSResult<()> {
        loop {
            if self.timed_out() && !self.is_done() {
                debug!("transport to {} timed out in state {:?}", self.peer, self.state);
                self.state = State::Failed;
                return Err(DNSError::new("query timed out"));
            }

            match self.state {
                State::UdpInit => self.udp_init()?,
                State::UdpConnect => self.udp_connect()?,
                State::UdpSend => self.udp_send()?,
                State::UdpRecv => {
                    if self.udp_recv()? {
                        return Ok(());
                    }
                }
                State::UdpDone | State::TcpDone => return Ok(()),
                State::TcpInit => self.tcp_init()?,
                State::TcpConnect => self.tcp_connect()?,
                State::TcpSend => self.tcp_send()?,
                State::TcpRecv => {
                    if self.tcp_recv()? {
                        return Ok(());
                    }
                }
                State::Failed => return Err(DNSError::Unknown),
            }
        }
    }

    fn udp_init(&mut self) -> DNSResult<()> {
        let domain = if self.peer.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
        let sock = Socket2::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        sock.set_nonblocking(true)?;
        bind_local(&sock, self.local, self.peer, &mut OsPrng)?;
        let udp: UdpSocket = sock.into();
        self.udp = Some(udp);
        self.state = State::UdpConnect;
        Ok(())
    }

    /// `connect()` on a UDP socket is a purely local operation (it records
    /// the peer for `send`/`recv` without a handshake) so it never
    /// actually blocks, but the state exists to keep the FSM symmetric
    /// with the TCP side and to give retries a place to land on EINTR.
    fn udp_connect(&mut self) -> DNSResult<()> {
        match self.udp.as_ref().unwrap().connect(self.peer) {
            Ok(()) => {
                self.state = State::UdpSend;
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn udp_send(&mut self) -> DNSResult<()> {
        loop {
            match self.udp.as_ref().unwrap().send(&self.query) {
                Ok(_) => {
                    self.state = State::UdpRecv;
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Returns `Ok(true)` once a verified answer is in hand (state moved to
    /// `UdpDone`), `Ok(false)` if it drained only spurious datagrams and
    /// should be called again later.
    fn udp_recv(&mut self) -> DNSResult<bool> {
        for _ in 0..MAX_SPURIOUS_DATAGRAMS {
            match self.udp.as_ref().unwrap().recv(&mut self.udp_recv_buf) {
                Ok(n) => {
                    let packet = Packet::from_wire(self.udp_recv_buf[..n].to_vec());
                    if !verify(&packet, &self.expected)? {
                        trace!("discarding unverified datagram from {}", self.peer);
                        continue; // spoofed or stale reply; keep draining
                    }
                    self.answer = Some(packet);
                    self.state = State::UdpDone;
                    return Ok(true);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(false)
    }

    fn tcp_init(&mut self) -> DNSResult<()> {
        let domain = if self.peer.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
        let sock = Socket2::new(domain, Type::STREAM, Some(Protocol::TCP))?;
        sock.set_nonblocking(true)?;
        if let Some(local) = self.local {
            sock.bind(&local.into())?;
        }
        self.tcp_connecting = Some(sock);

        let len = (self.query.len() as u16).to_be_bytes();
        self.tcp_out = Vec::with_capacity(2 + self.query.len());
        self.tcp_out.extend_from_slice(&len);
        self.tcp_out.extend_from_slice(&self.query);

        self.state = State::TcpConnect;
        Ok(())
    }

    fn tcp_connect(&mut self) -> DNSResult<()> {
        let sock = self.tcp_connecting.as_ref().unwrap();
        match sock.connect(&self.peer.into()) {
            Ok(()) => self.tcp_connect_done(),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(()),
            // EINPROGRESS/EALREADY: the connect is in flight, poll for
            // writability and call check() again.
            Err(e) if matches!(e.raw_os_error(), Some(libc::EINPROGRESS) | Some(libc::EALREADY)) => {
                Err(DNSError::Again)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Err(DNSError::Again),
            Err(e) => Err(e.into()),
        }
    }

    fn tcp_connect_done(&mut self) -> DNSResult<()> {
        let sock = self.tcp_connecting.take().unwrap();
        if let Some(err) = sock.take_error()? {
            return Err(err.into());
        }
        self.tcp = Some(sock.into());
        self.state = State::TcpSend;
        Ok(())
    }

    fn tcp_send(&mut self) -> DNSResult<()> {
        loop {
            match self.tcp.as_mut().unwrap().write(&self.tcp_out[self.sent..]) {
                Ok(0) => return Err(DNSError::new("connection closed while sending query")),
                Ok(n) => {
                    self.sent += n;
                    if self.sent == self.tcp_out.len() {
                        self.state = State::TcpRecv;
                        return Ok(());
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn tcp_recv(&mut self) -> DNSResult<bool> {
        if self.tcp_len_got < 2 {
            if !self.tcp_read_exact_into_len_buf()? {
                return Ok(false);
            }
            let body_len = u16::from_be_bytes(self.tcp_len_buf) as usize;
            self.tcp_body = vec![0u8; body_len.max(MIN_TCP_BUF)];
            self.tcp_body.truncate(body_len);
        }

        loop {
            if self.tcp_body_got == self.tcp_body.len() {
                let packet = Packet::from_wire(std::mem::take(&mut self.tcp_body));
                if !verify(&packet, &self.expected)? {
                    return Err(DNSError::Unknown);
                }
                self.answer = Some(packet);
                self.state = State::TcpDone;
                return Ok(true);
            }
            match self.tcp.as_mut().unwrap().read(&mut self.tcp_body[self.tcp_body_got..]) {
                Ok(0) => return Err(DNSError::new("connection closed before full answer received")),
                Ok(n) => self.tcp_body_got += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn tcp_read_exact_into_len_buf(&mut self) -> DNSResult<bool> {
        loop {
            match self.tcp.as_mut().unwrap().read(&mut self.tcp_len_buf[self.tcp_len_got..]) {
                Ok(0) => return Err(DNSError::new("connection closed before length prefix received")),
                Ok(n) => {
                    self.tcp_len_got += n;
                    if self.tcp_len_got == 2 {
                        return Ok(true);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Used only by the resolver FSM to decide whether an answer needs the
/// `retry_over_tcp` path: truncated answers are retried over TCP
/// transparently.
pub fn is_truncated(header: &DNSPacketHeader) -> bool {
    header.flags.truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::Name;
    use crate::rfc1035::{DNSPacketHeader, PacketType};
    use crate::rr::{CLASS_IN, TYPE_A};

    fn sample_query() -> Packet {
        let mut p = Packet::new(512);
        let mut header = DNSPacketHeader::default();
        header.id = 0x1234;
        header.flags.packet_type = PacketType::Query;
        header.flags.recursion_desired = true;
        p.set_header(&header).unwrap();
        let name = Name::try_from("example.com").unwrap();
        p.push_question(&name, TYPE_A, CLASS_IN).unwrap();
        p
    }

    #[test]
    fn fresh_socket_starts_in_udp_init() {
        let query = sample_query();
        let peer: SocketAddr = "127.0.0.1:53".parse().unwrap();
        let socket = Socket::submit(query, peer, Duration::from_secs(5)).unwrap();
        assert_eq!(socket.state, State::UdpInit);
        assert!(!socket.is_done());
    }

    #[test]
    fn verify_rejects_mismatched_transaction_id() {
        let query = sample_query();
        let expected = expected_from(&query).unwrap();

        let mut wrong = Packet::new(512);
        let mut header = DNSPacketHeader::default();
        header.id = expected.id.wrapping_add(1);
        header.flags.packet_type = PacketType::Response;
        wrong.set_header(&header).unwrap();
        let name = Name::try_from("example.com").unwrap();
        wrong.push_question(&name, TYPE_A, CLASS_IN).unwrap();

        assert!(!verify(&wrong, &expected).unwrap());
    }

    #[test]
    fn submit_tcp_starts_past_udp() {
        let query = sample_query();
        let peer: SocketAddr = "127.0.0.1:53".parse().unwrap();
        let socket = Socket::submit_tcp(query, peer, Duration::from_secs(5)).unwrap();
        assert_eq!(socket.state, State::TcpInit);
    }

    #[test]
    fn submit_from_carries_the_configured_local_address() {
        let query = sample_query();
        let peer: SocketAddr = "127.0.0.1:53".parse().unwrap();
        let local: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let socket = Socket::submit_from(query, peer, Some(local), Duration::from_secs(5)).unwrap();
        assert_eq!(socket.local, Some(local));
    }

    #[test]
    fn bind_local_with_explicit_nonzero_port_binds_directly() {
        // bind once with an OS-assigned port to find one known free, then
        // bind a second socket directly to that exact port.
        let probe = Socket2::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).unwrap();
        probe.bind(&"127.0.0.1:0".parse::<SocketAddr>().unwrap().into()).unwrap();
        let free_port = probe.local_addr().unwrap().as_socket().unwrap().port();
        drop(probe);

        let sock = Socket2::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).unwrap();
        let peer: SocketAddr = "127.0.0.1:53".parse().unwrap();
        let local: SocketAddr = format!("127.0.0.1:{}", free_port).parse().unwrap();
        bind_local(&sock, Some(local), peer, &mut OsPrng).unwrap();
        let bound: SocketAddr = sock.local_addr().unwrap().as_socket().unwrap();
        assert_eq!(bound, local);
    }

    #[test]
    fn bind_local_without_config_tries_random_ephemeral_ports() {
        struct Fixed(u32);
        impl Prng for Fixed {
            fn next_u32(&mut self) -> u32 {
                self.0
            }
        }
        let sock = Socket2::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).unwrap();
        let peer: SocketAddr = "127.0.0.1:53".parse().unwrap();
        let mut prng = Fixed(12345);
        bind_local(&sock, None, peer, &mut prng).unwrap();
        let bound: SocketAddr = sock.local_addr().unwrap().as_socket().unwrap();
        assert!(bound.port() >= EPHEMERAL_PORT_LO as u16);
    }
}

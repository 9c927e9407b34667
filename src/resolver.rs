//! The resolver FSM: turns a single `(qname, qtype, qclass)`
//! question into a final answer packet, driven non-blockingly by `check()`
//! exactly like `transport::Socket`. Consults the hosts table first, then
//! either queries the configured (stub) nameservers directly or, lacking
//! any, walks the delegation chain from root hints (recursive mode).
//! Handles the search list, CNAME chasing, referral descent via a bounded
//! frame stack, and (in `smart` mode) following up MX/NS/SRV targets with
//! their own address lookup.
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, SocketAddr};
use std::rc::Rc;

use log::{debug, trace, warn};

use crate::error::{DNSError, DNSResult};
use crate::hints::HintsTable;
use crate::hosts::HostsTable;
use crate::name::Name;
use crate::packet::{Packet, Section};
use crate::prng::{Permutor, Prng};
use crate::resconf::{LookupSource, ResolverConfig};
use crate::rfc1035::{DNSPacketHeader, PacketType, ResponseCode};
use crate::rr::{Rdata, CLASS_IN, TYPE_A, TYPE_CNAME, TYPE_MX, TYPE_NS, TYPE_SRV};
use crate::rr_iterator::{RrFilter, RrIterator, SortOrder};
use crate::transport::Socket;
use crate::util::anchor;

/// Depth of the frame stack: one level per CNAME hop, referral descent, or
/// `smart`-mode follow-up. This bound is what keeps a hostile delegation
/// chain or CNAME loop from running forever.
const MAX_FRAME_DEPTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Init,
    Glue,
    Hosts,
    NextCandidate,
    Dispatch,
    WaitAnswer,
    Iterate,
    PopFrame,
    Finish,
    Done,
}

/// Why a frame was pushed: distinguishes the three reasons the resolver
/// ever needs to chase a *different* name than the one the caller asked
/// for, so `Iterate` knows what to do once that sub-resolution lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FramePurpose {
    /// Following a CNAME found in the answer for the frame below.
    CnameChase,
    /// Resolving the address of a delegated nameserver with no glue.
    GlueLookup,
    /// `smart` mode: resolving the address of an MX/NS/SRV target so it can
    /// be merged into the final answer's additional section.
    SmartFollowup,
}

/// One level of in-flight resolution. Search-list expansion lives at the
/// bottom frame only: sub-resolutions triggered by `FramePurpose` always
/// target an already-absolute name, never the search list.
struct Frame {
    qname: Name,
    qtype: u16,
    candidates: Vec<Name>,
    candidate_index: usize,
    zone: Name,
    nameservers: Vec<SocketAddr>,
    ns_index: usize,
    attempt: u32,
    purpose: Option<FramePurpose>,
    /// Filled in once this frame's query lands with a usable answer.
    answer: Option<Packet>,
    /// Set once the bottom frame's `smart`-mode follow-up has run (or been
    /// skipped), so `do_pop_frame` knows not to re-enter it on the next
    /// pop. Only ever touched on the bottom (purpose-less) frame.
    smart_done: bool,
}

impl Frame {
    fn leaf(qname: Name, qtype: u16, candidates: Vec<Name>, purpose: Option<FramePurpose>) -> Self {
        Frame {
            qname,
            qtype,
            candidates,
            candidate_index: 0,
            zone: Name::root(),
            nameservers: Vec::new(),
            ns_index: 0,
            attempt: 0,
            purpose,
            answer: None,
            smart_done: false,
        }
    }

    fn current_candidate(&self) -> Option<&Name> {
        self.candidates.get(self.candidate_index)
    }
}

/// Single-threaded, restartable DNS resolver. Owns a non-blocking
/// `transport::Socket` for at most one in-flight exchange at a time;
/// `check()` drives the whole multi-step resolution forward without ever
/// blocking, returning `Again` whenever the caller should wait on
/// `pollin()`/`pollout()`.
pub struct Resolver {
    config: ResolverConfig,
    hosts: Rc<RefCell<HostsTable>>,
    hints: Rc<RefCell<HintsTable>>,
    prng: Rc<RefCell<dyn Prng>>,
    permutor: Permutor,

    state: State,
    frames: Vec<Frame>,
    socket: Option<Socket>,
    qclass: u16,
    /// Every A/AAAA RR seen anywhere in this resolution's traffic so far,
    /// keyed by owner name. Consulted before a `GlueLookup` sub-resolution
    /// is pushed: a delegated nameserver already seen with an address
    /// elsewhere in this session never needs a fresh query.
    known_addrs: HashMap<String, Vec<IpAddr>>,
    /// Built incrementally as frames complete: the original answer, plus
    /// any CNAME chase or smart-mode follow-up merged in.
    final_answer: Option<Packet>,
    final_error: Option<ResponseCode>,
}

impl Resolver {
    pub fn new(
        config: ResolverConfig,
        hosts: Rc<RefCell<HostsTable>>,
        hints: Rc<RefCell<HintsTable>>,
        prng: Rc<RefCell<dyn Prng>>,
    ) -> Self {
        let permutor = {
            let mut p = prng.borrow_mut();
            Permutor::new(&mut *p, 0, 0xFFFF)
        };
        Resolver {
            config,
            hosts,
            hints,
            prng,
            permutor,
            state: State::Init,
            frames: Vec::new(),
            socket: None,
            qclass: CLASS_IN,
            known_addrs: HashMap::new(),
            final_answer: None,
            final_error: None,
        }
    }

    /// Begin resolving `qname`/`qtype`/`qclass`. Resets all per-query state:
    /// a `Resolver` handles one question at a time, restarted by a fresh
    /// call to this method once `check()` reports `Done` (via `answer()`).
    pub fn resolve(&mut self, qname: &str, qtype: u16, qclass: u16) -> DNSResult<()> {
        let absolute = qname.ends_with('.');
        let candidates = self.build_candidates(qname, absolute)?;

        self.state = State::Init;
        self.frames.clear();
        self.frames.push(Frame::leaf(Name::try_from(qname)?, qtype, candidates, None));
        self.socket = None;
        self.qclass = qclass;
        self.known_addrs.clear();
        self.final_answer = None;
        self.final_error = None;
        Ok(())
    }

    /// Classic stub-resolver search-list ordering: a name with at least
    /// `ndots` dots is tried absolute first, search suffixes after; a name
    /// with fewer is tried against every search suffix first, absolute
    /// last. An already-absolute name (trailing dot in the caller's input)
    /// skips the search list entirely.
    fn build_candidates(&self, qname: &str, absolute: bool) -> DNSResult<Vec<Name>> {
        let bare = qname.trim_end_matches('.');
        let dots = bare.matches('.').count() as u32;
        let as_is = Name::try_from(qname)?;

        if absolute || self.config.search.is_empty() {
            return Ok(vec![as_is]);
        }

        let mut suffixed = Vec::with_capacity(self.config.search.len());
        for suffix in &self.config.search {
            let combined = format!("{}.{}", bare, suffix.as_str());
            suffixed.push(Name::try_from(combined.as_str())?);
        }

        let mut candidates = Vec::with_capacity(suffixed.len() + 1);
        if dots >= self.config.options.ndots {
            candidates.push(as_is.clone());
            candidates.extend(suffixed);
        } else {
            candidates.extend(suffixed);
            candidates.push(as_is.clone());
        }
        Ok(candidates)
    }

    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    pub fn pollin(&self) -> bool {
        self.socket.as_ref().map(|s| s.pollin()).unwrap_or(false)
    }

    pub fn pollout(&self) -> bool {
        self.socket.as_ref().map(|s| s.pollout()).unwrap_or(false)
    }

    /// Take the finished answer. A `ResponseCode` other than `NoError` is
    /// still returned as a well-formed packet (SERVFAIL synthesis, NXDOMAIN
    /// passthrough) rather than as an error; only a transport or protocol
    /// failure surfaces through `check()`'s `Err`.
    pub fn answer(&mut self) -> DNSResult<Packet> {
        if !self.is_done() {
            return Err(DNSError::Again);
        }
        self.final_answer.take().ok_or(DNSError::Unknown)
    }

    pub fn check(&mut self) -> DNSResult<()> {
        loop {
            match self.state {
                State::Done => return Ok(()),
                State::Init => self.do_init()?,
                State::Glue => self.do_glue()?,
                State::Hosts => self.do_hosts()?,
                State::NextCandidate => self.do_next_candidate()?,
                State::Dispatch => self.do_dispatch()?,
                State::WaitAnswer => {
                    if !self.do_wait_answer()? {
                        return Err(DNSError::Again);
                    }
                }
                State::Iterate => self.do_iterate()?,
                State::PopFrame => self.do_pop_frame()?,
                State::Finish => self.do_finish()?,
            }
        }
    }

    fn top(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("resolve() pushes the first frame")
    }

    fn do_init(&mut self) -> DNSResult<()> {
        self.state = if self.frames.len() > 1 { State::Glue } else { self.switch_state() };
        Ok(())
    }

    fn switch_state(&self) -> State {
        if self.config.lookup.contains(&LookupSource::File) {
            State::Hosts
        } else {
            State::NextCandidate
        }
    }

    /// §4.F's GLUE state: a sub-frame (pushed for a CNAME chase, an NS glue
    /// lookup, or a smart follow-up) first checks whether any *ancestor*
    /// frame's answer already carries what it's asking for — a direct RR at
    /// `(qname, qtype)`, or a CNAME at `qname` — before issuing a query of
    /// its own. This is the recursion-shortcut that makes e.g. an NS→A
    /// glue sub-query free when the glue was already present in a referral
    /// seen earlier in this same resolution.
    fn do_glue(&mut self) -> DNSResult<()> {
        if self.frames.len() <= 1 {
            self.state = self.switch_state();
            return Ok(());
        }

        let qname = self.top().qname.clone();
        let qtype = self.top().qtype;
        let qclass = self.qclass;
        let ancestor_count = self.frames.len() - 1;

        for i in (0..ancestor_count).rev() {
            let ancestor_answer = match self.frames[i].answer.clone() {
                Some(a) => a,
                None => continue,
            };

            if let Some(local) = extract_matching_answer(&ancestor_answer, &qname, qtype, qclass)? {
                self.top().answer = Some(local);
                self.state = State::PopFrame;
                return Ok(());
            }

            if qtype != TYPE_CNAME {
                if let Some((cname_answer, target)) = extract_local_cname(&ancestor_answer, &qname, qtype, qclass)? {
                    return self.chase_cname(cname_answer, target);
                }
            }
        }

        self.state = self.switch_state();
        Ok(())
    }

    fn do_hosts(&mut self) -> DNSResult<()> {
        let candidate = self.top().current_candidate().cloned();
        let (qtype, qclass) = (self.top().qtype, self.qclass);
        if let Some(name) = candidate {
            let hit = self.hosts.borrow().query(name.as_str(), qtype, qclass)?;
            if let Some(packet) = hit {
                self.top().answer = Some(packet);
                self.state = State::Iterate;
                return Ok(());
            }
        }
        self.state = State::NextCandidate;
        Ok(())
    }

    /// Advance to the next search-list candidate for the current frame, or
    /// give up (NXDOMAIN) once they're exhausted.
    fn do_next_candidate(&mut self) -> DNSResult<()> {
        if !self.config.lookup.contains(&LookupSource::Bind) {
            self.final_error = Some(ResponseCode::ServFail);
            self.state = State::Finish;
            return Ok(());
        }
        if self.top().current_candidate().is_none() {
            self.final_error = Some(ResponseCode::NXDomain);
            self.state = State::Finish;
            return Ok(());
        }
        self.top().attempt = 0;
        self.top().ns_index = 0;
        self.seed_nameservers_for_current_frame()?;
        self.state = State::Dispatch;
        Ok(())
    }

    /// Populate `nameservers`/`zone` for the current frame: stub mode uses
    /// the configured nameserver list verbatim; recursive mode starts from
    /// root hints (or, for a referral descent already in progress, keeps
    /// whatever `do_iterate` already set).
    fn seed_nameservers_for_current_frame(&mut self) -> DNSResult<()> {
        if !self.config.is_stub() {
            if !self.top().nameservers.is_empty() {
                return Ok(());
            }
            let addrs = self.hints.borrow().ordered_addresses(".", &mut *self.prng.borrow_mut());
            self.top().zone = Name::root();
            self.top().nameservers = addrs;
            return Ok(());
        }

        let mut ns = self.config.nameservers.clone();
        if self.config.options.rotate && !ns.is_empty() {
            let shift = (self.permutor.step() as usize) % ns.len();
            ns.rotate_left(shift);
        }
        self.top().nameservers = ns;
        Ok(())
    }

    fn do_dispatch(&mut self) -> DNSResult<()> {
        if self.top().ns_index >= self.top().nameservers.len() {
            if self.top().attempt + 1 < self.config.options.attempts {
                self.top().attempt += 1;
                self.top().ns_index = 0;
            } else {
                self.final_error = Some(ResponseCode::ServFail);
                self.state = State::Finish;
                return Ok(());
            }
        }

        let peer = self.top().nameservers[self.top().ns_index];
        let qname = self.top().current_candidate().cloned().unwrap_or_else(|| self.top().qname.clone());
        let qtype = self.top().qtype;
        let qclass = self.qclass;
        let recurse = self.config.is_stub() && self.config.options.recurse;

        trace!("querying {} for {} type {} (attempt {})", peer, qname, qtype, self.top().attempt);
        let query = self.build_query(&qname, qtype, qclass, recurse)?;
        self.socket = Some(Socket::submit_from(query, peer, self.config.interface, self.config.options.timeout)?);
        self.state = State::WaitAnswer;
        Ok(())
    }

    fn build_query(&mut self, qname: &Name, qtype: u16, qclass: u16, recurse: bool) -> DNSResult<Packet> {
        let buf_size = if self.config.options.edns0 {
            crate::rfc1035::EDNS0_UDP_PAYLOAD_SIZE
        } else {
            crate::rfc1035::MAX_UDP_PACKET_SIZE
        };
        let mut packet = Packet::new(buf_size);
        let mut header = DNSPacketHeader::default();
        header.id = self.permutor.step() as u16;
        header.flags.packet_type = PacketType::Query;
        header.flags.recursion_desired = recurse;
        packet.set_header(&header)?;
        packet.push_question(qname, qtype, qclass)?;
        Ok(packet)
    }

    /// Returns `Ok(true)` once the transport finishes (successfully or
    /// not), `Ok(false)` if it would still block.
    fn do_wait_answer(&mut self) -> DNSResult<bool> {
        let socket = self.socket.as_mut().expect("Dispatch always creates a socket");
        match socket.check() {
            Ok(()) => {
                let answer = socket.fetch()?;
                if crate::transport::is_truncated(&answer.header()?) {
                    socket.retry_over_tcp();
                    return Ok(false);
                }
                self.top().answer = Some(answer);
                self.state = State::Iterate;
                Ok(true)
            }
            Err(e) if e.is_again() => Ok(false),
            Err(_) => {
                // this nameserver/candidate didn't pan out; try the next one.
                self.top().ns_index += 1;
                self.state = State::Dispatch;
                Ok(true)
            }
        }
    }

    fn do_iterate(&mut self) -> DNSResult<()> {
        let answer = self.top().answer.take().expect("Iterate only runs once an answer lands");
        self.remember_addresses(&answer)?;

        let header = answer.header()?;
        match header.flags.response_code {
            ResponseCode::NoError => {}
            ResponseCode::NXDomain => {
                self.top().candidate_index += 1;
                self.state = State::NextCandidate;
                return Ok(());
            }
            _ => {
                self.top().ns_index += 1;
                self.state = State::Dispatch;
                return Ok(());
            }
        }

        if header.an_count == 0 && header.ns_count > 0 && !self.config.is_stub() {
            return self.descend_referral(answer);
        }

        let qname = self.top().qname.clone();
        let qtype = self.top().qtype;
        if qtype != TYPE_CNAME {
            if let Some(target) = self.find_cname(&answer, &qname)? {
                return self.chase_cname(answer, target);
            }
        }

        self.top().answer = Some(answer);
        self.state = State::PopFrame;
        Ok(())
    }

    fn find_cname(&self, answer: &Packet, qname: &Name) -> DNSResult<Option<Name>> {
        let filter = RrFilter {
            section: Some(Section::An),
            rtype: Some(TYPE_CNAME),
            name: Some(qname.as_str().to_string()),
            ..Default::default()
        };
        for rr in RrIterator::new(answer, filter, SortOrder::Packet) {
            let rr = rr?;
            if let Rdata::Cname(target) = rr.rdata(answer)? {
                return Ok(Some(Name::try_from(target.as_str())?));
            }
        }
        Ok(None)
    }

    /// `original` is the CNAME-bearing answer the frame just received (or a
    /// synthesized stand-in from an ancestor's glue, see `do_glue`). It's
    /// stashed on the frame and merged with the chased target's answer once
    /// that sub-frame pops, so the caller sees both the CNAME RR and the
    /// final address RR in one packet (SPEC_FULL.md §8's merge scenario).
    fn chase_cname(&mut self, original: Packet, target: Name) -> DNSResult<()> {
        if self.frames.len() >= MAX_FRAME_DEPTH {
            warn!("CNAME chain exceeded frame depth {}, giving up at {}", MAX_FRAME_DEPTH, target);
            self.final_error = Some(ResponseCode::ServFail);
            self.state = State::Finish;
            return Ok(());
        }
        debug!("chasing CNAME to {}", target);
        let qtype = self.top().qtype;
        self.top().answer = Some(original);
        self.frames.push(Frame::leaf(target.clone(), qtype, vec![target], Some(FramePurpose::CnameChase)));
        self.state = State::Init;
        Ok(())
    }

    /// A referral: the queried zone's parent handed back the child zone's
    /// nameservers (`Section::Ns`) with glue addresses (`Section::Ar`) when
    /// it has them. Missing glue is resolved via `known_addrs` first, then
    /// (if still unknown) a bounded sub-resolution.
    fn descend_referral(&mut self, referral: Packet) -> DNSResult<()> {
        let mut ns_names = Vec::new();
        for rr in RrIterator::new(&referral, RrFilter { section: Some(Section::Ns), ..Default::default() }, SortOrder::Packet) {
            let rr = rr?;
            if let Rdata::Ns(name) = rr.rdata(&referral)? {
                ns_names.push(name);
            }
        }

        if ns_names.is_empty() {
            self.final_error = Some(ResponseCode::ServFail);
            self.state = State::Finish;
            return Ok(());
        }

        let mut addrs = Vec::new();
        let mut unresolved: Option<String> = None;
        for ns in &ns_names {
            if let Some(known) = self.known_addrs.get(&anchor(ns)) {
                addrs.extend(known.iter().copied());
                continue;
            }
            let glued = glue_addresses(&referral, ns)?;
            if !glued.is_empty() {
                self.known_addrs.insert(anchor(ns), glued.clone());
                addrs.extend(glued);
            } else if unresolved.is_none() {
                unresolved = Some(ns.clone());
            }
        }

        if !addrs.is_empty() {
            addrs.sort_by_key(|_| self.permutor.step()); // light shuffle among equally-trusted glue
            self.top().zone = self.top().qname.clone();
            debug!("descending into zone {} via {} nameserver(s)", self.top().zone, addrs.len());
            self.top().nameservers = addrs.into_iter().map(|ip| SocketAddr::new(ip, 53)).collect();
            self.top().ns_index = 0;
            self.top().attempt = 0;
            self.state = State::Dispatch;
            return Ok(());
        }

        let glueless = unresolved.expect("non-empty ns_names with no glue leaves one unresolved");
        if self.frames.len() >= MAX_FRAME_DEPTH {
            self.final_error = Some(ResponseCode::ServFail);
            self.state = State::Finish;
            return Ok(());
        }
        // stash the referral itself so the glue lookup's PopFrame handler
        // can replay `descend_referral` against it once the address lands.
        self.top().answer = Some(referral);
        let glue_qname = Name::try_from(glueless.as_str())?;
        self.frames.push(Frame::leaf(glue_qname.clone(), TYPE_A, vec![glue_qname], Some(FramePurpose::GlueLookup)));
        self.state = State::Init;
        Ok(())
    }

    fn remember_addresses(&mut self, packet: &Packet) -> DNSResult<()> {
        for section in [Section::An, Section::Ar] {
            let filter = RrFilter { section: Some(section), ..Default::default() };
            for rr in RrIterator::new(packet, filter, SortOrder::Packet) {
                let rr = rr?;
                let ip = match rr.rdata(packet)? {
                    Rdata::A(a) => Some(IpAddr::V4(a)),
                    Rdata::Aaaa(a) => Some(IpAddr::V6(a)),
                    _ => None,
                };
                if let Some(ip) = ip {
                    self.known_addrs.entry(anchor(&rr.name)).or_default().push(ip);
                }
            }
        }
        Ok(())
    }

    /// A frame finished with an answer in hand (`frame.answer.is_some()`):
    /// fold it into whatever triggered the sub-resolution, then pop back
    /// to the parent frame (or finish, if this was the bottom frame).
    ///
    /// The bottom (purpose-less) frame is special: per SPEC_FULL.md §4.G,
    /// `smart` mode's MX/NS/SRV follow-up runs "at top frame", so that
    /// frame isn't actually popped off the stack until its follow-up (if
    /// any) has already run — it stays `top()` while the follow-up's own
    /// sub-frame resolves, the same way a CNAME-chase or glue-lookup
    /// parent does.
    fn do_pop_frame(&mut self) -> DNSResult<()> {
        if self.frames.len() == 1 {
            if self.config.options.smart && !self.frames[0].smart_done {
                self.frames[0].smart_done = true;
                let answer = self.frames[0].answer.take().expect("Iterate only transitions here with an answer set");
                return self.maybe_smart_followup(answer);
            }
            let finished = self.frames.pop().expect("PopFrame only reached with a frame on top");
            self.final_answer = Some(finished.answer.expect("Iterate only transitions here with an answer set"));
            self.state = State::Finish;
            return Ok(());
        }

        let finished = self.frames.pop().expect("PopFrame only reached with a frame on top");
        let answer = finished.answer.expect("Iterate only transitions here with an answer set");

        match finished.purpose {
            None => unreachable!("only the bottom frame has no purpose; handled above"),
            Some(FramePurpose::GlueLookup) => {
                if let Some(addr) = first_address(&answer)? {
                    self.known_addrs.entry(anchor(finished.qname.as_str())).or_default().push(addr);
                }
                // retry the referral descent now that this glue is known.
                // the referral that triggered the glue lookup was stashed
                // on the parent frame for exactly this replay.
                let referral = self.top().answer.take().expect("referral stashed before glue lookup");
                self.state = State::Iterate;
                self.top().answer = Some(referral);
            }
            Some(FramePurpose::CnameChase) => {
                // `original` carries the CNAME RR under the parent frame's
                // owner name; `answer` is the chased target's own answer
                // (e.g. its A RR). Merging keeps both under the one packet,
                // per SPEC_FULL.md's "AN contains both the CNAME RR and the
                // A RR" chase scenario. If this pop lands back at the
                // bottom frame, the next `do_pop_frame` call runs `smart`
                // mode's follow-up before declaring the resolution done.
                let original = self.top().answer.take().expect("CNAME-bearing answer stashed before chase");
                let merged = merge(&original, &answer)?;
                self.top().answer = Some(merged);
                self.state = State::PopFrame;
            }
            Some(FramePurpose::SmartFollowup) => {
                let base = self.top().answer.take().expect("smart follow-up always has a base answer waiting");
                let merged = merge(&base, &answer)?;
                self.top().answer = Some(merged);
                self.state = State::PopFrame;
            }
        }
        Ok(())
    }

    /// `smart` mode: once a final MX/NS/SRV answer is in hand, resolve each
    /// target's address and splice it in as additional-section glue, the
    /// way a human running `dig +additional` would expect without a second
    /// round trip.
    fn maybe_smart_followup(&mut self, answer: Packet) -> DNSResult<()> {
        let qtype = self.top().qtype;
        if !matches!(qtype, TYPE_MX | TYPE_NS | TYPE_SRV) {
            self.top().answer = Some(answer);
            self.state = State::PopFrame;
            return Ok(());
        }

        let mut targets = HashSet::new();
        for rr in RrIterator::new(&answer, RrFilter { section: Some(Section::An), ..Default::default() }, SortOrder::Packet) {
            let rr = rr?;
            if let Some(t) = rr.rdata(&answer)?.target_name() {
                targets.insert(t.to_string());
            }
        }

        // SMTP fallback: an MX query that came back with zero MX records
        // resolves the queried name's own address instead, the way a mailer
        // falls back to connecting to the name directly.
        if qtype == TYPE_MX && targets.is_empty() {
            if self.frames.len() >= MAX_FRAME_DEPTH {
                self.top().answer = Some(answer);
                self.state = State::PopFrame;
                return Ok(());
            }
            let qname = self.top().qname.clone();
            self.top().answer = Some(answer);
            self.frames.push(Frame::leaf(qname.clone(), TYPE_A, vec![qname], Some(FramePurpose::SmartFollowup)));
            self.state = State::Init;
            return Ok(());
        }

        let unknown: Vec<String> = targets.into_iter().filter(|t| !self.known_addrs.contains_key(&anchor(t))).collect();
        if unknown.is_empty() || self.frames.len() >= MAX_FRAME_DEPTH {
            self.top().answer = Some(answer);
            self.state = State::PopFrame;
            return Ok(());
        }

        self.top().answer = Some(answer);
        let target = Name::try_from(unknown[0].as_str())?;
        self.frames.push(Frame::leaf(target.clone(), TYPE_A, vec![target], Some(FramePurpose::SmartFollowup)));
        self.state = State::Init;
        Ok(())
    }

    fn do_finish(&mut self) -> DNSResult<()> {
        if self.final_answer.is_none() {
            let code = self.final_error.unwrap_or(ResponseCode::ServFail);
            warn!("resolution finished without an answer, synthesizing {:?}", code);
            self.final_answer = Some(self.synthesize_error(code)?);
        }
        self.state = State::Done;
        Ok(())
    }

    fn synthesize_error(&self, code: ResponseCode) -> DNSResult<Packet> {
        let mut packet = Packet::new(512);
        let mut header = DNSPacketHeader::default();
        header.flags.packet_type = PacketType::Response;
        header.flags.response_code = code;
        packet.set_header(&header)?;
        let qname = self.frames.first().map(|f| f.qname.clone()).unwrap_or_else(Name::root);
        let qtype = self.frames.first().map(|f| f.qtype).unwrap_or(TYPE_A);
        packet.push_question(&qname, qtype, self.qclass)?;
        Ok(packet)
    }
}

fn first_address(packet: &Packet) -> DNSResult<Option<IpAddr>> {
    for section in [Section::An] {
        let filter = RrFilter { section: Some(section), ..Default::default() };
        for rr in RrIterator::new(packet, filter, SortOrder::Packet) {
            let rr = rr?;
            match rr.rdata(packet)? {
                Rdata::A(a) => return Ok(Some(IpAddr::V4(a))),
                Rdata::Aaaa(a) => return Ok(Some(IpAddr::V6(a))),
                _ => continue,
            }
        }
    }
    Ok(None)
}

fn glue_addresses(packet: &Packet, target: &str) -> DNSResult<Vec<IpAddr>> {
    let mut out = Vec::new();
    let filter = RrFilter { section: Some(Section::Ar), name: Some(anchor(target)), ..Default::default() };
    for rr in RrIterator::new(packet, filter, SortOrder::Packet) {
        let rr = rr?;
        match rr.rdata(packet)? {
            Rdata::A(a) => out.push(IpAddr::V4(a)),
            Rdata::Aaaa(a) => out.push(IpAddr::V6(a)),
            _ => {}
        }
    }
    Ok(out)
}

/// Used by `do_glue`: synthesize a local answer packet out of whatever RRs
/// in `source` already match `(qname, qtype)`, as if it had come back over
/// the wire. `None` if `source` has no such RR.
fn extract_matching_answer(source: &Packet, qname: &Name, qtype: u16, qclass: u16) -> DNSResult<Option<Packet>> {
    let filter = RrFilter {
        section: Some(Section::An),
        rtype: Some(qtype),
        name: Some(qname.as_str().to_string()),
        ..Default::default()
    };
    let mut found = Vec::new();
    for rr in RrIterator::new(source, filter, SortOrder::Packet) {
        let rr = rr?;
        let raw = source.slice(rr.rdata_offset, rr.rdata_len)?.to_vec();
        found.push((rr.name.clone(), rr.rclass, rr.ttl, raw));
    }
    if found.is_empty() {
        return Ok(None);
    }

    let mut packet = Packet::new(65535);
    let mut header = DNSPacketHeader::default();
    header.flags.packet_type = PacketType::Response;
    packet.set_header(&header)?;
    packet.push_question(qname, qtype, qclass)?;
    for (name, rclass, ttl, raw) in found {
        packet.push_opaque_rr(Section::An, &Name::try_from(name.as_str())?, qtype, rclass, ttl, &raw)?;
    }
    Ok(Some(packet))
}

/// Used by `do_glue`: if `source` carries a CNAME RR at `qname`, synthesize
/// a one-RR local answer for it (so `chase_cname` can stash and later merge
/// it exactly like a freshly-received CNAME answer) plus the chase target.
fn extract_local_cname(source: &Packet, qname: &Name, qtype: u16, qclass: u16) -> DNSResult<Option<(Packet, Name)>> {
    let filter = RrFilter {
        section: Some(Section::An),
        rtype: Some(TYPE_CNAME),
        name: Some(qname.as_str().to_string()),
        ..Default::default()
    };
    for rr in RrIterator::new(source, filter, SortOrder::Packet) {
        let rr = rr?;
        if let Rdata::Cname(target) = rr.rdata(source)? {
            let raw = source.slice(rr.rdata_offset, rr.rdata_len)?.to_vec();
            let mut packet = Packet::new(65535);
            let mut header = DNSPacketHeader::default();
            header.flags.packet_type = PacketType::Response;
            packet.set_header(&header)?;
            packet.push_question(qname, qtype, qclass)?;
            packet.push_opaque_rr(Section::An, &Name::try_from(rr.name.as_str())?, TYPE_CNAME, rr.rclass, rr.ttl, &raw)?;
            let target_name = Name::try_from(target.as_str())?;
            return Ok(Some((packet, target_name)));
        }
    }
    Ok(None)
}

/// Idempotent merge: every RR from `base` then every RR from `extra`,
/// deduplicated by `(name, type, class, rdata bytes)`, so `merge(a, a)` is
/// just `a` again.
fn merge(base: &Packet, extra: &Packet) -> DNSResult<Packet> {
    let header_a = base.header()?;
    let mut header = header_a;
    header.an_count = 0;
    header.ns_count = 0;
    header.ar_count = 0;
    header.qd_count = 0;

    let mut out = Packet::new(65535);
    out.set_header(&header)?;

    for rr in RrIterator::new(base, RrFilter { section: Some(Section::Qd), ..Default::default() }, SortOrder::Packet) {
        let rr = rr?;
        out.push_question(&Name::try_from(rr.name.as_str())?, rr.rtype, rr.rclass)?;
    }

    let mut seen: HashSet<(String, u16, u16, Vec<u8>)> = HashSet::new();
    for packet in [base, extra] {
        for section in [Section::An, Section::Ns, Section::Ar] {
            let filter = RrFilter { section: Some(section), ..Default::default() };
            for rr in RrIterator::new(packet, filter, SortOrder::Packet) {
                let rr = rr?;
                let raw = packet.slice(rr.rdata_offset, rr.rdata_len)?.to_vec();
                let key = (rr.name.to_lowercase(), rr.rtype, rr.rclass, raw.clone());
                if !seen.insert(key) {
                    continue;
                }
                out.push_opaque_rr(section, &Name::try_from(rr.name.as_str())?, rr.rtype, rr.rclass, rr.ttl, &raw)?;
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hosts::HostsEntry;
    use crate::prng::OsPrng;
    use std::net::Ipv4Addr;

    fn new_resolver(config: ResolverConfig) -> Resolver {
        let hosts = Rc::new(RefCell::new(HostsTable::new()));
        let hints = Rc::new(RefCell::new(HintsTable::new()));
        let prng: Rc<RefCell<dyn Prng>> = Rc::new(RefCell::new(OsPrng));
        Resolver::new(config, hosts, hints, prng)
    }

    #[test]
    fn hosts_table_short_circuits_before_any_network_query() {
        let mut config = ResolverConfig::default();
        config.lookup = vec![LookupSource::File, LookupSource::Bind];
        let mut resolver = new_resolver(config);
        resolver.hosts.borrow_mut().push(HostsEntry::new(
            "localhost",
            IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            false,
        ));

        resolver.resolve("localhost.", TYPE_A, CLASS_IN).unwrap();
        resolver.check().unwrap();
        assert!(resolver.is_done());
        let answer = resolver.answer().unwrap();
        assert_eq!(answer.header().unwrap().an_count, 1);
    }

    #[test]
    fn search_list_tries_suffixes_before_bare_name_under_ndots() {
        let mut config = ResolverConfig::default();
        config.search = vec![Name::try_from("example.com.").unwrap()];
        config.options.ndots = 2;
        let resolver = new_resolver(config);
        let candidates = resolver.build_candidates("host", false).unwrap();
        assert_eq!(candidates[0].as_str(), "host.example.com.");
        assert_eq!(candidates[1].as_str(), "host.");
    }

    #[test]
    fn absolute_name_skips_search_list() {
        let mut config = ResolverConfig::default();
        config.search = vec![Name::try_from("example.com.").unwrap()];
        let resolver = new_resolver(config);
        let candidates = resolver.build_candidates("host.", true).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].as_str(), "host.");
    }

    #[test]
    fn edns0_widens_the_query_buffer() {
        let mut config = ResolverConfig::default();
        config.options.edns0 = true;
        let mut resolver = new_resolver(config);
        let qname = Name::try_from("example.com.").unwrap();
        let query = resolver.build_query(&qname, TYPE_A, CLASS_IN, true).unwrap();
        assert_eq!(query.max_size(), crate::rfc1035::EDNS0_UDP_PAYLOAD_SIZE);
    }

    #[test]
    fn without_edns0_the_query_buffer_stays_at_the_plain_limit() {
        let config = ResolverConfig::default();
        let mut resolver = new_resolver(config);
        let qname = Name::try_from("example.com.").unwrap();
        let query = resolver.build_query(&qname, TYPE_A, CLASS_IN, true).unwrap();
        assert_eq!(query.max_size(), crate::rfc1035::MAX_UDP_PACKET_SIZE);
    }

    #[test]
    fn merge_drops_exact_duplicate_records() {
        let mut a = Packet::new(512);
        a.set_header(&DNSPacketHeader::default()).unwrap();
        let owner = Name::try_from("example.com").unwrap();
        a.push_question(&owner, TYPE_A, CLASS_IN).unwrap();
        let rdata = Rdata::A(Ipv4Addr::new(192, 0, 2, 1));
        a.push_rr_with(Section::An, &owner, TYPE_A, CLASS_IN, 60, |p| rdata.push(p)).unwrap();

        let merged = merge(&a, &a).unwrap();
        assert_eq!(merged.header().unwrap().an_count, 1);
    }

    #[test]
    fn cname_chase_keeps_both_the_cname_and_the_target_rr() {
        let config = ResolverConfig::default();
        let mut resolver = new_resolver(config);
        resolver.resolve("www.", TYPE_A, CLASS_IN).unwrap();

        let owner = Name::try_from("www.").unwrap();
        let target = Name::try_from("svc.").unwrap();
        let mut original = Packet::new(512);
        original.set_header(&DNSPacketHeader::default()).unwrap();
        original.push_question(&owner, TYPE_A, CLASS_IN).unwrap();
        let cname = Rdata::Cname(target.as_str().to_string());
        original.push_rr_with(Section::An, &owner, TYPE_CNAME, CLASS_IN, 60, |p| cname.push(p)).unwrap();

        resolver.chase_cname(original, target.clone()).unwrap();
        assert_eq!(resolver.frames.len(), 2);

        let mut target_answer = Packet::new(512);
        target_answer.set_header(&DNSPacketHeader::default()).unwrap();
        target_answer.push_question(&target, TYPE_A, CLASS_IN).unwrap();
        let a = Rdata::A(Ipv4Addr::new(10, 0, 0, 1));
        target_answer.push_rr_with(Section::An, &target, TYPE_A, CLASS_IN, 60, |p| a.push(p)).unwrap();

        resolver.frames.last_mut().unwrap().answer = Some(target_answer);
        resolver.state = State::PopFrame;
        resolver.check().unwrap();

        assert!(resolver.is_done());
        let answer = resolver.answer().unwrap();
        assert_eq!(answer.header().unwrap().an_count, 2);
    }

    #[test]
    fn glue_state_reuses_an_ancestor_answer_instead_of_querying_again() {
        let config = ResolverConfig::default();
        let mut resolver = new_resolver(config);
        resolver.resolve("a.", TYPE_A, CLASS_IN).unwrap();

        let known = Name::try_from("b.").unwrap();
        let mut ancestor = Packet::new(512);
        ancestor.set_header(&DNSPacketHeader::default()).unwrap();
        ancestor.push_question(&known, TYPE_A, CLASS_IN).unwrap();
        let a = Rdata::A(Ipv4Addr::new(192, 0, 2, 9));
        ancestor.push_rr_with(Section::An, &known, TYPE_A, CLASS_IN, 60, |p| a.push(p)).unwrap();
        resolver.frames[0].answer = Some(ancestor);

        resolver
            .frames
            .push(Frame::leaf(known.clone(), TYPE_A, vec![known], Some(FramePurpose::SmartFollowup)));
        resolver.state = State::Init;

        // if `do_glue` didn't short-circuit this, `check()` would fall through
        // to `Dispatch` and either block on a real socket or error out.
        resolver.check().unwrap();
        assert!(resolver.is_done());
        let answer = resolver.answer().unwrap();
        assert_eq!(answer.header().unwrap().an_count, 1);
    }

    #[test]
    fn smart_followup_runs_for_a_direct_answer_with_no_cname_involved() {
        let mut config = ResolverConfig::default();
        config.options.smart = true;
        let mut resolver = new_resolver(config);
        resolver.resolve("example.com.", TYPE_NS, CLASS_IN).unwrap();

        let owner = Name::try_from("example.com.").unwrap();
        let ns_host = Name::try_from("ns1.example.com.").unwrap();
        let mut answer = Packet::new(512);
        answer.set_header(&DNSPacketHeader::default()).unwrap();
        answer.push_question(&owner, TYPE_NS, CLASS_IN).unwrap();
        let ns = Rdata::Ns(ns_host.as_str().to_string());
        answer.push_rr_with(Section::An, &owner, TYPE_NS, CLASS_IN, 60, |p| ns.push(p)).unwrap();

        resolver.frames[0].answer = Some(answer);
        resolver.do_pop_frame().unwrap();

        assert!(resolver.frames[0].smart_done);
        assert_eq!(resolver.frames.len(), 2);
        let pushed = resolver.frames.last().unwrap();
        assert_eq!(pushed.qname.as_str(), "ns1.example.com.");
        assert_eq!(pushed.qtype, TYPE_A);
        assert_eq!(pushed.purpose, Some(FramePurpose::SmartFollowup));
        assert_eq!(resolver.state, State::Init);
    }

    #[test]
    fn mx_query_with_no_mx_records_falls_back_to_an_a_lookup_on_the_qname() {
        let mut config = ResolverConfig::default();
        config.options.smart = true;
        let mut resolver = new_resolver(config);
        resolver.resolve("example.com.", TYPE_MX, CLASS_IN).unwrap();

        let owner = Name::try_from("example.com.").unwrap();
        let mut answer = Packet::new(512);
        answer.set_header(&DNSPacketHeader::default()).unwrap();
        answer.push_question(&owner, TYPE_MX, CLASS_IN).unwrap();

        resolver.maybe_smart_followup(answer).unwrap();

        assert_eq!(resolver.frames.len(), 2);
        let pushed = resolver.frames.last().unwrap();
        assert_eq!(pushed.qname.as_str(), "example.com.");
        assert_eq!(pushed.qtype, TYPE_A);
        assert_eq!(pushed.purpose, Some(FramePurpose::SmartFollowup));
        assert_eq!(resolver.state, State::Init);
    }
}

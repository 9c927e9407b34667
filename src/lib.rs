//! A single-threaded, non-blocking stub/recursive DNS resolver.
//!
//! Every long-running piece of this crate — `transport::Socket` and
//! `resolver::Resolver` — is driven by a `check()` method that never
//! blocks: it either makes progress, finishes, or returns
//! `error::DNSError::Again` for the caller to retry once `pollin()`/
//! `pollout()` says the underlying socket is ready. There is no internal
//! thread, no async runtime, and no global state; everything here is
//! `!Send` by design (see `hosts`/`hints`, shared via `Rc<RefCell<_>>`
//! rather than an atomically-refcounted type).
pub mod error;
pub mod hints;
pub mod hosts;
pub mod macros;
pub mod name;
pub mod network_order;
pub mod packet;
pub mod prng;
pub mod resconf;
pub mod resolver;
pub mod rfc1035;
pub mod rr;
pub mod rr_iterator;
pub mod transport;
pub mod util;

pub use error::{DNSError, DNSResult};
pub use name::Name;
pub use packet::Packet;
pub use resconf::{LookupSource, Options, ResolverConfig};
pub use resolver::Resolver;

//! A DNS resource query
use std::cell::RefCell;
use std::rc::Rc;
use std::thread;
use std::time::Duration;

use log::debug;

// our DNS library
use dnslib::error::DNSResult;
use dnslib::hints::HintsTable;
use dnslib::hosts::HostsTable;
use dnslib::prng::{OsPrng, Prng};
use dnslib::resconf::{LookupSource, Options, ResolverConfig};
use dnslib::rr::CLASS_IN;
use dnslib::Resolver;

mod args;
use args::CliOptions;

mod display;
use display::display_answer;

fn main() -> DNSResult<()> {
    env_logger::init();

    let options = CliOptions::options()?;
    debug!("options: {:?}", &options);

    let mut resolver_options = Options::default();
    resolver_options.recurse = options.recurse;
    resolver_options.smart = options.smart;

    // a single explicit nameserver on the command line means stub mode: talk
    // to it directly rather than walk the delegation chain from root hints.
    let config = ResolverConfig::from_parts(
        vec![options.ns],
        Vec::new(),
        vec![LookupSource::Bind],
        resolver_options,
        None,
    );

    let hosts = Rc::new(RefCell::new(HostsTable::new()));
    let hints = Rc::new(RefCell::new(HintsTable::new()));
    let prng: Rc<RefCell<dyn Prng>> = Rc::new(RefCell::new(OsPrng));

    let mut resolver = Resolver::new(config, hosts, hints, prng);
    resolver.resolve(&options.domain, options.qtype as u16, CLASS_IN)?;

    // check() never blocks; between Again results there is nothing this
    // binary polls on but the single fd the resolver currently owns, so a
    // short sleep stands in for a real event loop's poll/select wait.
    loop {
        match resolver.check() {
            Ok(()) => break,
            Err(e) if e.is_again() => {
                thread::sleep(Duration::from_millis(5));
                continue;
            }
            Err(e) => return Err(e),
        }
    }

    let answer = resolver.answer()?;
    if options.debug {
        eprintln!("{:#?}", answer);
    }
    display_answer(&answer)?;

    Ok(())
}

//! Manage command line arguments here.
use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;

use clap::{App, Arg};

use dnslib::error::{DNSError, DNSResult};
use dnslib::rfc1035::QType;

/// This structure holds the command line arguments.
#[derive(Debug)]
pub struct CliOptions {
    pub qtype: QType,
    pub ns: SocketAddr,
    pub domain: String,
    pub recurse: bool,
    pub smart: bool,
    pub debug: bool,
}

impl CliOptions {
    pub fn options() -> DNSResult<Self> {
        let matches = App::new("DNS query tool")
            .version("0.1")
            .author("Alain Viguier dandyvica@gmail.com")
            .about(
                r#"A simple DNS query client

            Project home page: https://github.com/dandyvica/dnsquery

            "#,
            )
            .arg(
                Arg::new("qtype")
                    .short('q')
                    .long("qtype")
                    .required(true)
                    .long_help("QType value (A, AAAA, NS, CNAME, SOA, PTR, MX, TXT, SRV...)")
                    .takes_value(true),
            )
            .arg(
                Arg::new("ns")
                    .short('n')
                    .long("ns")
                    .required(true)
                    .long_help("DNS server to address, optionally with a :port suffix (default 53)")
                    .takes_value(true),
            )
            .arg(
                Arg::new("domain")
                    .short('d')
                    .long("domain")
                    .required(true)
                    .long_help("Domain to query")
                    .takes_value(true),
            )
            .arg(
                Arg::new("no-recurse")
                    .short('r')
                    .long("no-recurse")
                    .required(false)
                    .long_help("Send the query with RD=0 instead of the default RD=1")
                    .takes_value(false),
            )
            .arg(
                Arg::new("no-smart")
                    .short('s')
                    .long("no-smart")
                    .required(false)
                    .long_help("Don't resolve MX/NS/SRV targets' addresses as additional glue")
                    .takes_value(false),
            )
            .arg(
                Arg::new("debug")
                    .short('g')
                    .long("debug")
                    .required(false)
                    .long_help("Debug mode")
                    .takes_value(false),
            )
            .get_matches();

        let ns_arg = matches.value_of("ns").unwrap();
        let ns = resolve_ns(ns_arg)?;

        let options = CliOptions {
            qtype: QType::from_str(&matches.value_of("qtype").unwrap().to_uppercase())
                .map_err(DNSError::new)?,
            ns,
            domain: String::from(matches.value_of("domain").unwrap()),
            recurse: !matches.is_present("no-recurse"),
            smart: !matches.is_present("no-smart"),
            debug: matches.is_present("debug"),
        };

        Ok(options)
    }
}

/// Accept either `host` (port defaults to 53) or `host:port`.
fn resolve_ns(arg: &str) -> DNSResult<SocketAddr> {
    if let Ok(addr) = SocketAddr::from_str(arg) {
        return Ok(addr);
    }
    let with_port = format!("{}:53", arg);
    with_port
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| DNSError::new(&format!("unable to resolve nameserver address '{}'", arg)))
}

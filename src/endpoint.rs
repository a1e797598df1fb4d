//! Resolver endpoints.

use std::fmt::{self, Display};
use std::time::Duration;

use url::Url;

/// Transport used to reach a resolver endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Transport {
    /// Plain DNS over UDP.
    Udp,
    /// Plain DNS over TCP.
    Tcp,
    /// DNS over TLS (RFC 7858).
    Dot,
    /// DNS over HTTPS (RFC 8484).
    Doh,
}

impl Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Udp => "udp",
            Self::Tcp => "tcp",
            Self::Dot => "dot",
            Self::Doh => "doh",
        })
    }
}

/// One candidate resolver reachable via a specific transport, host (or URL
/// for DNS over HTTPS), and port.
///
/// An `Endpoint` is an immutable descriptor; the per-endpoint options are set
/// with the consuming builder methods and never change afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    transport: Transport,
    host: String,
    port: u16,
    timeout: Option<Duration>,
    edns_buffer_size: Option<u16>,
    dnssec_ok: bool,
    allow_tcp_fallback: bool,
}

impl Endpoint {
    fn new(transport: Transport, host: impl ToString, port: u16) -> Self {
        Self {
            transport,
            host: host.to_string(),
            port,
            timeout: None,
            edns_buffer_size: None,
            dnssec_ok: false,
            allow_tcp_fallback: transport == Transport::Udp,
        }
    }

    /// Creates a plain-UDP endpoint. TCP fallback for truncated replies is
    /// allowed by default.
    pub fn udp(host: impl ToString, port: u16) -> Self {
        Self::new(Transport::Udp, host, port)
    }

    /// Creates a plain-TCP endpoint.
    pub fn tcp(host: impl ToString, port: u16) -> Self {
        Self::new(Transport::Tcp, host, port)
    }

    /// Creates a DNS-over-TLS endpoint.
    pub fn dot(host: impl ToString, port: u16) -> Self {
        Self::new(Transport::Dot, host, port)
    }

    /// Creates a DNS-over-HTTPS endpoint from a resolver URL.
    pub fn doh(url: &Url) -> Self {
        let port = url.port().unwrap_or(443);
        Self::new(Transport::Doh, url, port)
    }

    /// Sets a per-endpoint query timeout, used instead of the dispatcher
    /// default when the dispatcher is configured to respect it.
    pub fn timeout(self, timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..self
        }
    }

    /// Sets the advertised EDNS UDP buffer size.
    pub fn edns_buffer_size(self, size: u16) -> Self {
        Self {
            edns_buffer_size: Some(size),
            ..self
        }
    }

    /// Requests DNSSEC records (sets the DO bit) on queries to this endpoint.
    pub fn dnssec_ok(self, dnssec_ok: bool) -> Self {
        Self { dnssec_ok, ..self }
    }

    /// Allows or forbids falling back to TCP when a UDP reply is truncated.
    pub fn allow_tcp_fallback(self, allow: bool) -> Self {
        Self {
            allow_tcp_fallback: allow,
            ..self
        }
    }

    /// The endpoint's transport.
    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// The endpoint's host name, address, or (for DoH) full URL.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The endpoint's port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The per-endpoint timeout, if one was set.
    pub fn query_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// The advertised EDNS UDP buffer size, if one was set.
    pub fn edns_buffer(&self) -> Option<u16> {
        self.edns_buffer_size
    }

    /// Whether queries to this endpoint request DNSSEC records.
    pub fn wants_dnssec(&self) -> bool {
        self.dnssec_ok
    }

    /// Whether truncated UDP replies may be retried over TCP.
    pub fn tcp_fallback_allowed(&self) -> bool {
        self.allow_tcp_fallback
    }

    /// The identity of this endpoint for metrics and cache purposes.
    ///
    /// Two endpoints with the same transport, host, and port share one
    /// identity even if their per-endpoint options differ.
    pub fn key(&self) -> EndpointKey {
        EndpointKey {
            transport: self.transport,
            host: self.host.clone(),
            port: self.port,
        }
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.transport, self.host, self.port)
    }
}

/// Identity of an endpoint: transport, host (or URL), and port.
///
/// Used as the key for endpoint metrics and the fastest-endpoint cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointKey {
    transport: Transport,
    host: String,
    port: u16,
}

impl Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.transport, self.host, self.port)
    }
}

/// Order-independent identity of an endpoint *set*, used as the
/// fastest-endpoint cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SetFingerprint(String);

/// Computes the fingerprint of an endpoint set.
///
/// The fingerprint depends only on the identities of the member endpoints,
/// not on their order in the slice.
pub fn fingerprint(endpoints: &[Endpoint]) -> SetFingerprint {
    let mut keys: Vec<String> = endpoints.iter().map(|e| e.key().to_string()).collect();
    keys.sort_unstable();
    keys.dedup();
    SetFingerprint(keys.join("|"))
}

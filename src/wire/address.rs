//! Network address records (`net_addr`).
//!
//! Three fixed widths appear on the wire:
//!
//! ```text
//! 30 bytes  u32 time | u64 services | 16-byte host | u16 port (BE)   addr
//! 26 bytes             u64 services | 16-byte host | u16 port (BE)   version
//! 18 bytes                            16-byte host | u16 port (BE)
//! ```
//!
//! Hosts are always 16 bytes; IPv4 peers use the IPv4-mapped IPv6 prefix.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use chrono::{DateTime, Utc};

use crate::error::DecodeError;
use crate::wire::cursor::Cursor;
use crate::wire::types::{unix_time, Services};
use crate::wire::writer::PayloadWriter;

/// `::ffff:0:0/96`
pub const IPV4_MAPPED_PREFIX: [u8; 12] = [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xff, 0xff];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressForm {
    /// Timestamp, services, host and port (`addr` entries).
    Timestamped,
    /// Services, host and port (`version` fields).
    WithServices,
    /// Host and port only.
    HostPort,
}

impl AddressForm {
    pub const fn width(self) -> usize {
        match self {
            AddressForm::Timestamped => 30,
            AddressForm::WithServices => 26,
            AddressForm::HostPort => 18,
        }
    }

    pub fn from_width(width: usize) -> Option<Self> {
        match width {
            30 => Some(AddressForm::Timestamped),
            26 => Some(AddressForm::WithServices),
            18 => Some(AddressForm::HostPort),
            _ => None,
        }
    }
}

/// A decoded peer endpoint; also what the pool consumes as a dial candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointRecord {
    pub host: String,
    pub port: u16,
    pub services: Option<Services>,
    pub timestamp: Option<DateTime<Utc>>,
    pub raw_host: [u8; 16],
}

impl EndpointRecord {
    /// Decode one record; the slice length selects the form.
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let form = AddressForm::from_width(buf.len()).ok_or(DecodeError::AddressWidth(buf.len()))?;
        let mut c = Cursor::new(buf);
        let record = Self::read(&mut c, form)?;
        c.finish()?;
        Ok(record)
    }

    /// Read one record of the given form from a running cursor.
    pub fn read(c: &mut Cursor<'_>, form: AddressForm) -> Result<Self, DecodeError> {
        let timestamp = match form {
            AddressForm::Timestamped => Some(unix_time(c.read_u32("addr time")?)),
            _ => None,
        };
        let services = match form {
            AddressForm::HostPort => None,
            _ => Some(Services(c.read_u64("addr services")?)),
        };
        let raw_host: [u8; 16] = c.array("addr host")?;
        let port = u16::from_be_bytes(c.array("addr port")?);

        Ok(Self {
            host: format_host(&raw_host),
            port,
            services,
            timestamp,
            raw_host,
        })
    }

    pub fn write(&self, w: &mut PayloadWriter, form: AddressForm) {
        if form == AddressForm::Timestamped {
            let secs = self.timestamp.map(|t| t.timestamp() as u32).unwrap_or(0);
            w.put_u32(secs);
        }
        if form != AddressForm::HostPort {
            w.put_u64(self.services.unwrap_or_default().0);
        }
        w.put(&self.raw_host).put(&self.port.to_be_bytes());
    }

    pub fn encode(&self, form: AddressForm) -> Vec<u8> {
        let mut w = PayloadWriter::with_capacity(form.width());
        self.write(&mut w, form);
        w.into_vec()
    }

    pub fn from_socket_addr(addr: SocketAddr, services: Services) -> Self {
        let raw_host = host_bytes(addr.ip());
        Self {
            host: format_host(&raw_host),
            port: addr.port(),
            services: Some(services),
            timestamp: None,
            raw_host,
        }
    }

    /// An all-zero host, as sent when a node does not know its own address.
    pub fn unknown(services: Services) -> Self {
        Self {
            host: format_host(&[0u8; 16]),
            port: 0,
            services: Some(services),
            timestamp: None,
            raw_host: [0u8; 16],
        }
    }

    pub fn ip(&self) -> IpAddr {
        ip_from_bytes(&self.raw_host)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip(), self.port)
    }

    /// False for addresses a remote could not have meant as ours or that we
    /// cannot dial: unspecified and loopback hosts, port zero.
    pub fn is_routable(&self) -> bool {
        let ip = self.ip();
        !ip.is_unspecified() && !ip.is_loopback()
    }
}

impl fmt::Display for EndpointRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.raw_host[..12] == IPV4_MAPPED_PREFIX {
            write!(f, "{}:{}", self.host, self.port)
        } else {
            write!(f, "[{}]:{}", self.host, self.port)
        }
    }
}

/// Dotted quad for IPv4-mapped hosts, otherwise eight colon-separated hex
/// groups with leading zero digits removed. Zero runs are not collapsed.
pub fn format_host(raw: &[u8; 16]) -> String {
    if raw[..12] == IPV4_MAPPED_PREFIX {
        return format!("{}.{}.{}.{}", raw[12], raw[13], raw[14], raw[15]);
    }
    raw.chunks_exact(2)
        .map(|pair| format!("{:x}", u16::from_be_bytes([pair[0], pair[1]])))
        .collect::<Vec<_>>()
        .join(":")
}

/// Inverse of [`format_host`]; accepts anything `IpAddr` parses.
pub fn parse_host(host: &str) -> Option<[u8; 16]> {
    host.parse::<IpAddr>().ok().map(host_bytes)
}

pub fn host_bytes(ip: IpAddr) -> [u8; 16] {
    match ip {
        IpAddr::V4(v4) => v4.to_ipv6_mapped().octets(),
        IpAddr::V6(v6) => v6.octets(),
    }
}

fn ip_from_bytes(raw: &[u8; 16]) -> IpAddr {
    if raw[..12] == IPV4_MAPPED_PREFIX {
        IpAddr::V4(Ipv4Addr::new(raw[12], raw[13], raw[14], raw[15]))
    } else {
        IpAddr::V6(Ipv6Addr::from(*raw))
    }
}

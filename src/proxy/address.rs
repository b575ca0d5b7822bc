//! Destination address record.
//!
//! The same layout as the tail of a SOCKS5 request, and the first thing
//! sent through a freshly opened tunnel:
//!
//! ```text
//! +------+----------+----------+
//! | ATYP | DST.ADDR | DST.PORT |
//! +------+----------+----------+
//! |  1   | Variable |    2     |
//! +------+----------+----------+
//! ```
//!
//! ATYP 1 is four IPv4 bytes, 4 is sixteen IPv6 bytes, 3 is a length byte
//! followed by that many bytes of domain name. The port is big-endian.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};

/// IPv4 address type tag.
pub const ATYP_IPV4: u8 = 0x01;
/// Domain name address type tag.
pub const ATYP_DOMAIN: u8 = 0x03;
/// IPv6 address type tag.
pub const ATYP_IPV6: u8 = 0x04;

/// Longest possible record: tag + length + 255 name bytes + port.
pub const MAX_ADDR_LEN: usize = 1 + 1 + 255 + 2;

/// A raw destination address record.
#[derive(Clone, PartialEq, Eq)]
pub struct Address {
    raw: Vec<u8>,
}

/// Total record length for a tag, given the domain length byte when relevant.
fn record_len(atyp: u8, domain_len: u8) -> Result<usize> {
    match atyp {
        ATYP_IPV4 => Ok(1 + 4 + 2),
        ATYP_IPV6 => Ok(1 + 16 + 2),
        ATYP_DOMAIN => Ok(1 + 1 + domain_len as usize + 2),
        other => Err(Error::UnsupportedAddressType(other)),
    }
}

impl Address {
    /// Validate and copy a complete record.
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        let atyp = *raw
            .first()
            .ok_or_else(|| Error::malformed("empty address record"))?;
        let domain_len = if atyp == ATYP_DOMAIN {
            *raw
                .get(1)
                .ok_or_else(|| Error::malformed("domain address missing length"))?
        } else {
            0
        };
        let expected = record_len(atyp, domain_len)?;
        if raw.len() != expected {
            return Err(Error::malformed(format!(
                "address record is {} bytes, expected {}",
                raw.len(),
                expected
            )));
        }
        Ok(Self { raw: raw.to_vec() })
    }

    /// Read one record from the front of a stream.
    ///
    /// Reads the tag, then (for domains) the length byte, then exactly the
    /// rest of the record. Nothing past the record is consumed.
    pub async fn read_from<R>(reader: &mut R) -> Result<Self>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = [0u8; MAX_ADDR_LEN];
        reader.read_exact(&mut buf[..1]).await?;

        let atyp = buf[0];
        let start = if atyp == ATYP_DOMAIN {
            reader.read_exact(&mut buf[1..2]).await?;
            2
        } else {
            1
        };
        let end = record_len(atyp, buf[1])?;
        reader.read_exact(&mut buf[start..end]).await?;

        Ok(Self {
            raw: buf[..end].to_vec(),
        })
    }

    /// Build a record for an IPv4 destination.
    pub fn ipv4(ip: Ipv4Addr, port: u16) -> Self {
        let mut raw = Vec::with_capacity(7);
        raw.push(ATYP_IPV4);
        raw.extend_from_slice(&ip.octets());
        raw.extend_from_slice(&port.to_be_bytes());
        Self { raw }
    }

    /// Build a record for an IPv6 destination.
    pub fn ipv6(ip: Ipv6Addr, port: u16) -> Self {
        let mut raw = Vec::with_capacity(19);
        raw.push(ATYP_IPV6);
        raw.extend_from_slice(&ip.octets());
        raw.extend_from_slice(&port.to_be_bytes());
        Self { raw }
    }

    /// Build a record for a domain destination.
    pub fn domain(name: &str, port: u16) -> Result<Self> {
        let len = u8::try_from(name.len())
            .map_err(|_| Error::malformed(format!("domain too long: {} bytes", name.len())))?;
        let mut raw = Vec::with_capacity(name.len() + 4);
        raw.push(ATYP_DOMAIN);
        raw.push(len);
        raw.extend_from_slice(name.as_bytes());
        raw.extend_from_slice(&port.to_be_bytes());
        Ok(Self { raw })
    }

    /// The raw record, as sent on the wire.
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Address type tag.
    pub fn atyp(&self) -> u8 {
        self.raw[0]
    }

    /// Host part: dotted IPv4, canonical IPv6, or the literal domain name.
    pub fn host(&self) -> String {
        let body = &self.raw[..self.raw.len() - 2];
        match self.atyp() {
            ATYP_IPV4 => {
                let octets: [u8; 4] = body[1..5].try_into().unwrap_or([0; 4]);
                Ipv4Addr::from(octets).to_string()
            }
            ATYP_IPV6 => {
                let octets: [u8; 16] = body[1..17].try_into().unwrap_or([0; 16]);
                Ipv6Addr::from(octets).to_string()
            }
            _ => String::from_utf8_lossy(&body[2..]).into_owned(),
        }
    }

    /// Destination port.
    pub fn port(&self) -> u16 {
        let n = self.raw.len();
        u16::from_be_bytes([self.raw[n - 2], self.raw[n - 1]])
    }
}

impl fmt::Display for Address {
    /// `host:port`, with IPv6 hosts in brackets so the result can be dialed.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.atyp() == ATYP_IPV6 {
            write!(f, "[{}]:{}", self.host(), self.port())
        } else {
            write!(f, "{}:{}", self.host(), self.port())
        }
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Address").field(&self.to_string()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ipv4_addr() {
        let payload = [0x01, 93, 184, 216, 34, 0x01, 0xBB]; // 93.184.216.34:443
        let addr = Address::from_bytes(&payload).unwrap();
        assert_eq!(addr.host(), "93.184.216.34");
        assert_eq!(addr.port(), 443);
        assert_eq!(addr.to_string(), "93.184.216.34:443");
        assert_eq!(addr, Address::ipv4(Ipv4Addr::new(93, 184, 216, 34), 443));
    }

    #[test]
    fn test_parse_domain_addr() {
        let mut payload = vec![0x03, 11]; // domain type, length 11
        payload.extend_from_slice(b"example.com");
        payload.extend_from_slice(&443u16.to_be_bytes());
        let addr = Address::from_bytes(&payload).unwrap();
        assert_eq!(addr.host(), "example.com");
        assert_eq!(addr.port(), 443);
        assert_eq!(addr.as_bytes(), &payload[..]);
    }

    #[test]
    fn test_ipv6_display_is_bracketed() {
        let addr = Address::ipv6(Ipv6Addr::LOCALHOST, 8080);
        assert_eq!(addr.host(), "::1");
        assert_eq!(addr.to_string(), "[::1]:8080");
        assert_eq!(addr.as_bytes().len(), 19);
    }

    #[test]
    fn test_from_bytes_rejects_bad_records() {
        assert!(matches!(
            Address::from_bytes(&[0x02, 1, 2, 3, 4, 0, 80]),
            Err(Error::UnsupportedAddressType(0x02))
        ));
        assert!(matches!(
            Address::from_bytes(&[0x01, 127, 0, 0, 1, 0]),
            Err(Error::MalformedHeader(_))
        ));
        assert!(matches!(Address::from_bytes(&[]), Err(Error::MalformedHeader(_))));
        assert!(matches!(
            Address::from_bytes(&[0x03, 3, b'a', b'b', 0, 80]),
            Err(Error::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_domain_too_long() {
        let name = "a".repeat(256);
        assert!(Address::domain(&name, 80).is_err());
        assert!(Address::domain(&name[..255], 80).is_ok());
    }

    #[tokio::test]
    async fn test_read_from_stops_at_record_end() {
        let mut wire = Address::domain("example.org", 8443).unwrap().as_bytes().to_vec();
        wire.extend_from_slice(b"GET /");
        let mut reader = &wire[..];

        let addr = Address::read_from(&mut reader).await.unwrap();
        assert_eq!(addr.to_string(), "example.org:8443");
        assert_eq!(reader, b"GET /");
    }

    #[tokio::test]
    async fn test_read_from_unknown_type() {
        let mut reader: &[u8] = &[0x05, 0, 0, 0];
        let err = Address::read_from(&mut reader).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedAddressType(0x05)));
    }

    #[tokio::test]
    async fn test_read_from_truncated() {
        let mut reader: &[u8] = &[0x04, 0, 0, 0, 0];
        let err = Address::read_from(&mut reader).await.unwrap_err();
        assert!(err.is_transport());
    }
}

//! Client-facing SOCKS5 front end (RFC 1928).
//!
//! Only the "no authentication" method and the CONNECT command are
//! supported. The parsed destination is returned as a raw [`Address`]
//! record, ready to be forwarded through the tunnel unchanged.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::proxy::address::{Address, ATYP_DOMAIN, ATYP_IPV4, ATYP_IPV6};

/// SOCKS protocol version.
pub const SOCKS_VERSION: u8 = 0x05;

/// CONNECT command.
pub const CMD_CONNECT: u8 = 0x01;

/// "No authentication required" method.
pub const METHOD_NO_AUTH: u8 = 0x00;

/// Success reply. BND.ADDR / BND.PORT are left zeroed.
pub const REPLY_SUCCEEDED: [u8; 10] = [SOCKS_VERSION, 0x00, 0x00, ATYP_IPV4, 0, 0, 0, 0, 0, 0];

/// Read until at least `min` bytes are buffered; returns the total read.
async fn read_at_least<R>(reader: &mut R, buf: &mut [u8], min: usize) -> Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut n = 0;
    while n < min {
        let read = reader.read(&mut buf[n..]).await?;
        if read == 0 {
            return Err(Error::Network(std::io::ErrorKind::UnexpectedEof.into()));
        }
        n += read;
    }
    Ok(n)
}

/// Version / method-selection exchange.
///
/// ```text
/// +----+----------+----------+        +----+--------+
/// |VER | NMETHODS | METHODS  |   ->   |VER | METHOD |
/// +----+----------+----------+        +----+--------+
/// | 1  |    1     | 1 to 255 |        | 1  |   1    |
/// +----+----------+----------+        +----+--------+
/// ```
///
/// The offered methods are not inspected; "no authentication" is always
/// selected.
pub async fn handshake<S>(conn: &mut S) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; 2 + 256];
    let n = read_at_least(conn, &mut buf, 2).await?;

    if buf[0] != SOCKS_VERSION {
        return Err(Error::VersionMismatch {
            expected: SOCKS_VERSION,
            actual: buf[0],
        });
    }
    let nmethods = buf[1] as usize;
    if n != 2 + nmethods {
        return Err(Error::malformed(format!(
            "greeting announced {} methods, got {} bytes",
            nmethods, n
        )));
    }

    conn.write_all(&[SOCKS_VERSION, METHOD_NO_AUTH]).await?;
    Ok(())
}

/// Parse a CONNECT request.
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
///
/// The whole request must arrive as announced: a byte count different from
/// the one implied by ATYP is a malformed header.
pub async fn read_request<R>(conn: &mut R) -> Result<Address>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 3 + crate::proxy::address::MAX_ADDR_LEN];
    let n = read_at_least(conn, &mut buf, 5).await?;

    if buf[0] != SOCKS_VERSION {
        return Err(Error::VersionMismatch {
            expected: SOCKS_VERSION,
            actual: buf[0],
        });
    }
    if buf[1] != CMD_CONNECT {
        return Err(Error::UnsupportedCommand(buf[1]));
    }

    // ver + cmd + rsv + atyp, then address and port
    let req_len = match buf[3] {
        ATYP_IPV4 => 4 + 4 + 2,
        ATYP_IPV6 => 4 + 16 + 2,
        ATYP_DOMAIN => 4 + 1 + buf[4] as usize + 2,
        other => return Err(Error::UnsupportedAddressType(other)),
    };
    if n != req_len {
        return Err(Error::malformed(format!(
            "request is {} bytes, expected {}",
            n, req_len
        )));
    }

    Address::from_bytes(&buf[3..req_len])
}

/// Send the fixed success reply.
pub async fn send_reply<W>(conn: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    conn.write_all(&REPLY_SUCCEEDED).await?;
    Ok(())
}

/// Run the full server side of a SOCKS5 negotiation.
///
/// Success is reported to the client before the destination is dialed; a
/// dial failure later shows up as a closed connection.
pub async fn accept<S>(conn: &mut S) -> Result<Address>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    handshake(conn).await?;
    let addr = read_request(conn).await?;
    send_reply(conn).await?;
    Ok(addr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_greeting_selects_no_auth() {
        let (mut client, mut server) = duplex(1024);
        client.write_all(&[0x05, 0x02, 0x00, 0x01]).await.unwrap();

        handshake(&mut server).await.unwrap();

        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x05, 0x00]);
    }

    #[tokio::test]
    async fn test_greeting_wrong_version() {
        let (mut client, mut server) = duplex(1024);
        client.write_all(&[0x04, 0x01, 0x00]).await.unwrap();

        let err = handshake(&mut server).await.unwrap_err();
        assert!(matches!(err, Error::VersionMismatch { expected: 5, actual: 4 }));
    }

    #[tokio::test]
    async fn test_greeting_length_mismatch() {
        let (mut client, mut server) = duplex(1024);
        // Announces 3 methods, sends 1
        client.write_all(&[0x05, 0x03, 0x00]).await.unwrap();

        let err = handshake(&mut server).await.unwrap_err();
        assert!(matches!(err, Error::MalformedHeader(_)));
    }

    #[tokio::test]
    async fn test_connect_ipv4() {
        let (mut client, mut server) = duplex(1024);
        client
            .write_all(&[0x05, 0x01, 0x00, 0x01, 127, 0, 0, 1, 0x1F, 0x90])
            .await
            .unwrap();

        let addr = read_request(&mut server).await.unwrap();
        assert_eq!(addr.as_bytes(), &[0x01, 127, 0, 0, 1, 0x1F, 0x90]);
        assert_eq!(addr.to_string(), "127.0.0.1:8080");
    }

    #[tokio::test]
    async fn test_connect_domain_and_ipv6() {
        let (mut client, mut server) = duplex(1024);
        let mut req = vec![0x05, 0x01, 0x00, 0x03, 11];
        req.extend_from_slice(b"example.com");
        req.extend_from_slice(&[0x00, 0x50]);
        client.write_all(&req).await.unwrap();

        let addr = read_request(&mut server).await.unwrap();
        assert_eq!(addr.as_bytes(), &req[3..]);
        assert_eq!(addr.to_string(), "example.com:80");

        let mut req = vec![0x05, 0x01, 0x00, 0x04];
        req.extend_from_slice(&std::net::Ipv6Addr::LOCALHOST.octets());
        req.extend_from_slice(&[0x01, 0xBB]);
        client.write_all(&req).await.unwrap();

        let addr = read_request(&mut server).await.unwrap();
        assert_eq!(addr.to_string(), "[::1]:443");
    }

    #[tokio::test]
    async fn test_bind_command_rejected() {
        let (mut client, mut server) = duplex(1024);
        client
            .write_all(&[0x05, 0x02, 0x00, 0x01, 127, 0, 0, 1, 0x1F, 0x90])
            .await
            .unwrap();

        let err = read_request(&mut server).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedCommand(0x02)));
    }

    #[tokio::test]
    async fn test_unknown_address_type_rejected() {
        let (mut client, mut server) = duplex(1024);
        client
            .write_all(&[0x05, 0x01, 0x00, 0x02, 127, 0, 0, 1, 0x1F, 0x90])
            .await
            .unwrap();

        let err = read_request(&mut server).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedAddressType(0x02)));
    }

    #[tokio::test]
    async fn test_request_length_mismatch() {
        let (mut client, mut server) = duplex(1024);
        // IPv4 request missing the last port byte
        client
            .write_all(&[0x05, 0x01, 0x00, 0x01, 127, 0, 0, 1, 0x1F])
            .await
            .unwrap();

        let err = read_request(&mut server).await.unwrap_err();
        assert!(matches!(err, Error::MalformedHeader(_)));
    }

    #[tokio::test]
    async fn test_accept_full_exchange() {
        let (mut client, mut server) = duplex(1024);

        let negotiate = tokio::spawn(async move { accept(&mut server).await });

        client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
        let mut method = [0u8; 2];
        client.read_exact(&mut method).await.unwrap();
        assert_eq!(method, [0x05, 0x00]);

        client
            .write_all(&[0x05, 0x01, 0x00, 0x01, 10, 0, 0, 1, 0x00, 0x16])
            .await
            .unwrap();
        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, REPLY_SUCCEEDED);

        let addr = negotiate.await.unwrap().unwrap();
        assert_eq!(addr.to_string(), "10.0.0.1:22");
    }
}

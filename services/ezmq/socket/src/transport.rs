//! TCP transport helpers shared by publishers and subscribers.

use crate::error::EzmqError;
use bytes::BytesMut;
use ezmq_wire::{decode_greeting, encode_greeting, Frame, FrameDecoder, GREETING_SIZE};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, trace};

/// Bind the publisher listener on every interface
pub async fn listen(port: u16) -> Result<TcpListener, EzmqError> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    TcpListener::bind(addr).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::AddrInUse => EzmqError::AddressInUse(addr),
        _ => EzmqError::BindFailure { addr, source: e },
    })
}

/// Connect to a publisher by host name or address
pub async fn connect(host: &str, port: u16) -> std::io::Result<TcpStream> {
    let stream = TcpStream::connect((host, port)).await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Write the greeting a publisher sends on every accepted connection
pub async fn send_greeting<W: AsyncWriteExt + Unpin>(writer: &mut W) -> std::io::Result<()> {
    let mut buf = BytesMut::with_capacity(GREETING_SIZE);
    encode_greeting(&mut buf);
    writer.write_all(&buf).await?;
    trace!("Sent greeting");
    Ok(())
}

/// Read and verify the publisher greeting within `timeout`
pub async fn recv_greeting<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    timeout: Duration,
) -> Result<u8, EzmqError> {
    let mut raw = [0u8; GREETING_SIZE];
    tokio::time::timeout(timeout, reader.read_exact(&mut raw))
        .await
        .map_err(|_| EzmqError::Error("timed out waiting for greeting".into()))??;

    let version = decode_greeting(&mut &raw[..])?;
    debug!("Received greeting, wire version {}", version);
    Ok(version)
}

/// Read the next frame from the socket.
///
/// Returns `Ok(None)` when the peer closed the connection. Frame content
/// errors are returned with the offending bytes already consumed, so the
/// caller may keep reading unless the error is a size violation.
pub async fn recv_frame<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    decoder: &mut FrameDecoder,
    buffer: &mut BytesMut,
) -> Result<Option<Frame>, EzmqError> {
    loop {
        if let Some(frame) = decoder.decode(buffer)? {
            return Ok(Some(frame));
        }

        let bytes_read = reader.read_buf(buffer).await?;
        if bytes_read == 0 {
            if !buffer.is_empty() {
                debug!("Connection closed with {} bytes of partial frame", buffer.len());
            }
            return Ok(None);
        }

        trace!(
            "Read {} bytes, buffer now has {} bytes",
            bytes_read,
            buffer.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ezmq_wire::{ByteData, Envelope, Topic, WireError, DEFAULT_MAX_FRAME_SIZE};

    #[tokio::test]
    async fn test_greeting_exchange() {
        let (mut client, mut server) = tokio::io::duplex(64);
        send_greeting(&mut server).await.unwrap();
        let version = recv_greeting(&mut client, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(version, ezmq_wire::WIRE_VERSION);
    }

    #[tokio::test]
    async fn test_bad_greeting_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        server.write_all(b"HTTP/").await.unwrap();
        let result = recv_greeting(&mut client, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(EzmqError::Decode(WireError::Malformed))));
    }

    #[tokio::test]
    async fn test_greeting_timeout() {
        let (mut client, _server) = tokio::io::duplex(64);
        let result = recv_greeting(&mut client, Duration::from_millis(20)).await;
        assert!(matches!(result, Err(EzmqError::Error(_))));
    }

    #[tokio::test]
    async fn test_recv_frames_in_order() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        let topic = Topic::new("a/b").unwrap();
        for i in 0..3u8 {
            let envelope = Envelope::from(ByteData::new(vec![i]));
            let bytes = Frame::new(Some(topic.clone()), &envelope)
                .encode(DEFAULT_MAX_FRAME_SIZE)
                .unwrap();
            server.write_all(&bytes).await.unwrap();
        }
        drop(server);

        let mut decoder = FrameDecoder::new();
        let mut buffer = BytesMut::new();
        for i in 0..3u8 {
            let frame = recv_frame(&mut client, &mut decoder, &mut buffer)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(frame.topic.as_ref(), Some(&topic));
            assert_eq!(&frame.payload[..], &[i]);
        }
        assert!(recv_frame(&mut client, &mut decoder, &mut buffer)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_address_in_use() {
        let listener = TcpListener::bind("0.0.0.0:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(matches!(listen(port).await, Err(EzmqError::AddressInUse(_))));
    }
}

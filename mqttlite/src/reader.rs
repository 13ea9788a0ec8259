//! Exact-count reads from a stream that may deliver partial chunks.

use std::io;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

use crate::error::{Error, Result};
use crate::protocol::RemainingLength;
use crate::types::FixedHeader;

/// Pause before retrying a read that would block.
const RETRY_BACKOFF: Duration = Duration::from_millis(10);

/// A complete inbound packet: fixed header plus exactly `remaining_length` body bytes.
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: FixedHeader,
    pub body: Bytes,
}

/// Read exactly `count` bytes, concatenating partial reads in arrival order.
///
/// Never returns a short read. A read that would block is retried after
/// a short backoff; EOF before `count` bytes is
/// [`Error::ConnectionClosed`] and any other IO error propagates.
pub async fn read_exact<R: AsyncRead + Unpin>(reader: &mut R, count: usize) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(count);

    while buf.len() < count {
        let want = count - buf.len();
        match (&mut *reader).take(want as u64).read_buf(&mut buf).await {
            Ok(0) => return Err(Error::ConnectionClosed),
            Ok(n) if n < want => trace!("Partial read: {} of {} bytes", n, want),
            Ok(_) => {}
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {
                trace!("Read would block, retrying in {:?}", RETRY_BACKOFF);
                tokio::time::sleep(RETRY_BACKOFF).await;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(buf.freeze())
}

/// Read one packet.
///
/// Reads the type/flags byte together with the first length byte, then one
/// byte at a time while the remaining length needs more, then the body.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R, max_size: usize) -> Result<Frame> {
    let head = read_exact(reader, 2).await?;

    let mut length = RemainingLength::new();
    length.add_byte(head[1])?;
    while !length.is_complete() {
        let next = read_exact(reader, 1).await?;
        length.add_byte(next[0])?;
    }

    let remaining_length = length.value().ok_or(Error::MalformedLength)?;
    if remaining_length > max_size {
        return Err(Error::PacketTooLarge { size: remaining_length, max: max_size });
    }

    let body = read_exact(reader, remaining_length).await?;
    trace!("Read frame type={:#04x} len={}", head[0], remaining_length);

    Ok(Frame {
        header: FixedHeader {
            type_and_flags: head[0],
            remaining_length,
        },
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MAX_PACKET_SIZE;
    use crate::types::MessageType;
    use std::collections::VecDeque;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;
    use tokio_test::io::Builder;

    /// Replays scripted chunks; `None` yields a ready `WouldBlock` error.
    /// The tokio-test mock treats `WouldBlock` as a wait, so it can't stand in here.
    struct Flaky {
        script: VecDeque<Option<&'static [u8]>>,
    }

    impl AsyncRead for Flaky {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            match self.script.pop_front() {
                Some(Some(chunk)) => {
                    buf.put_slice(chunk);
                    Poll::Ready(Ok(()))
                }
                Some(None) => Poll::Ready(Err(io::ErrorKind::WouldBlock.into())),
                None => Poll::Ready(Ok(())),
            }
        }
    }

    #[tokio::test]
    async fn test_read_exact_partial_chunks() {
        let mut mock = Builder::new().read(b"\x00\x01").read(b"A").read(b"B").build();
        let bytes = read_exact(&mut mock, 4).await.unwrap();
        assert_eq!(&bytes[..], b"\x00\x01AB");
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_exact_retries_would_block() {
        let mut reader = Flaky {
            script: VecDeque::from([Some(&b"ab"[..]), None, None, Some(&b"cd"[..])]),
        };
        let start = tokio::time::Instant::now();
        let bytes = read_exact(&mut reader, 4).await.unwrap();
        assert_eq!(&bytes[..], b"abcd");
        assert!(start.elapsed() >= RETRY_BACKOFF * 2);
    }

    #[tokio::test]
    async fn test_read_exact_does_not_over_read() {
        let mut mock = Builder::new().read(b"abcdef").build();
        assert_eq!(&read_exact(&mut mock, 4).await.unwrap()[..], b"abcd");
        assert_eq!(&read_exact(&mut mock, 2).await.unwrap()[..], b"ef");
    }

    #[tokio::test]
    async fn test_read_exact_zero() {
        let mut mock = Builder::new().build();
        assert!(read_exact(&mut mock, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_exact_eof() {
        let mut mock = Builder::new().read(b"ab").build();
        let err = read_exact(&mut mock, 4).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_read_exact_propagates_io_error() {
        let mut mock = Builder::new()
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();
        let err = read_exact(&mut mock, 2).await.unwrap_err();
        assert!(matches!(err, Error::Io(e) if e.kind() == io::ErrorKind::ConnectionReset));
    }

    #[tokio::test]
    async fn test_read_frame_multi_byte_length() {
        let payload = vec![b'x'; 200];
        let mut body = b"\x00\x01A".to_vec();
        body.extend_from_slice(&payload);
        assert_eq!(body.len(), 203); // 0xcb 0x01

        let mut mock = Builder::new()
            .read(&[0x30, 0xcb])
            .read(&[0x01])
            .read(&body[..50])
            .read(&body[50..])
            .build();

        let frame = read_frame(&mut mock, MAX_PACKET_SIZE).await.unwrap();
        assert_eq!(frame.header.message_type(), Some(MessageType::Publish));
        assert_eq!(frame.header.remaining_length, 203);
        assert_eq!(&frame.body[..], &body[..]);
    }

    #[tokio::test]
    async fn test_read_frame_empty_body() {
        let mut mock = Builder::new().read(b"\xd0\x00").build();
        let frame = read_frame(&mut mock, MAX_PACKET_SIZE).await.unwrap();
        assert_eq!(frame.header.message_type(), Some(MessageType::PingResp));
        assert!(frame.body.is_empty());
    }

    #[tokio::test]
    async fn test_read_frame_malformed_length() {
        let mut mock = Builder::new().read(&[0x30, 0xff, 0xff, 0xff, 0xff]).build();
        let err = read_frame(&mut mock, MAX_PACKET_SIZE).await.unwrap_err();
        assert!(matches!(err, Error::MalformedLength));
    }

    #[tokio::test]
    async fn test_read_frame_too_large() {
        let mut mock = Builder::new().read(&[0x30, 0x80, 0x01]).build();
        let err = read_frame(&mut mock, 64).await.unwrap_err();
        assert!(matches!(err, Error::PacketTooLarge { size: 128, max: 64 }));
    }
}

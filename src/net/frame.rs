//! Length-prefixed binary framing over a byte stream.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ErrorKind, Result, ResultSimpleExt, ResultWrappedExt};

/// A framed stream: every logical unit on the wire is
/// `LEN32_BE || BODY`, where `LEN32_BE` is the four-byte big-endian
/// unsigned length of `BODY`. No interpretation of `BODY` occurs
/// here; that is the job of `net::wire`.
pub struct FramedStream<S> {
    inner: S,
    frame_max: u32,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(inner: S, frame_max: u32) -> Self {
        FramedStream { inner, frame_max }
    }

    /// Writes `frame` as a single logical unit: its length, as a
    /// fixed-width big-endian `u32`, immediately followed by the
    /// bytes themselves.
    pub async fn send(&mut self, frame: &[u8]) -> Result<()> {
        let len = u32::try_from(frame.len()).wrapped(ErrorKind::Protocol)?;
        let mut buf = Vec::with_capacity(4 + frame.len());
        buf.extend_from_slice(&len.to_be_bytes());
        buf.extend_from_slice(frame);
        self.inner.write_all(&buf).await?;
        Ok(())
    }

    /// Reads exactly one logical frame: a four-byte big-endian length
    /// prefix, followed by that many bytes of body.
    ///
    /// Fails with `ProtocolError` if the announced length exceeds
    /// `frame_max`, and with `PeerClosed` if the stream ends mid-frame
    /// (a clean end-of-stream between frames is reported the same
    /// way, since from here there is no way to tell the two apart;
    /// callers that treat "no next frame" as a normal disconnect
    /// should simply stop reading on `PeerClosed`).
    pub async fn recv(&mut self) -> Result<Vec<u8>> {
        let mut len_buf = [0u8; 4];
        self.read_exact_or_closed(&mut len_buf).await?;
        let len = u32::from_be_bytes(len_buf);
        if len > self.frame_max {
            return Err(format!("frame length {} exceeds frame_max {}", len, self.frame_max))
                .wrapped(ErrorKind::Protocol);
        }
        let mut body = vec![0u8; len as usize];
        self.read_exact_or_closed(&mut body).await?;
        Ok(body)
    }

    async fn read_exact_or_closed(&mut self, buf: &mut [u8]) -> Result<()> {
        let result = self.inner.read_exact(buf).await;
        if matches!(&result, Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof) {
            return result.simple(ErrorKind::PeerClosed).map(|_| ());
        }
        result.wrapped(ErrorKind::ConnectionFailed).map(|_| ())
    }

    pub async fn close(&mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn round_trips_a_frame() {
        let (a, b) = duplex(4096);
        let mut a = FramedStream::new(a, 1024);
        let mut b = FramedStream::new(b, 1024);

        a.send(b"hello").await.unwrap();
        let got = b.recv().await.unwrap();
        assert_eq!(got, b"hello");
    }

    #[tokio::test]
    async fn empty_payload_round_trips() {
        let (a, b) = duplex(4096);
        let mut a = FramedStream::new(a, 1024);
        let mut b = FramedStream::new(b, 1024);

        a.send(b"").await.unwrap();
        let got = b.recv().await.unwrap();
        assert!(got.is_empty());
    }

    #[tokio::test]
    async fn frame_max_boundary() {
        let (a, b) = duplex(8192);
        let mut a = FramedStream::new(a, 4);
        let mut b = FramedStream::new(b, 4);

        a.send(b"abcd").await.unwrap();
        let got = b.recv().await.unwrap();
        assert_eq!(got, b"abcd");
    }

    #[tokio::test]
    async fn frame_over_max_is_rejected() {
        let (a, mut b) = duplex(8192);
        // write a raw, over-limit length prefix directly, bypassing
        // the sender's own frame_max (it may be configured
        // differently from the receiver's).
        let mut a = FramedStream::new(a, 1024);
        a.send(&vec![0u8; 8]).await.unwrap();

        let mut recv_side = FramedStream::new(&mut b, 4);
        let err = recv_side.recv().await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Protocol);
    }

    #[tokio::test]
    async fn eof_mid_frame_is_peer_closed() {
        let (a, b) = duplex(4096);
        drop(a);
        let mut b = FramedStream::new(b, 1024);
        let err = b.recv().await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::PeerClosed);
    }
}

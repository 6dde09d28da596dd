//! Exact-length and line reads over streaming sources.
//!
//! A single `read` on a stream may return fewer bytes than asked for even when more are
//! on the way. Everything in the protocol that needs `n` bytes goes through
//! [`read_exact`] or [`read_exact_into`], which keep reading until the count is met and
//! report a peer close as [`ProtocolError::ConnectionClosed`].

use bytes::BytesMut;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt};

use crate::error::{constants, ProtocolError, Result};

/// Longest handshake line accepted, excluding the delimiter
pub const MAX_LINE_LEN: usize = 4096;

/// Read exactly `n` bytes from `source`.
pub async fn read_exact<R>(source: &mut R, n: usize) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = vec![0u8; n];
    if n > 0 {
        source.read_exact(&mut buf).await?;
    }
    Ok(buf)
}

/// Read exactly `n` bytes from `source`, appending them to `buf`.
///
/// On failure `buf` may hold a partial tail; callers drop it along with the connection.
pub async fn read_exact_into<R>(source: &mut R, buf: &mut BytesMut, n: usize) -> Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
{
    if n == 0 {
        return Ok(());
    }
    let start = buf.len();
    buf.resize(start + n, 0);
    source.read_exact(&mut buf[start..]).await?;
    Ok(())
}

/// Read one newline-terminated line and return it with surrounding whitespace removed.
///
/// Fails with `ConnectionClosed` if the stream ends before a delimiter shows up.
pub async fn read_line<R>(source: &mut R) -> Result<String>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    read_line_bounded(source, MAX_LINE_LEN).await
}

/// [`read_line`] with an explicit cap on the line length.
pub async fn read_line_bounded<R>(source: &mut R, max_len: usize) -> Result<String>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let mut raw = Vec::new();
    // One extra byte leaves room for the delimiter of a max-length line.
    let mut limited = (&mut *source).take(max_len as u64 + 1);
    limited.read_until(b'\n', &mut raw).await?;

    if raw.last() != Some(&b'\n') {
        if raw.len() > max_len {
            return Err(ProtocolError::HandshakeError(
                constants::ERR_LINE_TOO_LONG.into(),
            ));
        }
        return Err(ProtocolError::ConnectionClosed);
    }

    let line = String::from_utf8(raw).map_err(|_| ProtocolError::InvalidUtf8)?;
    Ok(line.trim().to_string())
}

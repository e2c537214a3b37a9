//! Length-prefixed frames: `<u64 big-endian length><payload>`.
//!
//! One request frame and one response frame per connection. A peer that
//! closes before sending any header byte is reported as `Ok(None)` so callers
//! can tell "nothing to say" apart from a truncated frame.

use std::io::{self, Read, Write};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const HEADER_LEN: usize = 8;
pub const MAX_FRAME_LEN: u64 = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
	#[error("io error: {0}")]
	Io(#[from] io::Error),
	#[error("frame of {len} bytes exceeds limit of {max} bytes")]
	TooLarge { len: u64, max: u64 },
	#[error("connection closed mid-frame")]
	Truncated,
}

pub fn encode(payload: &[u8]) -> Vec<u8> {
	let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
	out.extend_from_slice(&(payload.len() as u64).to_be_bytes());
	out.extend_from_slice(payload);
	out
}

fn checked_len(header: [u8; HEADER_LEN]) -> Result<usize, FrameError> {
	let len = u64::from_be_bytes(header);
	if len > MAX_FRAME_LEN {
		return Err(FrameError::TooLarge { len, max: MAX_FRAME_LEN });
	}
	Ok(len as usize)
}

fn truncated(e: io::Error) -> FrameError {
	if e.kind() == io::ErrorKind::UnexpectedEof {
		FrameError::Truncated
	} else {
		FrameError::Io(e)
	}
}

pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<(), FrameError> {
	writer.write_all(&encode(payload))?;
	writer.flush()?;
	Ok(())
}

pub fn read_frame<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>, FrameError> {
	let mut header = [0u8; HEADER_LEN];
	let mut filled = 0;
	while filled < HEADER_LEN {
		match reader.read(&mut header[filled..]) {
			Ok(0) if filled == 0 => return Ok(None),
			Ok(0) => return Err(FrameError::Truncated),
			Ok(n) => filled += n,
			Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
			Err(e) => return Err(e.into()),
		}
	}

	let len = checked_len(header)?;
	let mut payload = vec![0u8; len];
	reader.read_exact(&mut payload).map_err(truncated)?;
	Ok(Some(payload))
}

pub async fn write_frame_async<W: AsyncWrite + Unpin>(
	writer: &mut W,
	payload: &[u8],
) -> Result<(), FrameError> {
	writer.write_all(&encode(payload)).await?;
	writer.flush().await?;
	Ok(())
}

pub async fn read_frame_async<R: AsyncRead + Unpin>(
	reader: &mut R,
) -> Result<Option<Vec<u8>>, FrameError> {
	let mut header = [0u8; HEADER_LEN];
	let mut filled = 0;
	while filled < HEADER_LEN {
		match reader.read(&mut header[filled..]).await {
			Ok(0) if filled == 0 => return Ok(None),
			Ok(0) => return Err(FrameError::Truncated),
			Ok(n) => filled += n,
			Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
			Err(e) => return Err(e.into()),
		}
	}

	let len = checked_len(header)?;
	let mut payload = vec![0u8; len];
	reader.read_exact(&mut payload).await.map_err(truncated)?;
	Ok(Some(payload))
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Cursor;

	#[test]
	fn header_is_big_endian_u64() {
		let framed = encode(b"abc");
		assert_eq!(&framed[..HEADER_LEN], &[0, 0, 0, 0, 0, 0, 0, 3]);
		assert_eq!(&framed[HEADER_LEN..], b"abc");
	}

	#[test]
	fn read_back_written_frame() {
		let mut buf = Vec::new();
		write_frame(&mut buf, b"{\"code\":0}").unwrap();
		let payload = read_frame(&mut Cursor::new(buf)).unwrap();
		assert_eq!(payload.as_deref(), Some(&b"{\"code\":0}"[..]));
	}

	#[test]
	fn eof_before_header_is_no_frame() {
		let payload = read_frame(&mut Cursor::new(Vec::<u8>::new())).unwrap();
		assert!(payload.is_none());
	}

	#[test]
	fn partial_header_is_truncated() {
		let err = read_frame(&mut Cursor::new(vec![0u8, 0, 0])).unwrap_err();
		assert!(matches!(err, FrameError::Truncated));
	}

	#[test]
	fn short_body_is_truncated() {
		let mut framed = encode(b"hello");
		framed.truncate(HEADER_LEN + 2);
		let err = read_frame(&mut Cursor::new(framed)).unwrap_err();
		assert!(matches!(err, FrameError::Truncated));
	}

	#[test]
	fn oversized_length_rejected() {
		let header = (MAX_FRAME_LEN + 1).to_be_bytes().to_vec();
		let err = read_frame(&mut Cursor::new(header)).unwrap_err();
		assert!(matches!(err, FrameError::TooLarge { .. }));
	}

	#[test]
	fn zero_length_frame_is_empty_payload() {
		let payload = read_frame(&mut Cursor::new(encode(b""))).unwrap();
		assert_eq!(payload, Some(Vec::new()));
	}

	#[tokio::test]
	async fn async_reader_matches_blocking_reader() {
		let framed = encode(b"ping");
		let mut reader = &framed[..];
		let payload = read_frame_async(&mut reader).await.unwrap();
		assert_eq!(payload.as_deref(), Some(&b"ping"[..]));

		let mut empty: &[u8] = &[];
		assert!(read_frame_async(&mut empty).await.unwrap().is_none());
	}
}

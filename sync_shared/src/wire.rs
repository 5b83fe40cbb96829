//! Wire framing.
//!
//! Every message on the stream is `varint(len) || payload`, where the
//! varint is little-endian base-128 with the high bit of each byte as the
//! continuation flag. The stream gives no other boundary hints: the
//! decoder must survive a length field split across reads, a body spread
//! over many reads, and several complete messages landing in one read.
//!
//! Inside a frame, a named message is `varint(len(name)) || name || payload`.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// A `u32` varint never needs more than 5 bytes; a longer length field
/// can only come from a corrupt or hostile stream.
pub const MAX_VARINT_BYTES: usize = 5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("length varint exceeds {MAX_VARINT_BYTES} bytes")]
    VarintOverflow,
    #[error("frame too short for message header")]
    TruncatedHeader,
    #[error("message name is not valid UTF-8")]
    InvalidName,
    #[error("send buffer overflow: {needed} bytes needed, {free} free")]
    SendBufferOverflow { needed: usize, free: usize },
}

/// Appends `value` as a base-128 varint.
pub fn write_varint(buf: &mut BytesMut, mut value: u32) {
    while value > 0x7f {
        buf.put_u8((value as u8) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Reads a varint from the front of `buf`, returning the value and the
/// number of bytes consumed.
pub fn read_varint(buf: &[u8]) -> Result<(u32, usize), WireError> {
    let mut value: u32 = 0;
    let mut shift = 0;
    for (i, &b) in buf.iter().enumerate() {
        if i == MAX_VARINT_BYTES {
            return Err(WireError::VarintOverflow);
        }
        value |= u32::from(b & 0x7f) << shift;
        if b & 0x80 == 0 {
            return Ok((value, i + 1));
        }
        shift += 7;
    }
    Err(WireError::TruncatedHeader)
}

/// Frames a payload for sending: `varint(len) || payload`.
pub fn encode_frame(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(MAX_VARINT_BYTES + payload.len());
    write_varint(&mut buf, payload.len() as u32);
    buf.extend_from_slice(payload);
    buf.freeze()
}

/// Builds a named message body: `varint(len(name)) || name || payload`.
/// The result still needs [`encode_frame`] before hitting the wire.
pub fn encode_named(name: &str, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(MAX_VARINT_BYTES + name.len() + payload.len());
    write_varint(&mut buf, name.len() as u32);
    buf.extend_from_slice(name.as_bytes());
    buf.extend_from_slice(payload);
    buf.freeze()
}

/// Splits a received frame into message name and payload.
pub fn split_named(frame: &[u8]) -> Result<(&str, &[u8]), WireError> {
    let (name_len, consumed) = read_varint(frame)?;
    let name_len = name_len as usize;
    let rest = &frame[consumed..];
    if rest.len() < name_len {
        return Err(WireError::TruncatedHeader);
    }
    let name = std::str::from_utf8(&rest[..name_len]).map_err(|_| WireError::InvalidName)?;
    Ok((name, &rest[name_len..]))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeStage {
    ReadingLength,
    ReadingBody,
}

/// Resumable stream decoder.
///
/// Feed it whatever the socket produced; it returns every frame completed
/// by that input. Running dry mid-frame is not an error — state is kept
/// for the next read. A non-terminating length varint is fatal.
#[derive(Debug)]
pub struct FrameDecoder {
    stage: DecodeStage,
    len_value: u32,
    len_shift: u32,
    len_bytes: usize,
    body: BytesMut,
    need: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            stage: DecodeStage::ReadingLength,
            len_value: 0,
            len_shift: 0,
            len_bytes: 0,
            body: BytesMut::new(),
            need: 0,
        }
    }

    /// Consumes one read's worth of bytes and returns the frames it
    /// completed, in stream order.
    pub fn push(&mut self, mut input: &[u8]) -> Result<Vec<Bytes>, WireError> {
        let mut frames = Vec::new();

        while !input.is_empty() {
            match self.stage {
                DecodeStage::ReadingLength => {
                    let b = input[0];
                    input = &input[1..];

                    if self.len_bytes == MAX_VARINT_BYTES {
                        return Err(WireError::VarintOverflow);
                    }
                    self.len_value |= u32::from(b & 0x7f) << self.len_shift;
                    self.len_shift += 7;
                    self.len_bytes += 1;

                    if b & 0x80 == 0 {
                        self.need = self.len_value as usize;
                        self.len_value = 0;
                        self.len_shift = 0;
                        self.len_bytes = 0;
                        if self.need == 0 {
                            frames.push(Bytes::new());
                        } else {
                            self.body.reserve(self.need);
                            self.stage = DecodeStage::ReadingBody;
                        }
                    }
                }
                DecodeStage::ReadingBody => {
                    let take = (self.need - self.body.len()).min(input.len());
                    self.body.extend_from_slice(&input[..take]);
                    input = &input[take..];

                    if self.body.len() == self.need {
                        frames.push(self.body.split().freeze());
                        self.stage = DecodeStage::ReadingLength;
                        self.need = 0;
                    }
                }
            }
        }

        Ok(frames)
    }
}

/// Bounded outbound byte ring.
///
/// Single producer (the foreground `send` path), single consumer (the
/// flush loop). Exceeding capacity is caller misuse, not backpressure:
/// the configured size must cover everything queued between two flush
/// cycles.
#[derive(Debug)]
pub struct SendRing {
    buf: Vec<u8>,
    capacity: usize,
    start: usize,
    end: usize,
}

impl SendRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity],
            capacity,
            start: 0,
            end: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn len(&self) -> usize {
        if self.end >= self.start {
            self.end - self.start
        } else {
            self.end + self.capacity - self.start
        }
    }

    /// Enqueues bytes, wrapping around the end of the ring.
    pub fn push(&mut self, data: &[u8]) -> Result<(), WireError> {
        // One slot is kept free so start == end always means empty.
        let free = self.capacity - self.len() - 1;
        if data.len() > free {
            return Err(WireError::SendBufferOverflow {
                needed: data.len(),
                free,
            });
        }

        let tail = (self.capacity - self.end).min(data.len());
        self.buf[self.end..self.end + tail].copy_from_slice(&data[..tail]);
        if tail < data.len() {
            self.buf[..data.len() - tail].copy_from_slice(&data[tail..]);
        }
        self.end = (self.end + data.len()) % self.capacity;
        Ok(())
    }

    /// Takes every pending byte out of the ring in send order.
    pub fn drain(&mut self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        if self.end >= self.start {
            out.extend_from_slice(&self.buf[self.start..self.end]);
        } else {
            out.extend_from_slice(&self.buf[self.start..]);
            out.extend_from_slice(&self.buf[..self.end]);
        }
        self.start = self.end;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    fn framed_stream(payloads: &[&[u8]]) -> Vec<u8> {
        let mut stream = Vec::new();
        for p in payloads {
            stream.extend_from_slice(&encode_frame(p));
        }
        stream
    }

    #[test]
    fn varint_roundtrip() {
        for v in [0u32, 1, 127, 128, 300, 16_383, 16_384, u32::MAX] {
            let mut buf = BytesMut::new();
            write_varint(&mut buf, v);
            let (back, used) = read_varint(&buf).unwrap();
            assert_eq!(back, v);
            assert_eq!(used, buf.len());
        }
    }

    #[test]
    fn decode_whole_stream_at_once() {
        let stream = framed_stream(&[b"hello", b"", b"world!"]);
        let mut dec = FrameDecoder::new();
        let frames = dec.push(&stream).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(&frames[0][..], b"hello");
        assert!(frames[1].is_empty());
        assert_eq!(&frames[2][..], b"world!");
    }

    #[test]
    fn decode_is_split_invariant() {
        // A payload long enough to need a two-byte length varint.
        let big = vec![0xabu8; 300];
        let payloads: Vec<&[u8]> = vec![b"a", &big, b"xyz", b"", b"tail"];
        let stream = framed_stream(&payloads);

        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let mut dec = FrameDecoder::new();
            let mut frames = Vec::new();
            let mut rest = &stream[..];
            while !rest.is_empty() {
                let n = rng.gen_range(1..=rest.len().min(7));
                frames.extend(dec.push(&rest[..n]).unwrap());
                rest = &rest[n..];
            }
            assert_eq!(frames.len(), payloads.len());
            for (frame, payload) in frames.iter().zip(&payloads) {
                assert_eq!(&frame[..], *payload);
            }
        }
    }

    #[test]
    fn non_terminating_varint_is_fatal() {
        let mut dec = FrameDecoder::new();
        let err = dec.push(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x80]).unwrap_err();
        assert_eq!(err, WireError::VarintOverflow);
    }

    #[test]
    fn named_message_roundtrip() {
        let body = encode_named("ping", &[1, 2, 3]);
        let (name, payload) = split_named(&body).unwrap();
        assert_eq!(name, "ping");
        assert_eq!(payload, &[1, 2, 3]);
    }

    #[test]
    fn send_ring_wraps_and_overflows() {
        let mut ring = SendRing::new(8);
        ring.push(&[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(ring.drain(), vec![1, 2, 3, 4, 5]);

        // Start is now at offset 5; this write wraps.
        ring.push(&[6, 7, 8, 9, 10]).unwrap();
        assert_eq!(ring.drain(), vec![6, 7, 8, 9, 10]);

        ring.push(&[0; 7]).unwrap();
        let err = ring.push(&[0xff]).unwrap_err();
        assert!(matches!(err, WireError::SendBufferOverflow { .. }));
    }
}

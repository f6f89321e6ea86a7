//! Streaming document envelopes: segmented XChaCha20-Poly1305
//!
//! Envelope format (binary):
//! ```text
//! offset  len  field
//! 0       4    magic b"LBX1"
//! 4       1    format version (1)
//! 5       1    algorithm id (1 = XChaCha20-Poly1305, segmented)
//! 6       4    segment size S (u32 big-endian, plaintext bytes per segment)
//! 10      19   random nonce prefix
//! 29      ...  segments: [ciphertext (<= S bytes)][16-byte Poly1305 tag]
//! ```
//!
//! Segment `i` is sealed with nonce `prefix || i (u32 BE) || last_flag` and
//! AAD = the 29-byte header. Every segment except the last carries exactly S
//! plaintext bytes; the last carries 0..=S bytes and has `last_flag = 1`.
//! This binds each segment to its position and to the header, so
//! reordering, truncation, extension, and header edits all fail
//! authentication.
//!
//! Neither side holds more than one segment of data: [`EnvelopeSealer`]
//! keeps back at most S plaintext bytes, [`EnvelopeOpener`] at most one
//! sealed segment. The opener only ever returns plaintext from segments
//! whose tag has verified.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;

use crate::error::{CryptoError, CryptoResult};
use crate::keys::DocumentKey;
use crate::{NONCE_SIZE, TAG_SIZE};

pub const MAGIC: &[u8; 4] = b"LBX1";
pub const FORMAT_VERSION: u8 = 1;
pub const ALG_XCHACHA20_POLY1305_SEGMENTED: u8 = 1;

/// Random per-envelope part of the segment nonce.
pub const NONCE_PREFIX_SIZE: usize = NONCE_SIZE - 5;

pub const HEADER_SIZE: usize = 4 + 1 + 1 + 4 + NONCE_PREFIX_SIZE;

pub const MIN_SEGMENT_SIZE: u32 = 1024;
pub const MAX_SEGMENT_SIZE: u32 = 16 * 1024 * 1024;
pub const DEFAULT_SEGMENT_SIZE: u32 = 64 * 1024;

/// Highest segment index representable in the nonce.
const MAX_SEGMENT_INDEX: u64 = u32::MAX as u64;

/// Validated plaintext segment size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentSize(u32);

impl SegmentSize {
    pub fn new(bytes: u32) -> CryptoResult<Self> {
        if !(MIN_SEGMENT_SIZE..=MAX_SEGMENT_SIZE).contains(&bytes) {
            return Err(CryptoError::InvalidParams(format!(
                "segment size {bytes} outside {MIN_SEGMENT_SIZE}..={MAX_SEGMENT_SIZE}"
            )));
        }
        Ok(Self(bytes))
    }

    pub fn get(&self) -> u32 {
        self.0
    }

    fn as_usize(&self) -> usize {
        self.0 as usize
    }
}

impl Default for SegmentSize {
    fn default() -> Self {
        Self(DEFAULT_SEGMENT_SIZE)
    }
}

/// Total sealed length for a plaintext of `plaintext_len` bytes.
pub fn sealed_len(plaintext_len: u64, segment_size: SegmentSize) -> u64 {
    let s = segment_size.get() as u64;
    // The last segment always exists, even for empty input.
    let segments = if plaintext_len == 0 {
        1
    } else {
        plaintext_len.div_ceil(s)
    };
    HEADER_SIZE as u64 + plaintext_len + segments * TAG_SIZE as u64
}

fn encode_header(segment_size: SegmentSize, prefix: &[u8; NONCE_PREFIX_SIZE]) -> [u8; HEADER_SIZE] {
    let mut header = [0u8; HEADER_SIZE];
    header[..4].copy_from_slice(MAGIC);
    header[4] = FORMAT_VERSION;
    header[5] = ALG_XCHACHA20_POLY1305_SEGMENTED;
    header[6..10].copy_from_slice(&segment_size.get().to_be_bytes());
    header[10..].copy_from_slice(prefix);
    header
}

fn parse_header(bytes: &[u8]) -> CryptoResult<(SegmentSize, [u8; NONCE_PREFIX_SIZE])> {
    if bytes.len() < HEADER_SIZE {
        return Err(CryptoError::Integrity("envelope header truncated".into()));
    }
    if &bytes[..4] != MAGIC {
        return Err(CryptoError::Integrity("bad envelope magic".into()));
    }
    if bytes[4] != FORMAT_VERSION {
        return Err(CryptoError::Integrity(format!(
            "unsupported envelope version {}",
            bytes[4]
        )));
    }
    if bytes[5] != ALG_XCHACHA20_POLY1305_SEGMENTED {
        return Err(CryptoError::Integrity(format!(
            "unsupported envelope algorithm {}",
            bytes[5]
        )));
    }
    let mut size = [0u8; 4];
    size.copy_from_slice(&bytes[6..10]);
    let segment_size = SegmentSize::new(u32::from_be_bytes(size))
        .map_err(|_| CryptoError::Integrity("envelope segment size out of range".into()))?;

    let mut prefix = [0u8; NONCE_PREFIX_SIZE];
    prefix.copy_from_slice(&bytes[10..HEADER_SIZE]);
    Ok((segment_size, prefix))
}

fn segment_nonce(prefix: &[u8; NONCE_PREFIX_SIZE], index: u64, last: bool) -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    nonce[..NONCE_PREFIX_SIZE].copy_from_slice(prefix);
    nonce[NONCE_PREFIX_SIZE..NONCE_SIZE - 1].copy_from_slice(&(index as u32).to_be_bytes());
    nonce[NONCE_SIZE - 1] = u8::from(last);
    nonce
}

/// Incremental encryptor: feed plaintext with [`update`](Self::update), collect
/// ciphertext, then call [`finish`](Self::finish) exactly once.
pub struct EnvelopeSealer {
    cipher: XChaCha20Poly1305,
    header: [u8; HEADER_SIZE],
    prefix: [u8; NONCE_PREFIX_SIZE],
    segment_size: SegmentSize,
    next_index: u64,
    header_emitted: bool,
    pending: Vec<u8>,
}

impl EnvelopeSealer {
    /// Start a new envelope with a fresh random nonce prefix.
    pub fn new(key: &DocumentKey, segment_size: SegmentSize) -> Self {
        let mut prefix = [0u8; NONCE_PREFIX_SIZE];
        rand::thread_rng().fill_bytes(&mut prefix);

        Self {
            cipher: XChaCha20Poly1305::new(key.as_bytes().into()),
            header: encode_header(segment_size, &prefix),
            prefix,
            segment_size,
            next_index: 0,
            header_emitted: false,
            pending: Vec::with_capacity(segment_size.as_usize()),
        }
    }

    /// Absorb plaintext; returns whatever ciphertext is ready.
    ///
    /// A full segment is only sealed once at least one more byte follows it,
    /// because the final segment must be sealed with the last flag.
    pub fn update(&mut self, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        let mut out = self.take_header();
        self.pending.extend_from_slice(plaintext);

        let s = self.segment_size.as_usize();
        let mut consumed = 0;
        while self.pending.len() - consumed > s {
            let sealed = self.seal_segment(consumed, consumed + s, false)?;
            out.extend_from_slice(&sealed);
            consumed += s;
        }
        self.pending.drain(..consumed);
        Ok(out)
    }

    /// Seal the final segment and return the remaining ciphertext.
    pub fn finish(mut self) -> CryptoResult<Vec<u8>> {
        let mut out = self.take_header();
        let end = self.pending.len();
        let sealed = self.seal_segment(0, end, true)?;
        out.extend_from_slice(&sealed);
        self.pending.clear();
        Ok(out)
    }

    fn take_header(&mut self) -> Vec<u8> {
        if self.header_emitted {
            Vec::new()
        } else {
            self.header_emitted = true;
            self.header.to_vec()
        }
    }

    fn seal_segment(&mut self, start: usize, end: usize, last: bool) -> CryptoResult<Vec<u8>> {
        if self.next_index > MAX_SEGMENT_INDEX {
            return Err(CryptoError::NonceExhausted);
        }
        let nonce = segment_nonce(&self.prefix, self.next_index, last);
        self.next_index += 1;

        self.cipher
            .encrypt(
                XNonce::from_slice(&nonce),
                Payload {
                    msg: &self.pending[start..end],
                    aad: &self.header,
                },
            )
            .map_err(|e| CryptoError::Encrypt(format!("segment encryption: {e}")))
    }
}

/// Incremental decryptor: feed ciphertext with [`update`](Self::update) and
/// receive verified plaintext, then call [`finish`](Self::finish) at end of input.
///
/// After the first failure every further call fails as well.
pub struct EnvelopeOpener {
    cipher: XChaCha20Poly1305,
    header: Option<([u8; HEADER_SIZE], SegmentSize, [u8; NONCE_PREFIX_SIZE])>,
    next_index: u64,
    buffered: Vec<u8>,
    failed: bool,
}

impl EnvelopeOpener {
    pub fn new(key: &DocumentKey) -> Self {
        Self {
            cipher: XChaCha20Poly1305::new(key.as_bytes().into()),
            header: None,
            next_index: 0,
            buffered: Vec::new(),
            failed: false,
        }
    }

    /// Absorb ciphertext; returns plaintext of every segment that is
    /// complete, known not to be the last one, and authenticated.
    pub fn update(&mut self, ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
        self.guard()?;
        self.buffered.extend_from_slice(ciphertext);

        let result = self.drain_segments();
        if result.is_err() {
            self.fail();
        }
        result
    }

    /// Verify and return the final segment. Fails if the envelope was cut short.
    pub fn finish(mut self) -> CryptoResult<Vec<u8>> {
        self.guard()?;
        let result = self.open_final();
        if result.is_err() {
            self.fail();
        }
        result
    }

    fn guard(&self) -> CryptoResult<()> {
        if self.failed {
            return Err(CryptoError::Integrity("envelope already failed verification".into()));
        }
        Ok(())
    }

    fn fail(&mut self) {
        self.failed = true;
        self.buffered.clear();
    }

    fn ensure_header(&mut self) -> CryptoResult<bool> {
        if self.header.is_some() {
            return Ok(true);
        }
        if self.buffered.len() < HEADER_SIZE {
            return Ok(false);
        }
        let (segment_size, prefix) = parse_header(&self.buffered)?;
        let mut header = [0u8; HEADER_SIZE];
        header.copy_from_slice(&self.buffered[..HEADER_SIZE]);
        self.buffered.drain(..HEADER_SIZE);
        self.header = Some((header, segment_size, prefix));
        Ok(true)
    }

    fn drain_segments(&mut self) -> CryptoResult<Vec<u8>> {
        if !self.ensure_header()? {
            return Ok(Vec::new());
        }
        let block = self.segment_block_len();

        let mut out = Vec::new();
        let mut consumed = 0;
        // Strictly greater: a block followed by nothing may be the last one.
        while self.buffered.len() - consumed > block {
            let plain = self.open_segment(consumed, consumed + block, false)?;
            out.extend_from_slice(&plain);
            consumed += block;
        }
        self.buffered.drain(..consumed);
        Ok(out)
    }

    fn open_final(&mut self) -> CryptoResult<Vec<u8>> {
        if !self.ensure_header()? {
            return Err(CryptoError::Integrity("envelope header truncated".into()));
        }
        // Flush any whole non-final segments still buffered.
        let mut out = self.drain_segments()?;
        if self.buffered.len() < TAG_SIZE {
            return Err(CryptoError::Integrity("final segment missing".into()));
        }
        let end = self.buffered.len();
        let plain = self.open_segment(0, end, true)?;
        out.extend_from_slice(&plain);
        self.buffered.clear();
        Ok(out)
    }

    fn segment_block_len(&self) -> usize {
        match &self.header {
            Some((_, size, _)) => size.as_usize() + TAG_SIZE,
            None => 0,
        }
    }

    fn open_segment(&mut self, start: usize, end: usize, last: bool) -> CryptoResult<Vec<u8>> {
        let Some((header, _, prefix)) = &self.header else {
            return Err(CryptoError::Integrity("envelope header missing".into()));
        };
        if self.next_index > MAX_SEGMENT_INDEX {
            return Err(CryptoError::Integrity("too many segments".into()));
        }
        let index = self.next_index;
        let nonce = segment_nonce(prefix, index, last);

        let plain = self
            .cipher
            .decrypt(
                XNonce::from_slice(&nonce),
                Payload {
                    msg: &self.buffered[start..end],
                    aad: header,
                },
            )
            .map_err(|_| {
                CryptoError::Integrity(format!("segment {index} failed authentication"))
            })?;
        self.next_index += 1;
        Ok(plain)
    }
}

/// Seal a whole in-memory document.
pub fn seal(key: &DocumentKey, segment_size: SegmentSize, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    let mut sealer = EnvelopeSealer::new(key, segment_size);
    let mut out = sealer.update(plaintext)?;
    out.extend_from_slice(&sealer.finish()?);
    Ok(out)
}

/// Open a whole in-memory envelope. Returns nothing unless every segment verifies.
pub fn open(key: &DocumentKey, envelope: &[u8]) -> CryptoResult<Vec<u8>> {
    let mut opener = EnvelopeOpener::new(key);
    let mut out = opener.update(envelope)?;
    out.extend_from_slice(&opener.finish()?);
    Ok(out)
}

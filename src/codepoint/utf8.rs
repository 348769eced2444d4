//! UTF-8 legality filter (spec §4.G, component G).
//!
//! Wraps a [`ByteModel`] so that every boundary is forced well-formed: the
//! wrapped model inspects the byte prefix, zeroes any byte that would
//! produce illegal UTF-8, and renormalises. This is what lets the
//! byte→codepoint adapter ([`super`]) assume the underlying distribution is
//! already UTF-8-safe — it never special-cases boundary legality itself.
//!
//! A `strict` variant is also provided for validating a model that is
//! expected to already satisfy the byte-model contract (spec §4.D: illegal
//! continuations carry probability 0): rather than silently absorbing the
//! violation, it raises `IllegalUtf8` (spec §7), useful when exercising a
//! model implementation's own UTF-8 awareness in tests.

use crate::model::{ByteModel, Distribution};
use crate::{Error, Probability, Result};
use async_trait::async_trait;

/// Which bytes are legal at the current position in a UTF-8 sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    /// Start of a new character: 0x00-0x7F or a valid lead byte.
    CharStart,
    /// Continuation byte, restricted to a specific sub-range by the
    /// preceding lead byte (overlong/surrogate/upper-bound guards).
    Continuation { low: u8, high: u8 },
}

/// Classifies the expected byte given the bytes already committed to the
/// current character. `tail` holds the bytes of the in-progress multi-byte
/// sequence (empty at a character boundary).
fn classify(tail: &[u8]) -> Boundary {
    match tail {
        [] => Boundary::CharStart,
        [lead] => match *lead {
            0xE0 => Boundary::Continuation { low: 0xA0, high: 0xBF },
            0xED => Boundary::Continuation { low: 0x80, high: 0x9F },
            0xF0 => Boundary::Continuation { low: 0x90, high: 0xBF },
            0xF4 => Boundary::Continuation { low: 0x80, high: 0x8F },
            _ => Boundary::Continuation { low: 0x80, high: 0xBF },
        },
        _ => Boundary::Continuation { low: 0x80, high: 0xBF },
    }
}

/// The bytes of the multi-byte sequence currently in progress, i.e. the
/// suffix of `prefix` since the last character boundary. Returns an empty
/// slice at a character boundary, including right after a complete
/// multi-byte codepoint.
///
/// Decodes `prefix` as UTF-8 from the front rather than walking back byte by
/// byte: a trailing *complete* sequence (e.g. `[0xC3, 0xA9]` for `'é'`) must
/// report an empty tail so the next byte is classified `CharStart`, which a
/// backward scan that only recognises lead bytes cannot distinguish from a
/// trailing *incomplete* one.
fn current_tail(prefix: &[u8]) -> &[u8] {
    match std::str::from_utf8(prefix) {
        Ok(_) => &[],
        Err(err) => &prefix[err.valid_up_to()..],
    }
}

fn legal_bytes(boundary: Boundary) -> impl Fn(u8) -> bool {
    move |b: u8| match boundary {
        Boundary::CharStart => (0x00..=0x7F).contains(&b) || (0xC2..=0xF4).contains(&b),
        Boundary::Continuation { low, high } => (low..=high).contains(&b),
    }
}

/// `forceCleanUtf8(model)` (spec §4.G).
pub struct Utf8LegalityFilter<M> {
    inner: M,
    strict: bool,
}

impl<M> Utf8LegalityFilter<M> {
    /// The forcing filter: silently zeroes illegal bytes and renormalises.
    pub fn new(inner: M) -> Self {
        Utf8LegalityFilter { inner, strict: false }
    }

    /// Raises `IllegalUtf8` instead of silently absorbing a model assigning
    /// non-zero probability to a forbidden byte.
    pub fn strict(inner: M) -> Self {
        Utf8LegalityFilter { inner, strict: true }
    }
}

#[async_trait]
impl<M: ByteModel> ByteModel for Utf8LegalityFilter<M> {
    async fn predict(&self, prefix: &[u8], min_prob: Probability) -> Result<Distribution> {
        let raw = self.inner.predict(prefix, min_prob).await?;
        let tail = current_tail(prefix);
        let boundary = classify(tail);
        let is_legal = legal_bytes(boundary);

        let mut filtered = [0.0; 256];
        for (byte, p) in raw.iter() {
            if is_legal(byte) {
                filtered[byte as usize] = p;
            } else if self.strict && p != 0.0 {
                return Err(Error::IllegalUtf8 { byte, boundary: format!("{boundary:?}") });
            }
        }

        let total: Probability = filtered.iter().sum();
        if total == 0.0 {
            return Ok(Distribution::from_raw_unchecked(filtered));
        }
        for p in filtered.iter_mut() {
            *p /= total;
        }
        Distribution::new(filtered)
    }
}

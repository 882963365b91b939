//! Shamir secret sharing over GF(2^bits).
//!
//! The field width is an explicit constructor parameter of [`GfShamir`];
//! there is no process-global configuration.  A width of `bits` supports at
//! most `2^bits − 1` shares, so callers size the field to the member count
//! (`bits = max(3, ceil(log2(n)))`, see [`crate::quorum`]).
//!
//! The secret is treated as an MSB-first bit string, chopped into `bits`-wide
//! words.  Each word is shared independently: a random polynomial of degree
//! `threshold − 1` with the word as its constant term is evaluated at
//! `x = 1..=n`.  Any `threshold` distinct evaluations recover the word by
//! Lagrange interpolation at `x = 0`; fewer reveal nothing.
//!
//! Field arithmetic is carry-less (XOR addition, Russian-peasant
//! multiplication reduced by a fixed primitive polynomial per width).
//! Inversion is Fermat exponentiation, `a^(2^bits − 2)`.

use rand::Rng;
use thiserror::Error;

/// Smallest supported field width.
pub const MIN_BITS: u32 = 3;
/// Largest supported field width (2^20 − 1 = 1 048 575 shares).
pub const MAX_BITS: u32 = 20;

// Low coefficients of a primitive polynomial for each width; the full
// modulus is x^bits + poly.  Indexed by `bits`, entries 0..3 unused.
// These values are frozen — shares written with one table cannot be
// combined under another.
const PRIMITIVE_POLYNOMIALS: [u32; 21] = [
    0, 0, 0, // unused
    3,  // x^3  + x + 1
    3,  // x^4  + x + 1
    5,  // x^5  + x^2 + 1
    3,  // x^6  + x + 1
    3,  // x^7  + x + 1
    29, // x^8  + x^4 + x^3 + x^2 + 1
    17, // x^9  + x^4 + 1
    9,  // x^10 + x^3 + 1
    5,  // x^11 + x^2 + 1
    83, // x^12 + x^6 + x^4 + x + 1
    27, // x^13 + x^4 + x^3 + x + 1
    43, // x^14 + x^5 + x^3 + x + 1
    3,  // x^15 + x + 1
    45, // x^16 + x^5 + x^3 + x^2 + 1
    9,  // x^17 + x^3 + 1
    39, // x^18 + x^5 + x^2 + x + 1
    39, // x^19 + x^5 + x^2 + x + 1
    9,  // x^20 + x^3 + 1
];

#[derive(Error, Debug)]
pub enum ShamirError {
    #[error("Field width {bits} outside supported range {MIN_BITS}..={MAX_BITS}")]
    InvalidBitRange { bits: u32 },
    #[error("Requested {requested} shares but a {bits}-bit field holds at most {max}")]
    TooManyShares { requested: u32, bits: u32, max: u32 },
    #[error("Threshold {threshold} outside valid range 2..={shares}")]
    ThresholdOutOfRange { threshold: u32, shares: u32 },
    #[error("Need at least 2 shares to combine, got {0}")]
    NotEnoughShares(usize),
    #[error("Duplicate share index {0}")]
    DuplicateShareIndex(u32),
    #[error("Shares disagree on secret length or word count")]
    ShareMismatch,
    #[error("Malformed share bytes")]
    MalformedShare,
}

/// One participant's share: the evaluation point and one field word per
/// `bits`-wide chunk of the secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Share {
    /// Evaluation point, never zero.
    pub x: u32,
    /// Original secret length in bytes (needed to strip padding bits).
    pub secret_len: u32,
    /// One polynomial evaluation per secret word.
    pub words: Vec<u32>,
}

impl Share {
    /// Serialize as `[x (4 B BE) | secret_len (4 B BE) | words (4 B BE each)]`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.words.len() * 4);
        out.extend_from_slice(&self.x.to_be_bytes());
        out.extend_from_slice(&self.secret_len.to_be_bytes());
        for w in &self.words {
            out.extend_from_slice(&w.to_be_bytes());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ShamirError> {
        if bytes.len() < 8 || bytes.len() % 4 != 0 {
            return Err(ShamirError::MalformedShare);
        }
        let x = u32::from_be_bytes(bytes[0..4].try_into().unwrap());
        let secret_len = u32::from_be_bytes(bytes[4..8].try_into().unwrap());
        if x == 0 {
            return Err(ShamirError::MalformedShare);
        }
        let words = bytes[8..]
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes(c.try_into().unwrap()))
            .collect();
        Ok(Self { x, secret_len, words })
    }
}

/// A Shamir split/combine instance bound to one field width.
#[derive(Debug, Clone, Copy)]
pub struct GfShamir {
    bits:    u32,
    modulus: u32,
}

impl GfShamir {
    pub fn new(bits: u32) -> Result<Self, ShamirError> {
        if !(MIN_BITS..=MAX_BITS).contains(&bits) {
            return Err(ShamirError::InvalidBitRange { bits });
        }
        Ok(Self {
            bits,
            modulus: (1 << bits) | PRIMITIVE_POLYNOMIALS[bits as usize],
        })
    }

    /// Maximum number of shares this field width supports.
    #[inline]
    pub fn max_shares(&self) -> u32 {
        (1 << self.bits) - 1
    }

    #[inline]
    pub fn bits(&self) -> u32 {
        self.bits
    }

    // ── Splitting ────────────────────────────────────────────────────────────

    /// Split `secret` into `shares` shares with the given `threshold`.
    pub fn split<R: Rng>(
        &self,
        secret:    &[u8],
        shares:    u32,
        threshold: u32,
        rng:       &mut R,
    ) -> Result<Vec<Share>, ShamirError> {
        if shares > self.max_shares() {
            return Err(ShamirError::TooManyShares {
                requested: shares,
                bits:      self.bits,
                max:       self.max_shares(),
            });
        }
        if threshold < 2 || threshold > shares {
            return Err(ShamirError::ThresholdOutOfRange { threshold, shares });
        }

        let words = bytes_to_words(secret, self.bits);
        let word_mask: u32 = (1 << self.bits) - 1;

        let mut out: Vec<Share> = (1..=shares)
            .map(|x| Share {
                x,
                secret_len: secret.len() as u32,
                words: Vec::with_capacity(words.len()),
            })
            .collect();

        let mut coeffs = vec![0u32; threshold as usize];
        for &word in &words {
            coeffs[0] = word;
            for c in coeffs.iter_mut().skip(1) {
                *c = rng.gen::<u32>() & word_mask;
            }
            for share in out.iter_mut() {
                share.words.push(self.eval(&coeffs, share.x));
            }
        }
        Ok(out)
    }

    // ── Combining ────────────────────────────────────────────────────────────

    /// Recover the secret from at least `threshold` distinct shares.
    ///
    /// Order-insensitive; extra shares beyond the threshold are used and do
    /// not change the result for consistent inputs.
    pub fn combine(&self, shares: &[Share]) -> Result<Vec<u8>, ShamirError> {
        if shares.len() < 2 {
            return Err(ShamirError::NotEnoughShares(shares.len()));
        }
        let secret_len = shares[0].secret_len;
        let word_count = shares[0].words.len();
        for s in shares {
            if s.secret_len != secret_len || s.words.len() != word_count {
                return Err(ShamirError::ShareMismatch);
            }
            if s.x == 0 || s.x > self.max_shares() {
                return Err(ShamirError::MalformedShare);
            }
        }
        for (i, a) in shares.iter().enumerate() {
            if shares[i + 1..].iter().any(|b| b.x == a.x) {
                return Err(ShamirError::DuplicateShareIndex(a.x));
            }
        }

        let mut words = Vec::with_capacity(word_count);
        for j in 0..word_count {
            let mut acc = 0u32;
            for (i, si) in shares.iter().enumerate() {
                // Lagrange basis at x = 0: prod_{k≠i} x_k / (x_k ⊕ x_i).
                let mut basis = 1u32;
                for (k, sk) in shares.iter().enumerate() {
                    if k == i {
                        continue;
                    }
                    basis = self.mul(basis, self.div(sk.x, sk.x ^ si.x));
                }
                acc ^= self.mul(basis, si.words[j]);
            }
            words.push(acc);
        }
        Ok(words_to_bytes(&words, self.bits, secret_len as usize))
    }

    // ── Field arithmetic ─────────────────────────────────────────────────────

    /// Horner evaluation of `coeffs[0] + coeffs[1]·x + …` at `x`.
    fn eval(&self, coeffs: &[u32], x: u32) -> u32 {
        let mut y = 0u32;
        for &c in coeffs.iter().rev() {
            y = self.mul(y, x) ^ c;
        }
        y
    }

    fn mul(&self, mut a: u32, mut b: u32) -> u32 {
        let mut r = 0u32;
        while b != 0 {
            if b & 1 != 0 {
                r ^= a;
            }
            b >>= 1;
            a <<= 1;
            if a & (1 << self.bits) != 0 {
                a ^= self.modulus;
            }
        }
        r
    }

    fn pow(&self, mut base: u32, mut exp: u32) -> u32 {
        let mut r = 1u32;
        while exp != 0 {
            if exp & 1 != 0 {
                r = self.mul(r, base);
            }
            base = self.mul(base, base);
            exp >>= 1;
        }
        r
    }

    #[inline]
    fn inv(&self, a: u32) -> u32 {
        // Fermat: a^(2^bits − 2).  inv(0) is never reached — divisors are
        // x_k ⊕ x_i with distinct x values, or x_k itself (nonzero).
        self.pow(a, (1 << self.bits) - 2)
    }

    #[inline]
    fn div(&self, a: u32, b: u32) -> u32 {
        self.mul(a, self.inv(b))
    }
}

// ── Bit packing ──────────────────────────────────────────────────────────────

/// Chop an MSB-first bit string into `bits`-wide words, zero-padding the
/// final word on the right.
fn bytes_to_words(secret: &[u8], bits: u32) -> Vec<u32> {
    let mask: u64 = (1 << bits) - 1;
    let mut words = Vec::with_capacity((secret.len() * 8 + bits as usize - 1) / bits as usize);
    let mut acc: u64 = 0;
    let mut acc_bits: u32 = 0;
    for &byte in secret {
        acc = (acc << 8) | byte as u64;
        acc_bits += 8;
        while acc_bits >= bits {
            acc_bits -= bits;
            words.push(((acc >> acc_bits) & mask) as u32);
        }
    }
    if acc_bits > 0 {
        words.push(((acc << (bits - acc_bits)) & mask) as u32);
    }
    words
}

/// Inverse of [`bytes_to_words`]; truncates to `out_len` bytes.
fn words_to_bytes(words: &[u32], bits: u32, out_len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(out_len);
    let mut acc: u64 = 0;
    let mut acc_bits: u32 = 0;
    for &w in words {
        acc = (acc << bits) | w as u64;
        acc_bits += bits;
        while acc_bits >= 8 {
            acc_bits -= 8;
            out.push(((acc >> acc_bits) & 0xFF) as u8);
            if out.len() == out_len {
                return out;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> rand::rngs::StdRng {
        rand::rngs::StdRng::seed_from_u64(7)
    }

    #[test]
    fn word_packing_round_trips() {
        for bits in MIN_BITS..=MAX_BITS {
            let secret: Vec<u8> = (0..=255u8).collect();
            let words = bytes_to_words(&secret, bits);
            assert_eq!(words_to_bytes(&words, bits, secret.len()), secret);
        }
    }

    #[test]
    fn split_combine_round_trips_across_widths() {
        let secret = b"correct horse battery staple";
        for bits in MIN_BITS..=12 {
            let gf = GfShamir::new(bits).unwrap();
            let shares = gf.split(secret, 5, 3, &mut rng()).unwrap();
            assert_eq!(gf.combine(&shares[..3]).unwrap(), secret);
            assert_eq!(gf.combine(&shares[2..]).unwrap(), secret);
            // Order-insensitive above the threshold.
            let reversed: Vec<Share> = shares.iter().rev().cloned().collect();
            assert_eq!(gf.combine(&reversed).unwrap(), secret);
        }
    }

    #[test]
    fn below_threshold_does_not_recover() {
        let secret = [0xAAu8; 32];
        let gf = GfShamir::new(3).unwrap();
        let shares = gf.split(&secret, 5, 3, &mut rng()).unwrap();
        assert_ne!(gf.combine(&shares[..2]).unwrap(), secret);
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(matches!(GfShamir::new(2), Err(ShamirError::InvalidBitRange { .. })));
        assert!(matches!(GfShamir::new(21), Err(ShamirError::InvalidBitRange { .. })));
        let gf = GfShamir::new(3).unwrap();
        assert!(matches!(
            gf.split(b"s", 8, 2, &mut rng()),
            Err(ShamirError::TooManyShares { .. })
        ));
        assert!(matches!(
            gf.split(b"s", 5, 6, &mut rng()),
            Err(ShamirError::ThresholdOutOfRange { .. })
        ));
        assert!(matches!(
            gf.split(b"s", 5, 1, &mut rng()),
            Err(ShamirError::ThresholdOutOfRange { .. })
        ));
    }

    #[test]
    fn duplicate_share_index_is_rejected() {
        let gf = GfShamir::new(4).unwrap();
        let shares = gf.split(b"secret", 4, 2, &mut rng()).unwrap();
        let dup = vec![shares[0].clone(), shares[0].clone()];
        assert!(matches!(gf.combine(&dup), Err(ShamirError::DuplicateShareIndex(_))));
    }

    #[test]
    fn share_bytes_round_trip() {
        let gf = GfShamir::new(8).unwrap();
        let shares = gf.split(&[1, 2, 3, 4, 5], 3, 2, &mut rng()).unwrap();
        for s in &shares {
            assert_eq!(Share::from_bytes(&s.to_bytes()).unwrap(), *s);
        }
        assert!(Share::from_bytes(&[0, 0]).is_err());
    }
}

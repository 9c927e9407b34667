//! Pluggable PRNG, the Feistel-based transaction ID permutor, and the 8-bit
//! shuffle used to randomize RR-set and nameserver iteration order.
//!
//! No global state: callers construct a `Permutor` (or anything implementing
//! `Prng`) explicitly and hand it to whichever `transport::Socket` or
//! `resolver::Resolver` needs it, rather than reaching for a weakly-linked
//! `dns_random`-style function pointer (see DESIGN.md, §9 Design Notes).

use rand::rngs::OsRng;
use rand::RngCore;

/// A source of 32-bit randomness. The platform cryptographic source is
/// preferred (`OsPrng`, backed by `rand::rngs::OsRng`); anything implementing
/// this trait can be injected instead, e.g. a seeded PRNG for reproducible
/// tests.
pub trait Prng {
    fn next_u32(&mut self) -> u32;

    fn next_u64(&mut self) -> u64 {
        (self.next_u32() as u64) << 32 | self.next_u32() as u64
    }
}

/// Default `Prng` backed by the OS cryptographic source.
#[derive(Default)]
pub struct OsPrng;

impl Prng for OsPrng {
    fn next_u32(&mut self) -> u32 {
        OsRng.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        OsRng.next_u64()
    }
}

const TEA_DELTA: u32 = 0x9E37_79B9;
const TEA_CYCLES: u32 = 32;

/// Full 32-cycle TEA encryption of a 64-bit block under a 128-bit key.
fn tea_encrypt(mut v0: u32, mut v1: u32, key: &[u32; 4]) -> (u32, u32) {
    let mut sum: u32 = 0;
    for _ in 0..TEA_CYCLES {
        sum = sum.wrapping_add(TEA_DELTA);
        v0 = v0.wrapping_add(
            (v1 << 4)
                .wrapping_add(key[0])
                .wrapping_add(v1)
                .wrapping_add(sum)
                ^ (v1 >> 5).wrapping_add(key[1]),
        );
        v1 = v1.wrapping_add(
            (v0 << 4)
                .wrapping_add(key[2])
                .wrapping_add(v0)
                .wrapping_add(sum)
                ^ (v0 >> 5).wrapping_add(key[3]),
        );
    }
    (v0, v1)
}

const FEISTEL_ROUNDS: u8 = 8;

/// A deterministic, keyed bijection over `[0, 2^w)` for the smallest even
/// `w` spanning a configured range `[lo, hi]`, built from a balanced Feistel
/// network whose round function is TEA truncated to the half-width.
/// Out-of-range outputs are rejected by cycle-walking the step counter.
/// Used to emit a non-repeating sequence of UDP transaction IDs over a full
/// period.
pub struct Permutor {
    key: [u32; 4],
    /// Total bit width of the Feistel block (always even).
    width: u32,
    half_mask: u32,
    lo: u64,
    /// Number of distinct values in [lo, hi], i.e. hi - lo + 1.
    span: u64,
    /// Next raw counter value to try, in [0, 2^width).
    counter: u64,
}

impl Permutor {
    /// Build a permutor spanning the inclusive range `[lo, hi]`, keyed from
    /// `prng`.
    pub fn new(prng: &mut dyn Prng, lo: u64, hi: u64) -> Self {
        assert!(hi >= lo);
        let span = hi - lo + 1;

        // smallest even w with 2^w >= span
        let mut width = 0u32;
        while (1u64 << width) < span {
            width += 1;
        }
        if width % 2 != 0 {
            width += 1;
        }
        // minimum useful width is 2 so the Feistel halves are non-empty
        if width < 2 {
            width = 2;
        }

        let half = width / 2;
        let half_mask = if half >= 32 { u32::MAX } else { (1u32 << half) - 1 };

        let key = [prng.next_u32(), prng.next_u32(), prng.next_u32(), prng.next_u32()];
        let start = prng.next_u64() & ((1u64 << width) - 1);

        Permutor { key, width, half_mask, lo, span, counter: start }
    }

    fn round_func(&self, r: u32, round_idx: u8) -> u32 {
        let (a, _b) = tea_encrypt(r, round_idx as u32, &self.key);
        a & self.half_mask
    }

    fn permute(&self, x: u64) -> u64 {
        let half = self.width / 2;
        let mut l = (x >> half) as u32 & self.half_mask;
        let mut r = x as u32 & self.half_mask;

        for round in 0..FEISTEL_ROUNDS {
            let new_l = r;
            let new_r = l ^ self.round_func(r, round);
            l = new_l;
            r = new_r;
        }

        ((l as u64) << half) | r as u64
    }

    /// Yield the next value in the permuted sequence, mapped into `[lo,
    /// hi]`. Does not repeat a value until the full period (`hi - lo + 1`
    /// steps) elapses.
    pub fn step(&mut self) -> u64 {
        let modulus = 1u64 << self.width;
        loop {
            let x = self.counter;
            self.counter = (self.counter + 1) % modulus;

            let y = self.permute(x);
            if y < self.span {
                return self.lo + y;
            }
            // cycle-walk: y fell outside the configured span, try the next
            // counter value.
        }
    }
}

/// 256-entry S-box used by `shuffle8`. This is the (well-known, public)
/// AES S-box: a fixed byte-wise bijection, exactly the "pre-baked 256-entry
/// S-box" the shuffle needs, with no per-call construction cost.
#[rustfmt::skip]
const SBOX: [u8; 256] = [
    0x63, 0x7c, 0x77, 0x7b, 0xf2, 0x6b, 0x6f, 0xc5, 0x30, 0x01, 0x67, 0x2b, 0xfe, 0xd7, 0xab, 0x76,
    0xca, 0x82, 0xc9, 0x7d, 0xfa, 0x59, 0x47, 0xf0, 0xad, 0xd4, 0xa2, 0xaf, 0x9c, 0xa4, 0x72, 0xc0,
    0xb7, 0xfd, 0x93, 0x26, 0x36, 0x3f, 0xf7, 0xcc, 0x34, 0xa5, 0xe5, 0xf1, 0x71, 0xd8, 0x31, 0x15,
    0x04, 0xc7, 0x23, 0xc3, 0x18, 0x96, 0x05, 0x9a, 0x07, 0x12, 0x80, 0xe2, 0xeb, 0x27, 0xb2, 0x75,
    0x09, 0x83, 0x2c, 0x1a, 0x1b, 0x6e, 0x5a, 0xa0, 0x52, 0x3b, 0xd6, 0xb3, 0x29, 0xe3, 0x2f, 0x84,
    0x53, 0xd1, 0x00, 0xed, 0x20, 0xfc, 0xb1, 0x5b, 0x6a, 0xcb, 0xbe, 0x39, 0x4a, 0x4c, 0x58, 0xcf,
    0xd0, 0xef, 0xaa, 0xfb, 0x43, 0x4d, 0x33, 0x85, 0x45, 0xf9, 0x02, 0x7f, 0x50, 0x3c, 0x9f, 0xa8,
    0x51, 0xa3, 0x40, 0x8f, 0x92, 0x9d, 0x38, 0xf5, 0xbc, 0xb6, 0xda, 0x21, 0x10, 0xff, 0xf3, 0xd2,
    0xcd, 0x0c, 0x13, 0xec, 0x5f, 0x97, 0x44, 0x17, 0xc4, 0xa7, 0x7e, 0x3d, 0x64, 0x5d, 0x19, 0x73,
    0x60, 0x81, 0x4f, 0xdc, 0x22, 0x2a, 0x90, 0x88, 0x46, 0xee, 0xb8, 0x14, 0xde, 0x5e, 0x0b, 0xdb,
    0xe0, 0x32, 0x3a, 0x0a, 0x49, 0x06, 0x24, 0x5c, 0xc2, 0xd3, 0xac, 0x62, 0x91, 0x95, 0xe4, 0x79,
    0xe7, 0xc8, 0x37, 0x6d, 0x8d, 0xd5, 0x4e, 0xa9, 0x6c, 0x56, 0xf4, 0xea, 0x65, 0x7a, 0xae, 0x08,
    0xba, 0x78, 0x25, 0x2e, 0x1c, 0xa6, 0xb4, 0xc6, 0xe8, 0xdd, 0x74, 0x1f, 0x4b, 0xbd, 0x8b, 0x8a,
    0x70, 0x3e, 0xb5, 0x66, 0x48, 0x03, 0xf6, 0x0e, 0x61, 0x35, 0x57, 0xb9, 0x86, 0xc1, 0x1d, 0x9e,
    0xe1, 0xf8, 0x98, 0x11, 0x69, 0xd9, 0x8e, 0x94, 0x9b, 0x1e, 0x87, 0xe9, 0xce, 0x55, 0x28, 0xdf,
    0x8c, 0xa1, 0x89, 0x0d, 0xbf, 0xe6, 0x42, 0x68, 0x41, 0x99, 0x2d, 0x0f, 0xb0, 0x54, 0xbb, 0x16,
];

/// Permute the low byte of `i` through a fixed 256-entry S-box, offset by
/// `seed`. A cheap randomizer for RR-set and nameserver iteration order —
/// deliberately not cryptographic, just well-mixed.
pub fn shuffle8(i: u8, seed: u8) -> u8 {
    SBOX[seed.wrapping_add(i) as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Lcg(u64);
    impl Prng for Lcg {
        fn next_u32(&mut self) -> u32 {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1);
            (self.0 >> 32) as u32
        }
    }

    #[test]
    fn permutor_covers_full_range_exactly_once() {
        let mut seed = Lcg(42);
        let mut p = Permutor::new(&mut seed, 0, 255);

        let mut seen = [false; 256];
        for _ in 0..256 {
            let v = p.step();
            assert!(v <= 255);
            assert!(!seen[v as usize], "value {} repeated before full period", v);
            seen[v as usize] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn permutor_respects_arbitrary_bounds() {
        let mut seed = Lcg(7);
        let mut p = Permutor::new(&mut seed, 1000, 1019);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..20 {
            let v = p.step();
            assert!((1000..=1019).contains(&v));
            assert!(seen.insert(v), "value {} repeated before full period", v);
        }
    }

    #[test]
    fn transaction_id_permutor_over_full_16_bit_space() {
        let mut seed = Lcg(99);
        let mut p = Permutor::new(&mut seed, 0, 65535);
        let mut seen = std::collections::HashSet::new();
        // spot-check a sizeable prefix rather than all 65536 steps
        for _ in 0..4096 {
            let v = p.step();
            assert!(v <= 65535);
            assert!(seen.insert(v));
        }
    }

    #[test]
    fn shuffle8_is_a_bijection() {
        let mut seen = [false; 256];
        for i in 0..=255u8 {
            let s = shuffle8(i, 13);
            assert!(!seen[s as usize]);
            seen[s as usize] = true;
        }
    }
}

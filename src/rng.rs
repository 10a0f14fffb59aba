#![forbid(unsafe_code)]

use crate::entropy::EntropyProvider;
use crate::error::Error;
use crate::isaac::IsaacEngine;

/// The engine emits 32-bit words, so sampling ranges top out at 2^32.
const MAX_RANGE: u64 = 1 << 32;

/// Construction options for [`SecureRng`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Options {
    /// Seed width in bits. Must be a power of two in `64..=8192`.
    pub bits: u32,
    /// Skip entropy sources that may block the caller.
    pub nonblocking: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            bits: 256,
            nonblocking: true,
        }
    }
}

/// A handle producing cryptographically-suitable pseudo-random output.
///
/// The handle seeds itself exactly once, at construction, from the best
/// available platform entropy source (see
/// [`EntropyProvider`](crate::EntropyProvider)), and afterwards draws
/// everything from its own [`IsaacEngine`](crate::IsaacEngine). It can be
/// asked for raw bytes, hexadecimal strings, 32-bit integers, or uniformly
/// sampled characters from a caller-supplied alphabet.
///
/// Every drawing operation mutates the engine, so a handle must not be
/// shared across threads without external synchronization; construct one
/// handle per thread instead. Handles built before a `fork` must not be
/// used in both processes, or both will emit the same stream.
pub struct SecureRng {
    bits: u32,
    engine: IsaacEngine,
}

impl SecureRng {
    /// Creates a handle with default options: a 256-bit seed from a
    /// non-blocking entropy source.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoEntropySource`] or [`Error::EntropyReadError`]
    /// if seeding fails.
    pub fn new() -> Result<Self, Error> {
        Self::with_options(Options::default())
    }

    /// Creates a handle with explicit options.
    ///
    /// An [`EntropyProvider`] is constructed, asked for `bits/32` seed
    /// words, and released again before this function returns.
    ///
    /// # Arguments
    ///
    /// * `options`: Seed width and blocking policy
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOption`] if `bits` is not a power of two in
    /// `64..=8192`, and [`Error::NoEntropySource`] or
    /// [`Error::EntropyReadError`] if seeding fails.
    pub fn with_options(options: Options) -> Result<Self, Error> {
        if !valid_bits(options.bits) {
            return Err(Error::InvalidOption(options.bits));
        }
        let provider = EntropyProvider::new(options.nonblocking)?;
        log::debug!(
            "seeding {} bits from {}",
            options.bits,
            provider.name()
        );
        let seed = provider.random_words(options.bits as usize / 32)?;
        Ok(Self {
            bits: options.bits,
            engine: IsaacEngine::new(&seed)?,
        })
    }

    /// Creates a handle from an explicit seed instead of platform entropy.
    ///
    /// Two handles built from the same seed produce identical output, so
    /// this is only suitable where reproducibility is wanted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSeed`] if the seed exceeds 256 words.
    pub fn from_seed(seed: &[u32]) -> Result<Self, Error> {
        Ok(Self {
            bits: (seed.len() * 32) as u32,
            engine: IsaacEngine::new(seed)?,
        })
    }

    /// The seed width declared at construction, in bits.
    #[must_use]
    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Produces the next raw 32-bit engine output.
    #[inline]
    pub fn irand(&mut self) -> u32 {
        self.engine.next_u32()
    }

    /// Produces exactly `n` random bytes.
    ///
    /// Full 32-bit outputs are packed little-endian four bytes at a time.
    /// A two-byte tail carves the middle 16 bits of one extra output, and a
    /// final single byte takes the low 8 bits of another; this matches the
    /// historical wire layout of the byte stream.
    pub fn bytes(&mut self, n: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(n);
        let mut remaining = n;
        while remaining >= 4 {
            out.extend_from_slice(&self.irand().to_le_bytes());
            remaining -= 4;
        }
        if remaining >= 2 {
            #[allow(clippy::cast_possible_truncation)]
            let tail = ((self.irand() >> 8) & 0xFFFF) as u16;
            out.extend_from_slice(&tail.to_le_bytes());
            remaining -= 2;
        }
        if remaining == 1 {
            #[allow(clippy::cast_possible_truncation)]
            out.push((self.irand() & 0xFF) as u8);
        }
        out
    }

    /// Produces `2 * n` lowercase hexadecimal digits encoding
    /// [`bytes(n)`](Self::bytes), without a prefix.
    pub fn bytes_hex(&mut self, n: usize) -> String {
        const DIGITS: &[u8; 16] = b"0123456789abcdef";
        let mut hex = String::with_capacity(2 * n);
        for byte in self.bytes(n) {
            hex.push(DIGITS[(byte >> 4) as usize] as char);
            hex.push(DIGITS[(byte & 0xF) as usize] as char);
        }
        hex
    }

    /// Produces `n` octets, each an independent uniform sample from `bag`.
    ///
    /// # Arguments
    ///
    /// * `bag`: The alphabet to sample from; duplicates weight a character
    ///   accordingly
    /// * `n`: The number of samples
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyBag`] if `bag` is empty.
    pub fn string_from(&mut self, bag: &[u8], n: usize) -> Result<Vec<u8>, Error> {
        if bag.is_empty() {
            return Err(Error::EmptyBag);
        }
        let positions = self.ranged_randoms(bag.len() as u64, n)?;
        Ok(positions
            .into_iter()
            .map(|position| bag[position as usize])
            .collect())
    }

    /// Shuffles the elements of a slice with an unbiased permutation.
    ///
    /// This is the forward version of the Fisher-Yates shuffle
    /// (<https://en.wikipedia.org/wiki/Fisher–Yates_shuffle>), built on the
    /// same rejection sampler as [`string_from`](Self::string_from).
    ///
    /// # Errors
    ///
    /// Returns [`Error::RangeTooLarge`] for slices longer than 2^32
    /// elements.
    pub fn shuffle<T>(&mut self, target: &mut [T]) -> Result<(), Error> {
        if target.is_empty() {
            return Ok(());
        }
        for inx in 0..target.len() - 1 {
            // "inx" stays in the candidate span so the current element can
            // swap with itself.
            let span = (target.len() - inx) as u64;
            let offset = self.ranged_randoms(span, 1)?[0] as usize;
            target.swap(inx, inx + offset);
        }
        Ok(())
    }

    /// Draws `count` uniform values in `[0, range)` by rejection sampling.
    ///
    /// Reducing `irand` modulo a power of two keeps every residue equally
    /// likely, and draws at or above `range` are rejected rather than
    /// folded back, so no value is favored.
    fn ranged_randoms(&mut self, range: u64, count: usize) -> Result<Vec<u32>, Error> {
        let divisor = closest_divisor(range)?;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            let mut draw = u64::from(self.irand()) % divisor;
            while draw >= range {
                draw = u64::from(self.irand()) % divisor;
            }
            #[allow(clippy::cast_possible_truncation)]
            out.push(draw as u32);
        }
        Ok(out)
    }
}

fn valid_bits(bits: u32) -> bool {
    (64..=8192).contains(&bits) && bits.is_power_of_two()
}

/// The smallest power of two in `[1, 2^32]` that covers `range`.
fn closest_divisor(range: u64) -> Result<u64, Error> {
    if range > MAX_RANGE {
        return Err(Error::RangeTooLarge(range));
    }
    assert!(range > 0, "range must be positive");
    let mut divisor = 0_u64;
    let mut exponent = 0_u32;
    while exponent <= 32 && divisor < range {
        divisor = 1 << exponent;
        exponent += 1;
    }
    Ok(divisor)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(seed: &[u32]) -> SecureRng {
        SecureRng::from_seed(seed).unwrap()
    }

    #[test]
    fn test_bytes_hex_reference() {
        // The little-endian encoding of the first two engine outputs for
        // this seed.
        let mut rng = seeded(&[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(rng.bytes_hex(8), "26629523bfcee1a9");
    }

    #[test]
    fn test_bytes_hex_matches_engine_outputs() {
        let seed = [1, 2, 3, 4, 5, 6, 7, 8];
        let mut engine = crate::IsaacEngine::new(&seed).unwrap();
        let mut expected = String::new();
        for _ in 0..2 {
            for byte in engine.next_u32().to_le_bytes() {
                expected.push_str(&format!("{byte:02x}"));
            }
        }
        assert_eq!(seeded(&seed).bytes_hex(8), expected);
    }

    #[test]
    fn test_bytes_chunk_order() {
        // 4-byte words first, then the middle-16-bit carve, then the low
        // byte of one more output.
        assert_eq!(
            seeded(&[1, 2, 3, 4, 5, 6, 7, 8]).bytes(7),
            vec![38, 98, 149, 35, 206, 225, 235]
        );
        assert_eq!(seeded(&[1, 2, 3, 4, 5, 6, 7, 8]).bytes(3), vec![98, 149, 191]);
        assert_eq!(seeded(&[1, 2, 3, 4, 5, 6, 7, 8]).bytes(2), vec![98, 149]);
        assert_eq!(seeded(&[1, 2, 3, 4, 5, 6, 7, 8]).bytes(1), vec![38]);
        assert!(seeded(&[1, 2, 3, 4, 5, 6, 7, 8]).bytes(0).is_empty());
    }

    #[test]
    fn test_bytes_length_is_exact() {
        let mut rng = seeded(&[7]);
        for n in 0..64 {
            assert_eq!(rng.bytes(n).len(), n);
        }
    }

    #[test]
    fn test_bytes_hex_length_and_alphabet() {
        let mut rng = seeded(&[7]);
        for n in 0..32 {
            let hex = rng.bytes_hex(n);
            assert_eq!(hex.len(), 2 * n);
            assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
        }
    }

    #[test]
    fn test_string_from_closure_and_distribution() {
        let mut rng = seeded(&[42]);
        let sample = rng.string_from(b"abc", 1000).unwrap();
        assert_eq!(sample.len(), 1000);
        assert!(sample.iter().all(|c| b"abc".contains(c)));
        let counts: Vec<usize> = b"abc"
            .iter()
            .map(|c| sample.iter().filter(|s| s == &c).count())
            .collect();
        assert_eq!(counts, vec![328, 334, 338]);
        assert!(counts.iter().all(|count| *count >= 200));
    }

    #[test]
    fn test_string_from_single_character_bag() {
        let mut rng = seeded(&[42]);
        assert_eq!(rng.string_from(b"x", 16).unwrap(), vec![b'x'; 16]);
    }

    #[test]
    fn test_empty_bag_is_rejected() {
        let mut rng = seeded(&[42]);
        assert!(matches!(rng.string_from(b"", 5), Err(Error::EmptyBag)));
        // The engine is still usable afterwards.
        assert_eq!(rng.string_from(b"a", 1).unwrap(), vec![b'a']);
    }

    #[test]
    fn test_ranged_randoms_are_uniform() {
        // Pinned histogram of 30000 draws in [0, 10); every bucket is
        // within 3% of the expected 3000.
        let mut rng = seeded(&[42]);
        let draws = rng.ranged_randoms(10, 30000).unwrap();
        let mut histogram = [0_usize; 10];
        for draw in draws {
            histogram[draw as usize] += 1;
        }
        assert_eq!(
            histogram,
            [3019, 2964, 3041, 2962, 2957, 2958, 2994, 3083, 3017, 3005]
        );
    }

    #[test]
    fn test_full_width_range_accepts_every_output() {
        let mut rng = seeded(&[42]);
        // With range = 2^32 the divisor equals the output space and no
        // draw is ever rejected.
        let draws = rng.ranged_randoms(MAX_RANGE, 3).unwrap();
        let mut reference = seeded(&[42]);
        for draw in draws {
            assert_eq!(draw, reference.irand());
        }
    }

    #[test]
    fn test_range_too_large_is_rejected() {
        let mut rng = seeded(&[42]);
        assert!(matches!(
            rng.ranged_randoms(MAX_RANGE + 1, 1),
            Err(Error::RangeTooLarge(_))
        ));
    }

    #[test]
    fn test_divisor_selection() {
        for (range, expected) in [
            (1, 1),
            (2, 2),
            (3, 4),
            (4, 4),
            (5, 8),
            (255, 256),
            (256, 256),
            (257, 512),
            (MAX_RANGE, MAX_RANGE),
        ] {
            assert_eq!(closest_divisor(range).unwrap(), expected, "range {range}");
        }
        for range in 2..=4096 {
            let divisor = closest_divisor(range).unwrap();
            assert!(divisor.is_power_of_two());
            assert!(divisor >= range);
            assert!(divisor / 2 < range);
        }
    }

    #[test]
    fn test_shuffle_reference_permutation() {
        let mut rng = seeded(&[42]);
        let mut numbers = vec![1, 2, 3, 4, 5];
        rng.shuffle(&mut numbers).unwrap();
        assert_eq!(numbers, vec![3, 4, 2, 5, 1]);
    }

    #[test]
    fn test_shuffle_empty_slice() {
        let mut rng = seeded(&[42]);
        let mut empty: Vec<u8> = vec![];
        rng.shuffle(&mut empty).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_shuffle_keeps_all_elements() {
        let mut rng = seeded(&[7]);
        let mut numbers: Vec<u32> = (0..100).collect();
        rng.shuffle(&mut numbers).unwrap();
        let mut sorted = numbers.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..100).collect::<Vec<_>>());
        assert_ne!(numbers, sorted);
    }

    #[test]
    fn test_valid_bits_table() {
        let valid = [64, 128, 256, 512, 1024, 2048, 4096, 8192];
        for bits in 0..=10000 {
            assert_eq!(valid_bits(bits), valid.contains(&bits), "bits {bits}");
        }
    }

    #[test]
    fn test_invalid_bits_option_is_rejected() {
        let options = Options {
            bits: 100,
            ..Options::default()
        };
        assert!(matches!(
            SecureRng::with_options(options),
            Err(Error::InvalidOption(100))
        ));
    }

    #[test]
    fn test_construction_with_valid_bits() {
        let options = Options {
            bits: 128,
            ..Options::default()
        };
        let rng = SecureRng::with_options(options).unwrap();
        assert_eq!(rng.bits(), 128);
    }

    #[test]
    fn test_default_options() {
        assert_eq!(
            Options::default(),
            Options {
                bits: 256,
                nonblocking: true
            }
        );
    }

    #[test]
    fn test_entropy_seeded_handles_differ() {
        let mut first = SecureRng::new().unwrap();
        let mut second = SecureRng::new().unwrap();
        let outputs: Vec<u32> = (0..4).map(|_| first.irand()).collect();
        assert_ne!(outputs, (0..4).map(|_| second.irand()).collect::<Vec<_>>());
    }
}

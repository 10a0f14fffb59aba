//! A small library producing cryptographically-suitable pseudo-random
//! bytes from a seeded ISAAC stream generator.
//!
//! [`SecureRng`] is the user-facing handle. It seeds itself once, at
//! construction, from the best available platform entropy source and then
//! produces raw bytes, hexadecimal strings, 32-bit integers and uniformly
//! sampled characters from a caller-supplied alphabet:
//!
//! ```no_run
//! let mut rng = isaacrand::SecureRng::new()?;
//! let token = rng.bytes_hex(16);
//! let pin = rng.string_from(b"0123456789", 6)?;
//! # Ok::<(), isaacrand::Error>(())
//! ```
//!
//! [`IsaacEngine`] and [`EntropyProvider`] are exposed for callers that
//! need the stream generator or the entropy selection layer directly.

mod entropy;
mod error;
mod isaac;
mod rng;

pub use entropy::EntropyProvider;
pub use error::Error;
pub use isaac::IsaacEngine;
pub use rng::{Options, SecureRng};

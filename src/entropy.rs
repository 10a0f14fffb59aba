#![forbid(unsafe_code)]

#[cfg(unix)]
use std::fs::File;
#[cfg(unix)]
use std::io::{Read, Write};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
#[cfg(unix)]
use std::time::Duration;

use crate::error::Error;

/// Well-known rendezvous points for entropy gathering daemons.
#[cfg(unix)]
const EGD_SOCKETS: [&str; 4] = [
    "/var/run/egd-pool",
    "/dev/egd-pool",
    "/etc/egd-pool",
    "/etc/entropy",
];

/// An EGD daemon that does not answer within this window is skipped.
#[cfg(unix)]
const EGD_TIMEOUT: Duration = Duration::from_secs(1);

/// The platform entropy layer used to seed [`SecureRng`](crate::SecureRng).
///
/// Construction probes a fixed list of candidate sources in priority order
/// and pins the first one that works:
///
/// 1. the OS cryptographic API (via the `getrandom` crate),
/// 2. an entropy gathering daemon on one of the well-known unix sockets,
/// 3. the non-blocking kernel device `/dev/urandom`,
/// 4. the blocking kernel device `/dev/random`.
///
/// With `nonblocking` set, sources that may block the caller (EGD and
/// `/dev/random` on everything but FreeBSD) are not considered. A provider
/// is meant to be used once and dropped; device handles are opened per read
/// and released before the read returns.
pub struct EntropyProvider {
    source: Source,
}

enum Source {
    /// OS cryptographic API.
    Os,
    /// Entropy gathering daemon behind a unix socket.
    #[cfg(unix)]
    Egd(&'static str),
    /// Non-blocking kernel pool device.
    #[cfg(unix)]
    DevUrandom,
    /// Blocking kernel pool device.
    #[cfg(unix)]
    DevRandom,
}

impl EntropyProvider {
    /// Probes the candidate sources and pins the first usable one.
    ///
    /// # Arguments
    ///
    /// * `nonblocking`: Skip sources that may block the caller
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoEntropySource`] if every candidate fails probing.
    pub fn new(nonblocking: bool) -> Result<Self, Error> {
        match probe_os() {
            Ok(()) => return Ok(Self { source: Source::Os }),
            Err(e) => log::debug!("os entropy api unavailable: {e}"),
        }
        #[cfg(unix)]
        {
            if !nonblocking {
                for path in EGD_SOCKETS {
                    match egd_available(path) {
                        Ok(()) => {
                            return Ok(Self {
                                source: Source::Egd(path),
                            })
                        }
                        Err(e) => log::debug!("egd socket {path} unavailable: {e}"),
                    }
                }
            }
            match probe_device("/dev/urandom") {
                Ok(()) => {
                    return Ok(Self {
                        source: Source::DevUrandom,
                    })
                }
                Err(e) => log::debug!("/dev/urandom unavailable: {e}"),
            }
            // FreeBSD's /dev/random never blocks; everywhere else it only
            // qualifies when the caller accepts blocking reads.
            if !nonblocking || cfg!(target_os = "freebsd") {
                match probe_device("/dev/random") {
                    Ok(()) => {
                        return Ok(Self {
                            source: Source::DevRandom,
                        })
                    }
                    Err(e) => log::debug!("/dev/random unavailable: {e}"),
                }
            }
        }
        #[cfg(not(unix))]
        let _ = nonblocking;
        Err(Error::NoEntropySource)
    }

    /// The name of the pinned source.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self.source {
            Source::Os => "os-random",
            #[cfg(unix)]
            Source::Egd(path) => path,
            #[cfg(unix)]
            Source::DevUrandom => "/dev/urandom",
            #[cfg(unix)]
            Source::DevRandom => "/dev/random",
        }
    }

    /// Whether reads from the pinned source may block the caller.
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        match self.source {
            Source::Os => false,
            #[cfg(unix)]
            Source::Egd(_) => true,
            #[cfg(unix)]
            Source::DevUrandom => false,
            #[cfg(unix)]
            Source::DevRandom => !cfg!(target_os = "freebsd"),
        }
    }

    /// Whether the pinned source is classified as a strong entropy source.
    #[must_use]
    pub fn is_strong(&self) -> bool {
        match self.source {
            Source::Os => true,
            #[cfg(unix)]
            Source::Egd(_) => true,
            #[cfg(unix)]
            Source::DevUrandom => false,
            #[cfg(unix)]
            Source::DevRandom => true,
        }
    }

    /// Reads `n` uniformly distributed words from the pinned source.
    ///
    /// The raw byte stream is decoded little-endian, so a given stream
    /// always produces the same seed words regardless of host order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EntropyReadError`] on I/O failure or short read.
    pub fn random_words(&self, n: usize) -> Result<Vec<u32>, Error> {
        let mut raw = vec![0_u8; n * 4];
        match self.source {
            Source::Os => read_os(&mut raw)?,
            #[cfg(unix)]
            Source::Egd(path) => read_egd(path, &mut raw)?,
            #[cfg(unix)]
            Source::DevUrandom => read_device("/dev/urandom", &mut raw)?,
            #[cfg(unix)]
            Source::DevRandom => read_device("/dev/random", &mut raw)?,
        }
        Ok(words_from_bytes(&raw))
    }
}

fn words_from_bytes(raw: &[u8]) -> Vec<u32> {
    raw.chunks_exact(4)
        .map(|chunk| u32::from_le_bytes(chunk.try_into().unwrap()))
        .collect()
}

fn probe_os() -> Result<(), getrandom::Error> {
    let mut probe = [0_u8; 4];
    getrandom::fill(&mut probe)
}

fn read_os(destination: &mut [u8]) -> Result<(), Error> {
    getrandom::fill(destination).map_err(|cause| Error::EntropyReadError {
        device: "os-random",
        cause: std::io::Error::other(cause),
    })
}

#[cfg(unix)]
fn probe_device(path: &'static str) -> std::io::Result<()> {
    File::open(path).map(|_| ())
}

#[cfg(unix)]
fn read_device(path: &'static str, destination: &mut [u8]) -> Result<(), Error> {
    // read_exact loops until the buffer is full and reports EOF as an
    // error, which covers the short-read case. The handle is released on
    // every path when the File drops.
    File::open(path)
        .and_then(|mut device| device.read_exact(destination))
        .map_err(|cause| Error::EntropyReadError { device: path, cause })
}

/// Asks the daemon how much entropy it has buffered. Any well-formed
/// reply qualifies the socket; the count itself is not interesting.
#[cfg(unix)]
fn egd_available(path: &str) -> std::io::Result<()> {
    let mut stream = connect_egd(path)?;
    stream.write_all(&[0x00])?;
    let mut reply = [0_u8; 4];
    stream.read_exact(&mut reply)?;
    let _available_bits = u32::from_be_bytes(reply);
    Ok(())
}

#[cfg(unix)]
fn read_egd(path: &'static str, destination: &mut [u8]) -> Result<(), Error> {
    egd_read_exact(path, destination).map_err(|cause| Error::EntropyReadError { device: path, cause })
}

#[cfg(unix)]
fn egd_read_exact(path: &str, destination: &mut [u8]) -> std::io::Result<()> {
    let mut stream = connect_egd(path)?;
    for chunk in destination.chunks_mut(255) {
        // 0x02 is the blocking read command; the daemon answers with
        // exactly the requested number of bytes.
        #[allow(clippy::cast_possible_truncation)]
        stream.write_all(&[0x02, chunk.len() as u8])?;
        stream.read_exact(chunk)?;
    }
    Ok(())
}

#[cfg(unix)]
fn connect_egd(path: &str) -> std::io::Result<UnixStream> {
    let stream = UnixStream::connect(path)?;
    stream.set_read_timeout(Some(EGD_TIMEOUT))?;
    stream.set_write_timeout(Some(EGD_TIMEOUT))?;
    Ok(stream)
}

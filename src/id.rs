//! 128-bit sortable identifiers.
//!
//! Every node, leaf page, tuple, batch, and transaction in spheredb is named
//! by a [`SphereId`]: a 128-bit value whose upper 48 bits hold the wall-clock
//! millisecond of issuance and whose lower 80 bits are random. The total order
//! over ids is therefore (approximately) insertion-time order, which the tree
//! engine relies on to find the "oldest" leaf cheaply.

use crate::errors::{ErrorKind, SphereError, SphereResult};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::Rng;
use std::fmt;
use std::sync::LazyLock;
use std::time::{SystemTime, UNIX_EPOCH};

const RANDOM_BITS: u32 = 80;
const RANDOM_MASK: u128 = (1u128 << RANDOM_BITS) - 1;

static ID_GENERATOR: LazyLock<SphereIdGenerator> = LazyLock::new(SphereIdGenerator::new);

/// A unique, sortable, time-seeded 128-bit identifier.
///
/// Ids are opaque to the tree engine except for ordering and binary
/// round-tripping. The text form is url-safe base64 without padding.
///
/// # Examples
///
/// ```rust
/// use spheredb::id::SphereId;
///
/// let a = SphereId::new();
/// let b = SphereId::new();
/// assert!(a < b);
/// assert_eq!(a, SphereId::from_bytes(a.to_bytes()));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SphereId(u128);

impl SphereId {
    /// Draws a fresh id from the process-wide generator.
    ///
    /// Ids issued by one process are strictly increasing and never repeat.
    pub fn new() -> SphereId {
        SphereId(ID_GENERATOR.next_raw())
    }

    /// Rebuilds an id from its big-endian 16-byte encoding.
    pub fn from_bytes(bytes: [u8; 16]) -> SphereId {
        SphereId(u128::from_be_bytes(bytes))
    }

    /// The big-endian 16-byte encoding of this id.
    pub fn to_bytes(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }

    /// Parses the url-safe base64 text form produced by [`SphereId::as_base64`].
    pub fn parse(text: &str) -> SphereResult<SphereId> {
        let decoded = URL_SAFE_NO_PAD.decode(text).map_err(|err| {
            SphereError::new(&format!("Not a valid id: {}", err), ErrorKind::Misuse)
        })?;
        let bytes: [u8; 16] = decoded
            .try_into()
            .map_err(|_| SphereError::new("An id must be exactly 16 bytes", ErrorKind::Misuse))?;
        Ok(SphereId::from_bytes(bytes))
    }

    /// The url-safe base64 (no padding) text form of this id.
    pub fn as_base64(self) -> String {
        URL_SAFE_NO_PAD.encode(self.to_bytes())
    }

    /// The wall-clock millisecond embedded in the upper bits of this id.
    pub fn timestamp_millis(self) -> u64 {
        (self.0 >> RANDOM_BITS) as u64
    }
}

impl Default for SphereId {
    fn default() -> Self {
        SphereId::new()
    }
}

impl fmt::Display for SphereId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_base64())
    }
}

impl fmt::Debug for SphereId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SphereId({})", self.as_base64())
    }
}

/// Process-wide id issuer.
///
/// Issuance is guarded by a mutex so the "strictly increasing, never equal"
/// guarantee holds even under concurrent callers. When the clock stalls inside
/// one millisecond (or moves backwards) the generator bumps forward from the
/// last issued value instead of sleeping.
struct SphereIdGenerator {
    last_issued: Mutex<u128>,
}

impl SphereIdGenerator {
    fn new() -> Self {
        SphereIdGenerator {
            last_issued: Mutex::new(0),
        }
    }

    fn next_raw(&self) -> u128 {
        let mut last = self.last_issued.lock();

        let millis = current_time_millis() as u128;
        let candidate = (millis << RANDOM_BITS) | (OsRng.gen::<u128>() & RANDOM_MASK);

        let issued = if candidate <= *last { *last + 1 } else { candidate };
        *last = issued;
        issued
    }
}

/// Milliseconds since the unix epoch, or 0 when the clock is broken.
pub(crate) fn current_time_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

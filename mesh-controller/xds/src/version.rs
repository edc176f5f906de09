use parking_lot::Mutex;

/// Assigns versions and nonces to the responses of a single resource kind.
///
/// Versions start at zero and only ever increase for the lifetime of the
/// process. A version is only consumed once a response has been fully built,
/// so a failed synthesis pass never advances it.
#[derive(Debug, Default)]
pub struct ResponseVersions {
    last: Mutex<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stamp {
    pub version: u64,
    pub nonce: String,
}

// === impl ResponseVersions ===

impl ResponseVersions {
    /// The version of the most recently stamped response.
    pub fn current(&self) -> u64 {
        *self.last.lock()
    }

    /// Advances the version and derives a nonce for it.
    ///
    /// The nonce combines the version with a random salt so that it remains
    /// unique even if versions were to be reused by another process.
    pub fn next(&self) -> Stamp {
        let mut last = self.last.lock();
        *last += 1;
        let version = *last;
        Stamp {
            version,
            nonce: format!("{:x}-{:016x}", version, rand::random::<u64>()),
        }
    }
}

//! Random identifiers for session ids and relogin keys.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::Rng;

/// Bytes of entropy per identifier (192 bits).
const ID_BYTES: usize = 24;

/// Generates a random, base64-encoded identifier (32 characters).
///
/// Collisions between live ids are not checked for: at 192 bits the
/// probability is negligible for any realistic number of sessions.
pub fn generate_id() -> String {
    let mut bytes = [0u8; ID_BYTES];
    rand::rng().fill(&mut bytes[..]);
    STANDARD.encode(bytes)
}

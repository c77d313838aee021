//! Peer ids for the voice signaling broker.
//!
//! The broker only accepts ASCII alphanumerics, and ids must not collide
//! between a player's tabs or rejoins. An id is the sanitized room id and
//! name followed by a base-36 millisecond timestamp and six random base-36
//! characters.

use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

/// Longest sanitized part kept from the room id or the name.
const PART_MAX_LEN: usize = 10;

/// Random suffix length.
const SUFFIX_LEN: usize = 6;

/// Prefix used when the room id or the name sanitizes to nothing.
pub const FALLBACK_PREFIX: &str = "peer";

/// Lowercase ASCII alphanumerics of `input`, at most ten of them.
pub fn sanitize(input: &str) -> String {
    input
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .take(PART_MAX_LEN)
        .collect()
}

/// Lowercase base-36 rendering of `value`.
pub fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        let digit = usize::try_from(value % 36).unwrap_or(0);
        out.push(DIGITS.get(digit).copied().unwrap_or(b'0'));
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// Build a peer id from explicit inputs.
///
/// ```
/// use escape_sync_client::voice::identity::derive_peer_id;
///
/// let id = derive_peer_id("Room-42!", "Zoé Martin", 35, 0);
/// assert_eq!(id, "room42zomartinz000000");
/// assert_eq!(derive_peer_id("", "Zoé", 35, 1), "peerz000001");
/// ```
pub fn derive_peer_id(room_id: &str, name: &str, now_ms: u64, entropy: u64) -> String {
    let room = sanitize(room_id);
    let player = sanitize(name);
    let stamp = to_base36(now_ms);
    let suffix = random_suffix(entropy);

    if room.is_empty() || player.is_empty() {
        format!("{FALLBACK_PREFIX}{stamp}{suffix}")
    } else {
        format!("{room}{player}{stamp}{suffix}")
    }
}

/// Build a fresh peer id from the wall clock and a random value.
pub fn generate_peer_id(room_id: &str, name: &str) -> String {
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default();
    let (high, _) = Uuid::new_v4().as_u64_pair();
    derive_peer_id(room_id, name, now_ms, high)
}

fn random_suffix(entropy: u64) -> String {
    // 36^6
    const SPACE: u64 = 2_176_782_336;
    format!("{:0>width$}", to_base36(entropy % SPACE), width = SUFFIX_LEN)
}

use rand::RngExt;

/// Length of a join code: short enough to read out loud, long enough to
/// make collisions rare among live rooms.
pub const ROOM_CODE_LENGTH: usize = 6;

const CODE_CHARS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Generate a 6-character alphanumeric join code (A-Z, 0-9).
/// Uppercase only so codes survive being typed or spoken.
pub fn generate_room_code() -> String {
    let mut rng = rand::rng();
    (0..ROOM_CODE_LENGTH)
        .map(|_| {
            let idx = rng.random_range(0..CODE_CHARS.len());
            // SAFETY: `idx` is produced by `random_range(0..len)`, so it is
            // always within [0, len).
            #[allow(clippy::indexing_slicing)]
            let ch = CODE_CHARS[idx] as char;
            ch
        })
        .collect()
}

/// Normalize a client-supplied code: codes are matched case-insensitively
/// and stored uppercase.
pub fn normalize_room_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Check that a normalized code has the expected shape.
pub fn is_valid_room_code(code: &str) -> bool {
    code.len() == ROOM_CODE_LENGTH
        && code
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

use rand::Rng;

const CODE_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Random upper-case alphanumeric code of `size` characters.
pub fn random_code(size: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..size)
        .map(|_| CODE_CHARS[rng.gen_range(0..CODE_CHARS.len())] as char)
        .collect()
}

/// Codes are entered by customers, so only letters, digits, `-` and `_` are allowed.
pub fn is_valid_code(code: &str) -> bool {
    !code.is_empty()
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

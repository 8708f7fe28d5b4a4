use rand::RngCore;

const ACCESS_TOKEN_BYTES: usize = 32;

/// Draws a fresh opaque access token, rendered as lowercase hex.
pub(crate) fn random_access_token() -> String {
    let mut raw = [0u8; ACCESS_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut raw);
    hex::encode(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_hex_and_unique() {
        let token = random_access_token();
        assert_eq!(token.len(), ACCESS_TOKEN_BYTES * 2);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));

        assert_ne!(token, random_access_token());
    }
}

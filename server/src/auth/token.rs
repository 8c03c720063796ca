use rand::Rng;

/// Length of a session token in bytes before hex encoding.
pub const TOKEN_BYTES: usize = 32;

/// Generate a session token: 32 bytes from the thread-local CSPRNG, hex-encoded.
pub fn generate_token() -> String {
    let bytes: [u8; TOKEN_BYTES] = rand::rng().random();
    hex::encode(bytes)
}

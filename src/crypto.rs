use base64::{Engine as _, engine::general_purpose};
use rand::{Rng, thread_rng};

/// Generates the bearer token embedded in the approve/reject links for a
/// battle request.
///
/// The token is formatted as `brq-{base64url_encoded_random_bytes}` where the
/// random bytes are 32 bytes (256 bits) of cryptographically secure random
/// data. Possession of the token is the only credential needed to change the
/// request's status, so it must not be derivable from the request id, email,
/// or any other visible attribute.
///
/// # Returns
///
/// A string in the format `brq-{43_character_base64url_string}`
pub fn generate_request_token() -> String {
    // Generate 32 bytes (256 bits) of cryptographically secure random data
    let mut token_bytes = [0u8; 32];
    thread_rng().fill(&mut token_bytes);

    format!("brq-{}", general_purpose::URL_SAFE_NO_PAD.encode(token_bytes))
}

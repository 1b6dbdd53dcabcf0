//! Conversion of the registry's base64url public key into the raw bytes the
//! push platform expects as its application server key.

use base64::Engine as _;

use crate::PushError;

/// Decodes base64url text, tolerating missing `=` padding.
///
/// The input is padded to a multiple of four, `-`/`_` are mapped to `+`/`/`,
/// and the result goes through the standard alphabet decoder. Malformed input
/// is reported as [`PushError::Decode`].
pub fn url_b64_to_bytes(text: &str) -> Result<Vec<u8>, PushError> {
    let trimmed = text.trim();
    let padding = (4 - trimmed.len() % 4) % 4;
    let mut standard = String::with_capacity(trimmed.len() + padding);
    for c in trimmed.chars() {
        standard.push(match c {
            '-' => '+',
            '_' => '/',
            other => other,
        });
    }
    standard.extend(std::iter::repeat('=').take(padding));

    base64::engine::general_purpose::STANDARD
        .decode(standard.as_bytes())
        .map_err(|error| PushError::Decode(format!("invalid subscription key: {error}")))
}

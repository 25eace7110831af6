//! Content fingerprinting with BLAKE3

/// Compute the 256-bit content digest of an octet sequence, lowercase hex.
///
/// Pure and infallible; identical input always yields the identical digest.
pub fn content_digest(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

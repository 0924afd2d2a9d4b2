use sha2::{Digest, Sha256};

/// Hash a string with SHA256, returning the raw digest
pub fn hash_bytes(data: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Shorten an address for display: first four and last four characters.
pub fn format_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 8 {
        return address.to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Signatures shown in the history keep their first eight characters.
pub fn short_signature(signature: &str) -> String {
    let head: String = signature.chars().take(8).collect();
    format!("{}...", head)
}

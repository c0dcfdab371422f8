//! RFC 6238 TOTP generation for SmartAPI login
//!
//! Angel One hands out the shared secret either as base32 or as a UUID-style
//! 32-hex-char string; both are accepted. SHA1, 30-second step, 6 digits.

use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

const BASE32_ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Generates the 6-digit TOTP code for the given secret at the current time.
pub fn generate(secret: &str) -> Result<String, String> {
    let step = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|e| format!("System clock error: {}", e))?
        .as_secs()
        / 30;
    generate_at(secret, step)
}

/// Generates the code for an explicit 30-second time step (testable).
pub fn generate_at(secret: &str, time_step: u64) -> Result<String, String> {
    let key = decode_secret(secret)?;
    if key.is_empty() {
        return Err("TOTP secret decoded to zero bytes".to_string());
    }

    let mut mac = HmacSha1::new_from_slice(&key)
        .map_err(|e| format!("HMAC init failed: {}", e))?;
    mac.update(&time_step.to_be_bytes());
    let hash = mac.finalize().into_bytes();

    // Dynamic truncation per RFC 4226
    let offset = (hash[hash.len() - 1] & 0x0f) as usize;
    let code = ((hash[offset] as u32 & 0x7f) << 24)
        | ((hash[offset + 1] as u32) << 16)
        | ((hash[offset + 2] as u32) << 8)
        | (hash[offset + 3] as u32);

    Ok(format!("{:06}", code % 1_000_000))
}

/// Decodes the secret: UUID-hex (32 hex chars once hyphens are stripped)
/// takes priority, otherwise base32.
fn decode_secret(secret: &str) -> Result<Vec<u8>, String> {
    let stripped: String = secret.chars().filter(|c| *c != '-').collect();
    if stripped.len() == 32 && stripped.chars().all(|c| c.is_ascii_hexdigit()) {
        return hex_decode(&stripped);
    }

    let cleaned: String = secret
        .to_uppercase()
        .chars()
        .filter(|c| BASE32_ALPHABET.contains(*c))
        .collect();
    if cleaned.is_empty() {
        return Err("TOTP secret is not valid hex or base32".to_string());
    }
    Ok(base32_decode(&cleaned))
}

fn hex_decode(hex: &str) -> Result<Vec<u8>, String> {
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|e| format!("Invalid hex in TOTP secret: {}", e))
        })
        .collect()
}

fn base32_decode(input: &str) -> Vec<u8> {
    let mut buffer: u32 = 0;
    let mut bits_left = 0;
    let mut out = Vec::with_capacity(input.len() * 5 / 8);

    for c in input.chars() {
        let val = match BASE32_ALPHABET.find(c) {
            Some(v) => v as u32,
            None => continue,
        };
        buffer = (buffer << 5) | val;
        bits_left += 5;
        if bits_left >= 8 {
            out.push(((buffer >> (bits_left - 8)) & 0xff) as u8);
            bits_left -= 8;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc6238_sha1_vector() {
        // RFC 6238 appendix B: secret "12345678901234567890" (base32
        // GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ), T=59s → step 1 → 287082 (6 digits)
        let code = generate_at("GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ", 1).expect("totp");
        assert_eq!(code, "287082");
    }

    #[test]
    fn test_uuid_hex_secret_accepted() {
        let code = generate_at("31323334-3536-3738-3930-313233343536", 1).expect("totp");
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_code_changes_with_step() {
        let secret = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";
        let a = generate_at(secret, 1).expect("totp");
        let b = generate_at(secret, 2).expect("totp");
        assert_ne!(a, b);
    }

    #[test]
    fn test_garbage_secret_rejected() {
        assert!(generate_at("!!!", 1).is_err());
    }
}

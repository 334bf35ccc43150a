//! Opaque identifier generation.
//!
//! All identifiers are generated from CSPRNG bytes and hex-encoded. Checkout
//! codes embed the sale id so operators can attribute a code at a glance;
//! uniqueness comes from the 64 random bits and is additionally enforced by
//! the `checkout:{code}` registry key and checkout persistence.

use rand::RngCore;

/// Generate a checkout code: `CHK-{sale_id}-{16 hex chars}`.
#[must_use]
pub fn checkout_code(sale_id: &str) -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("CHK-{sale_id}-{}", hex::encode(bytes))
}

/// Generate a sale id: `S-{10 hex chars}`.
#[must_use]
pub fn sale_id() -> String {
    let mut bytes = [0u8; 5];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("S-{}", hex::encode(bytes))
}

/// Generate a checkout row id: `C-{10 hex chars}`.
#[must_use]
pub fn checkout_row_id() -> String {
    let mut bytes = [0u8; 5];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("C-{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkout_code_embeds_sale_and_carries_16_hex_chars() {
        let code = checkout_code("S-0011223344");
        let suffix = code.strip_prefix("CHK-S-0011223344-").unwrap();
        assert_eq!(suffix.len(), 16);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn sale_ids_are_prefixed_and_distinct() {
        let a = sale_id();
        let b = sale_id();
        assert!(a.starts_with("S-") && a.len() == 12);
        assert_ne!(a, b);
    }

    #[test]
    fn checkout_row_ids_are_prefixed() {
        let id = checkout_row_id();
        assert!(id.starts_with("C-") && id.len() == 12);
    }
}

//! Redis-backed probabilistic sold-items filter.
//!
//! A plain bitset key addressed by `k` hash positions per element. `contains`
//! returning `false` proves the element was never added; `true` only means
//! "possibly present" and callers verify against the durable store wherever
//! the protocol needs an authoritative answer.
//!
//! Hashing is the double-hashing scheme `h_i(x) = h1(x) + i * h2(x) (mod m)`
//! with `h1` a 64-bit xxHash and `h2` the first 8 bytes of a SHA-256 digest,
//! so the `k` probe positions derive from two hash computations.

use redis::aio::ConnectionManager;
use sha2::{Digest, Sha256};
use xxhash_rust::xxh64::xxh64;

use flashsale_core::{Result, SaleError};

/// Bloom filter over a Redis bitset key.
#[derive(Clone)]
pub struct RedisBloomFilter {
    conn: ConnectionManager,
    key: String,
    /// Size of the bitset, in bits.
    m: u64,
    /// Number of hash positions per element.
    k: u64,
}

impl RedisBloomFilter {
    /// Create a filter over `key` with explicit parameters.
    #[must_use]
    pub fn new(conn: ConnectionManager, key: impl Into<String>, m: u64, k: u64) -> Self {
        Self {
            conn,
            key: key.into(),
            m: m.max(1),
            k: k.max(1),
        }
    }

    /// Set the element's `k` bits in one pipelined batch.
    ///
    /// # Errors
    ///
    /// Returns [`SaleError::Cache`] if the batch fails.
    pub async fn add(&self, element: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        for position in self.positions(element) {
            pipe.cmd("SETBIT").arg(&self.key).arg(position).arg(1).ignore();
        }

        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| SaleError::Cache(format!("failed to set filter bits: {e}")))?;
        Ok(())
    }

    /// Read the element's `k` bits in one pipelined batch. Any unset bit means
    /// the element was definitely never added.
    ///
    /// # Errors
    ///
    /// Returns [`SaleError::Cache`] if the batch fails.
    pub async fn contains(&self, element: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        for position in self.positions(element) {
            pipe.cmd("GETBIT").arg(&self.key).arg(position);
        }

        let bits: Vec<i64> = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| SaleError::Cache(format!("failed to read filter bits: {e}")))?;

        Ok(bits.iter().all(|bit| *bit == 1))
    }

    /// Drop the whole bitset (periodic rebuild support).
    ///
    /// # Errors
    ///
    /// Returns [`SaleError::Cache`] if the delete fails.
    pub async fn clear(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("DEL")
            .arg(&self.key)
            .query_async(&mut conn)
            .await
            .map_err(|e| SaleError::Cache(format!("failed to clear filter: {e}")))?;
        Ok(())
    }

    /// Expected false-positive rate after `elements_added` insertions:
    /// `(1 - e^(-k*n/m))^k`.
    #[must_use]
    pub fn estimated_fp_rate(&self, elements_added: u64) -> f64 {
        if elements_added == 0 {
            return 0.0;
        }
        let exponent = -((self.k * elements_added) as f64) / self.m as f64;
        (1.0 - exponent.exp()).powi(self.k as i32)
    }

    /// Bit positions for an element.
    fn positions(&self, element: &str) -> Vec<u64> {
        probe_positions(element, self.m, self.k)
    }
}

/// Double-hashed probe positions: `(h1 + i*h2) mod m` for `i in 0..k`.
fn probe_positions(element: &str, m: u64, k: u64) -> Vec<u64> {
    let h1 = xxh64(element.as_bytes(), 0);
    let digest = Sha256::digest(element.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let h2 = u64::from_be_bytes(prefix);

    (0..k)
        .map(|i| h1.wrapping_add(i.wrapping_mul(h2)) % m)
        .collect()
}

/// Optimal `(m, k)` for an expected cardinality and target false-positive
/// rate: `m = ceil(-n * ln(p) / ln(2)^2)`, `k = max(1, round(m/n * ln(2)))`.
#[must_use]
pub fn optimal_parameters(expected_elements: u64, false_positive_rate: f64) -> (u64, u64) {
    let ln2 = std::f64::consts::LN_2;
    let m = (-(expected_elements as f64) * false_positive_rate.ln() / (ln2 * ln2)).ceil() as u64;
    let k = ((m as f64 / expected_elements as f64) * ln2).round() as u64;

    (m, k.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameters_for_default_sizing() {
        let (m, k) = optimal_parameters(100_000, 0.01);
        assert_eq!(m, 958_506);
        assert_eq!(k, 7);
    }

    #[test]
    fn parameters_never_degenerate_to_zero_hashes() {
        let (_, k) = optimal_parameters(1_000_000, 0.9);
        assert_eq!(k, 1);
    }

    #[test]
    fn tighter_rate_needs_more_bits() {
        let (loose, _) = optimal_parameters(100_000, 0.05);
        let (tight, _) = optimal_parameters(100_000, 0.001);
        assert!(tight > loose);
    }

    #[test]
    fn probe_positions_are_deterministic_and_bounded() {
        let (m, k) = optimal_parameters(100_000, 0.01);
        let a = probe_positions("item_1751364000_42", m, k);
        let b = probe_positions("item_1751364000_42", m, k);

        assert_eq!(a, b);
        assert_eq!(a.len(), k as usize);
        assert!(a.iter().all(|pos| *pos < m));
    }

    #[test]
    fn distinct_elements_probe_distinct_positions() {
        let (m, k) = optimal_parameters(100_000, 0.01);
        let a = probe_positions("item_a", m, k);
        let b = probe_positions("item_b", m, k);
        assert_ne!(a, b);
    }
}

//! Hash Chain
//!
//! Deterministic digest over audit record fields, linking each record to
//! its predecessor. Every field is framed with a 64-bit big-endian length
//! prefix before hashing, so shifting bytes across a field boundary always
//! changes the digest (a plain delimiter join does not guarantee this).

use sha2::{Digest, Sha256};

use crate::audit::record::AuditRecord;

/// Sentinel previous-hash for the first record of a chain.
pub const EMPTY_TIP: &str = "";

/// Length of an encoded chain hash: 256 bits as lowercase hex.
pub const HASH_HEX_LEN: usize = 64;

fn update_framed(hasher: &mut Sha256, field: &[u8]) {
    hasher.update((field.len() as u64).to_be_bytes());
    hasher.update(field);
}

/// Compute the chain hash for a full audit record.
///
/// Absent optional fields hash as the empty string; the timestamp is hashed
/// as its RFC 3339 rendering, which is also the stored form.
pub fn compute(
    prev_hash: &str,
    actor_id: Option<&str>,
    action: &str,
    payload_json: &str,
    created_at: &str,
    origin: Option<&str>,
) -> String {
    let mut hasher = Sha256::new();
    update_framed(&mut hasher, prev_hash.as_bytes());
    update_framed(&mut hasher, actor_id.unwrap_or("").as_bytes());
    update_framed(&mut hasher, action.as_bytes());
    update_framed(&mut hasher, payload_json.as_bytes());
    update_framed(&mut hasher, created_at.as_bytes());
    update_framed(&mut hasher, origin.unwrap_or("").as_bytes());
    hex::encode(hasher.finalize())
}

/// Compute the chain hash for a file-sink line.
pub fn compute_line(prev_hash: &str, created_at: &str, message: &str) -> String {
    let mut hasher = Sha256::new();
    update_framed(&mut hasher, prev_hash.as_bytes());
    update_framed(&mut hasher, created_at.as_bytes());
    update_framed(&mut hasher, message.as_bytes());
    hex::encode(hasher.finalize())
}

/// Recompute a record's hash from its stored fields and the given
/// predecessor hash, and compare against the stored hash. No side effects.
pub fn verify_pair(prev_hash: &str, record: &AuditRecord) -> bool {
    let recomputed = compute(
        prev_hash,
        record.actor_id.as_deref(),
        &record.action,
        &record.payload_canonical(),
        &record.created_at.to_rfc3339(),
        record.origin.as_deref(),
    );
    recomputed == record.hash
}

/// Whether `s` has the fixed chain-hash format: 64 lowercase hex chars.
pub fn is_chain_hash(s: &str) -> bool {
    s.len() == HASH_HEX_LEN
        && s.bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_is_deterministic() {
        let h1 = compute("", Some("u1"), "login", "{}", "2026-08-06T12:00:00+00:00", None);
        let h2 = compute("", Some("u1"), "login", "{}", "2026-08-06T12:00:00+00:00", None);
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), HASH_HEX_LEN);
        assert!(is_chain_hash(&h1));
    }

    #[test]
    fn test_every_field_affects_the_digest() {
        let base = compute("p", Some("u1"), "login", "{}", "t", Some("1.2.3.4"));
        assert_ne!(base, compute("q", Some("u1"), "login", "{}", "t", Some("1.2.3.4")));
        assert_ne!(base, compute("p", Some("u2"), "login", "{}", "t", Some("1.2.3.4")));
        assert_ne!(base, compute("p", Some("u1"), "logout", "{}", "t", Some("1.2.3.4")));
        assert_ne!(base, compute("p", Some("u1"), "login", "{\"k\":1}", "t", Some("1.2.3.4")));
        assert_ne!(base, compute("p", Some("u1"), "login", "{}", "u", Some("1.2.3.4")));
        assert_ne!(base, compute("p", Some("u1"), "login", "{}", "t", Some("4.3.2.1")));
    }

    #[test]
    fn test_field_boundaries_are_unambiguous() {
        // Moving a byte from the end of one field to the start of the next
        // must not produce the same digest.
        let a = compute("", Some("ab"), "clogin", "{}", "t", None);
        let b = compute("", Some("abc"), "login", "{}", "t", None);
        assert_ne!(a, b);

        let c = compute("", None, "x", "y", "t", None);
        let d = compute("", None, "xy", "", "t", None);
        assert_ne!(c, d);
    }

    #[test]
    fn test_absent_and_empty_optionals_agree() {
        // The data model treats "absent" and "empty" actor/origin alike.
        let a = compute("", None, "login", "{}", "t", None);
        let b = compute("", Some(""), "login", "{}", "t", Some(""));
        assert_eq!(a, b);
    }

    #[test]
    fn test_compute_line_chains_on_prev() {
        let first = compute_line(EMPTY_TIP, "t0", "started");
        let second = compute_line(&first, "t1", "started");
        assert_ne!(first, second);
        assert!(is_chain_hash(&first));
    }

    #[test]
    fn test_is_chain_hash_rejects_bad_formats() {
        assert!(!is_chain_hash(""));
        assert!(!is_chain_hash("abc"));
        assert!(!is_chain_hash(&"A".repeat(64)));
        assert!(!is_chain_hash(&"g".repeat(64)));
        assert!(is_chain_hash(&"0".repeat(64)));
    }
}

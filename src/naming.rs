//! Cluster and container naming
//!
//! k3d composes container names from several parts: its own `k3d-` prefix,
//! our [`DEFAULT_PREFIX`], the caller's prefix, a per-cluster suffix and the
//! node role. The caller's share is therefore kept to a low double-digit
//! length and checked before anything is provisioned.

use std::sync::OnceLock;

use rand::Rng;
use regex::Regex;

use crate::error::{Error, Result};

/// Marker prepended to every cluster so testclusters containers can be told
/// apart from other (possibly also k3d-made) containers.
pub const DEFAULT_PREFIX: &str = "tc-";

/// Length of the random suffix used when the caller gives no prefix
pub const GENERATED_PREFIX_LEN: usize = 6;

/// Length of the suffix identifying the containers of one cluster
pub const CLUSTER_SUFFIX_LEN: usize = 8;

/// Grammar for the composed prefix, 2 to 38 characters
pub const RESTRICTED_CONTAINER_NAME_CHARS: &str = "[a-zA-Z0-9][a-zA-Z0-9_.-]{1,37}";

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

fn prefix_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(&format!("^{}$", RESTRICTED_CONTAINER_NAME_CHARS))
            .unwrap_or_else(|e| unreachable!("constant pattern is valid: {e}"))
    })
}

/// Validate the caller's prefix and return the full prefix including
/// [`DEFAULT_PREFIX`]. An empty prefix is replaced by a random one.
pub fn validate_prefix<R: Rng + ?Sized>(user_prefix: &str, rng: &mut R) -> Result<String> {
    if user_prefix.is_empty() {
        return Ok(format!(
            "{}{}",
            DEFAULT_PREFIX,
            pseudo_random_suffix(rng, GENERATED_PREFIX_LEN)
        ));
    }

    let total = format!("{}{}", DEFAULT_PREFIX, user_prefix);
    if prefix_pattern().is_match(&total) {
        Ok(total)
    } else {
        Err(Error::InvalidName {
            prefix: total,
            pattern: RESTRICTED_CONTAINER_NAME_CHARS,
        })
    }
}

/// Lowercase alphanumeric string of the given length
pub fn pseudo_random_suffix<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Upper bound k3d puts on cluster names
pub const CLUSTER_NAME_MAX_LEN: usize = 32;

/// Build a cluster name from an already validated prefix: lowercased,
/// `_`/`.` mapped to `-`, shortened so the random suffix still fits into
/// [`CLUSTER_NAME_MAX_LEN`].
pub fn cluster_name<R: Rng + ?Sized>(prefix: &str, rng: &mut R) -> String {
    let keep = CLUSTER_NAME_MAX_LEN - CLUSTER_SUFFIX_LEN - 1;
    let sanitized: String = prefix
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .take(keep)
        .collect();

    format!(
        "{}-{}",
        sanitized.trim_end_matches('-'),
        pseudo_random_suffix(rng, CLUSTER_SUFFIX_LEN)
    )
}

//! Identifier generation and validation.
//!
//! Ids are a fixed prefix plus 24 characters drawn from `[A-Za-z0-9]` with a
//! cryptographically secure generator.

use std::sync::LazyLock;

use rand::{Rng, distr::Alphanumeric};
use regex::Regex;

const SUFFIX_LENGTH: usize = 24;

static RESPONSE_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new("^resp_[A-Za-z0-9]{24}$").expect("valid regex"));
static ITEM_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new("^item_[A-Za-z0-9]{24}$").expect("valid regex"));

/// Generate a fresh `resp_` id.
pub fn response_id() -> String {
    prefixed("resp")
}

/// Generate a fresh `item_` id.
pub fn item_id() -> String {
    prefixed("item")
}

fn prefixed(prefix: &str) -> String {
    // rand::rng() is a CSPRNG reseeded from the OS.
    let suffix: String = rand::rng()
        .sample_iter(Alphanumeric)
        .take(SUFFIX_LENGTH)
        .map(char::from)
        .collect();

    format!("{prefix}_{suffix}")
}

/// Whether `id` has the `resp_<24 alphanumeric>` shape.
pub fn is_valid_response_id(id: &str) -> bool {
    RESPONSE_ID.is_match(id)
}

/// Whether `id` has the `item_<24 alphanumeric>` shape.
pub fn is_valid_item_id(id: &str) -> bool {
    ITEM_ID.is_match(id)
}

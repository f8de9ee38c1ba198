// ids.rs — Plan identifiers and confirmation tokens.
//
// Plan ids embed the UTC creation second so they sort by time, followed by
// random base62 characters so two plans created in the same second do not
// collide. Short tokens are pure base62 drawn from the OS CSPRNG.

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;

use crate::error::PlanError;

/// Random base62 string of `len` characters from the OS RNG.
fn base62(len: usize) -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Generate a single-use confirmation token (6..=12 base62 characters).
pub fn generate_short_token(len: usize) -> Result<String, PlanError> {
    if !(6..=12).contains(&len) {
        return Err(PlanError::TokenLength(len));
    }
    Ok(base62(len))
}

/// `pln_<yyyymmddHHMMSS><6 base62>`.
pub fn generate_plan_id(created_at: DateTime<Utc>) -> String {
    format!("pln_{}{}", created_at.format("%Y%m%d%H%M%S"), base62(6))
}

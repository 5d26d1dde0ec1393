//! Ownership checks for mutating endpoints.
//!
//! Handlers run the checks in a fixed order: the `AuthUser` extractor answers 401,
//! the resource lookup answers 404, and [`require_owner`] answers 403.

use uuid::Uuid;

use super::claims::SessionClaims;
use crate::error::ApiError;

/// Owner references and claim subjects may be spelled differently (case,
/// surrounding whitespace), so both sides are normalised before comparing.
pub fn same_principal(owner: &str, caller: &str) -> bool {
    let (owner, caller) = (owner.trim(), caller.trim());
    match (Uuid::parse_str(owner), Uuid::parse_str(caller)) {
        (Ok(a), Ok(b)) => a == b,
        _ => owner == caller,
    }
}

pub fn require_owner(owner: Uuid, caller: &SessionClaims) -> Result<(), ApiError> {
    if same_principal(&owner.to_string(), &caller.sub) {
        Ok(())
    } else {
        tracing::warn!(%owner, caller = %caller.sub, "ownership check failed");
        Err(ApiError::Forbidden)
    }
}

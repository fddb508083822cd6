//! Kubernetes API response classification
//!
//! The charm only ever creates objects that are absent, so it needs to tell
//! "missing", "created by someone else first" and "write conflict" apart from
//! every other API failure.

use kube::Error;

/// HTTP status the API server uses for missing objects
const STATUS_NOT_FOUND: u16 = 404;

/// HTTP status the API server uses for both create races and update conflicts
const STATUS_CONFLICT: u16 = 409;

/// `reason` reported when a create call targets a name that already exists
pub const REASON_ALREADY_EXISTS: &str = "AlreadyExists";

/// `reason` reported when an update carries a stale resourceVersion
pub const REASON_CONFLICT: &str = "Conflict";

/// Check if the API server reported the object as missing
pub fn is_not_found(err: &Error) -> bool {
    matches!(err, Error::Api(ae) if ae.code == STATUS_NOT_FOUND)
}

/// Check if a create call failed because the object already exists
pub fn is_already_exists(err: &Error) -> bool {
    matches!(
        err,
        Error::Api(ae) if ae.code == STATUS_CONFLICT && ae.reason == REASON_ALREADY_EXISTS
    )
}

/// Check if an update failed on a stale resourceVersion
pub fn is_conflict(err: &Error) -> bool {
    matches!(
        err,
        Error::Api(ae) if ae.code == STATUS_CONFLICT && ae.reason == REASON_CONFLICT
    )
}

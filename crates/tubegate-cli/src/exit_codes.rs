//! Exit codes for the `tubegate` binary.
//! Scripts and unit files depend on these; treat them as a public contract.

pub const SUCCESS: i32 = 0;
pub const FAILED: i32 = 1; // Storage unavailable or bad input; nothing changed
pub const INTERNAL_ERROR: i32 = 2; // Configuration or unexpected error
pub const PARTIAL: i32 = 3; // Store updated, allow-list not (run `tubegate reconcile`)
pub const DRIFT: i32 = 4; // `status`: artifact differs from the active set

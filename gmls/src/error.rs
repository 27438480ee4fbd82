//! `gmls`'s error type is shared with `gmls-linalg`, since both crates fail
//! with the same taxonomy against the same per-target attribution.

pub use gmls_util::error::{GmlsError, GmlsResult};

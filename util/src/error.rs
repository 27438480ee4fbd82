//! The error type shared by every crate in the workspace.
//!
//! GMLS runs per-target; a failure in one target (an ill-conditioned
//! neighborhood, say) should name which target it came from without
//! forcing every caller to thread a target index through `anyhow`
//! context strings by hand.

use thiserror::Error;

/// A GMLS failure, optionally attributed to the target that produced it.
#[derive(Debug, Error)]
pub enum GmlsError {
    /// A `GmlsConfig`/`GmlsProblem` was built with an internally
    /// inconsistent or out-of-range setting, caught before any
    /// allocation or per-target work begins.
    #[error("invalid configuration: {message}")]
    ConfigInvalid { message: String },

    /// The neighbor table, source cloud or target cloud disagree with
    /// each other (wrong shape, out-of-range index, mismatched
    /// dimension) for a specific target.
    #[error("inconsistent input at target {target:?}: {message}")]
    InputInconsistent {
        target: Option<usize>,
        message: String,
    },

    /// The weighted least-squares system for a target is singular or
    /// numerically indistinguishable from singular (a zero pivot in QR,
    /// a vanishing singular value in SVD).
    #[error("ill-conditioned system at target {target:?}: {message}")]
    IllConditioned {
        target: Option<usize>,
        message: String,
    },

    /// A combination of reconstruction space / sampling functional /
    /// target operator that is valid in principle but has no kernel
    /// implemented yet.
    #[error("not implemented: {message}")]
    NotImplemented { message: String },
}

impl GmlsError {
    pub fn config_invalid(message: impl Into<String>) -> Self {
        GmlsError::ConfigInvalid {
            message: message.into(),
        }
    }

    pub fn input_inconsistent(target: Option<usize>, message: impl Into<String>) -> Self {
        GmlsError::InputInconsistent {
            target,
            message: message.into(),
        }
    }

    pub fn ill_conditioned(target: Option<usize>, message: impl Into<String>) -> Self {
        GmlsError::IllConditioned {
            target,
            message: message.into(),
        }
    }

    pub fn not_implemented(message: impl Into<String>) -> Self {
        GmlsError::NotImplemented {
            message: message.into(),
        }
    }

    /// The target this error is attributed to, if any.
    pub fn target(&self) -> Option<usize> {
        match self {
            GmlsError::InputInconsistent { target, .. } => *target,
            GmlsError::IllConditioned { target, .. } => *target,
            _ => None,
        }
    }
}

pub type GmlsResult<T> = Result<T, GmlsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_attribution() {
        let e = GmlsError::ill_conditioned(Some(3), "zero pivot");
        assert_eq!(e.target(), Some(3));

        let e = GmlsError::config_invalid("p must be >= 0");
        assert_eq!(e.target(), None);
    }

    #[test]
    fn display_includes_message() {
        let e = GmlsError::not_implemented("SVD path for p=0");
        assert!(e.to_string().contains("SVD path for p=0"));
    }
}

//! Distinguishes "evaluate at the target site itself" from "evaluate at
//! one of the `k`-th additional evaluation sites attached to a target",
//! the two kinds of site a target-operator row can be asked to fill.

/// A site a target operator is applied at: either the target's own
/// coordinate, or the `k`-th of its additional evaluation sites
/// (`k` is zero-based into that target's additional-site list).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SiteIndex {
    Target,
    Additional(usize),
}

impl SiteIndex {
    /// Maps to the row offset used when indexing into an alphas buffer laid
    /// out as `[target, additional_0, additional_1, ...]`.
    pub fn offset(self) -> usize {
        match self {
            SiteIndex::Target => 0,
            SiteIndex::Additional(k) => k + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets() {
        assert_eq!(SiteIndex::Target.offset(), 0);
        assert_eq!(SiteIndex::Additional(0).offset(), 1);
        assert_eq!(SiteIndex::Additional(4).offset(), 5);
    }
}

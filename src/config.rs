//! Hierarchy construction settings.

/// Number of levels in the benchmark's V-cycle (fine level included).
pub const DEFAULT_NUM_LEVELS: usize = 4;

/// Row ordering used by the problem assembler for every level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ordering {
    /// Rows stay in natural z-major, y, x order. The permutation is the identity.
    #[default]
    Natural,
    /// Rows are grouped into 8 colors by the parity of their (x, y, z)
    /// coordinates. No two rows of one color share a 27-point stencil.
    Multicolor,
}

/// Settings consumed by `CoarseProblemBuilder`.
#[derive(Debug, Clone)]
pub struct MgConfig {
    /// Total number of levels, the fine level included. 1 means no coarsening.
    pub num_levels: usize,
    pub ordering: Ordering,
    /// Allocate the device form of the fine residual buffer on every level.
    pub reference_check: bool,
}

impl Default for MgConfig {
    fn default() -> Self {
        Self {
            num_levels: DEFAULT_NUM_LEVELS,
            ordering: Ordering::Natural,
            reference_check: cfg!(feature = "reference"),
        }
    }
}

impl MgConfig {
    pub fn with_levels(mut self, num_levels: usize) -> Self {
        self.num_levels = num_levels;
        self
    }

    pub fn with_ordering(mut self, ordering: Ordering) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn with_reference_check(mut self, enabled: bool) -> Self {
        self.reference_check = enabled;
        self
    }
}

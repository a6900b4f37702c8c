//! Global refinement policies: isotropy, limits and how violations are handled.
//!
//! Policies are read-only for a run. [`enforce_policies`] turns the combined
//! criteria proposal for one element into validated flags or a fatal error.

pub mod enforce;
pub mod limits;

pub use enforce::{enforce_limits, enforce_policies, make_isotropic};
pub use limits::Limits;

use crate::mesh::{Basis, Quadrature};

#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum Isotropy {
    /// One flag shared by every dimension.
    Isotropic,
    #[default]
    Anisotropic,
}

/// Which kinds of refinement the invoking event may perform.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum RefinementMode {
    /// Only resolution changes; any Split/Join is a topology error.
    POnly,
    #[default]
    HAndP,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Policies<const D: usize> {
    pub isotropy: Isotropy,
    pub limits: Limits<D>,
    /// Fail instead of clamping when a flag crosses a limit.
    pub error_on_violation: bool,
    /// Keep neighbors within one level in the dimension normal to their
    /// shared face, not only the tangential ones.
    pub enforce_two_to_one_balance_in_normal_direction: bool,
}

impl<const D: usize> Default for Policies<D> {
    fn default() -> Self {
        Self {
            isotropy: Isotropy::Anisotropic,
            limits: Limits::default(),
            error_on_violation: false,
            enforce_two_to_one_balance_in_normal_direction: true,
        }
    }
}

impl<const D: usize> Policies<D> {
    pub fn new(isotropy: Isotropy, limits: Limits<D>, error_on_violation: bool) -> Self {
        Self {
            isotropy,
            limits,
            error_on_violation,
            ..Self::default()
        }
    }
}

/// What new elements produced by h-refinement are built with.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct HRefinementRules {
    pub mode: RefinementMode,
    pub basis: Basis,
    pub quadrature: Quadrature,
}

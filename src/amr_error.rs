//! AmrError: Unified error type for spectral-amr public APIs
//!
//! Every fallible operation in the crate returns this error. Element-scoped
//! variants carry the element rendered as a string so the enum stays
//! independent of the spatial dimension.

use std::fmt;
use thiserror::Error;

/// The configured bound a refinement request would cross.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum LimitKind {
    /// Minimum refinement level.
    MinLevel,
    /// Maximum refinement level.
    MaxLevel,
    /// Minimum number of grid points.
    MinExtent,
    /// Maximum number of grid points.
    MaxExtent,
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LimitKind::MinLevel => "minimum refinement level",
            LimitKind::MaxLevel => "maximum refinement level",
            LimitKind::MinExtent => "minimum resolution",
            LimitKind::MaxExtent => "maximum resolution",
        };
        f.write_str(name)
    }
}

/// Why an h-refinement request cannot produce a valid mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopologyReason {
    /// Split or Join was requested while only p-refinement is enabled.
    HRefinementUnsupported,
    /// Join was requested for an element at refinement level 0.
    JoinAtRoot,
    /// The extent carried into the new elements is below the basis minimum.
    ExtentBelowMinimum { extent: usize, minimum: usize },
    /// A join was committed without every sibling taking part.
    IncompleteSiblings,
}

impl fmt::Display for TopologyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopologyReason::HRefinementUnsupported => {
                f.write_str("requested h-refinement but only p-refinement is supported")
            }
            TopologyReason::JoinAtRoot => f.write_str("cannot join an element at level 0"),
            TopologyReason::ExtentBelowMinimum { extent, minimum } => write!(
                f,
                "extent {extent} is below the minimum of {minimum} for the basis and quadrature"
            ),
            TopologyReason::IncompleteSiblings => {
                f.write_str("not every sibling takes part in the join")
            }
        }
    }
}

/// Unified error type for AMR operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AmrError {
    /// Startup configuration is inconsistent; never raised mid-run.
    #[error("Invalid AMR configuration: {0}")]
    Configuration(String),
    /// A flag would push the level or extent outside the configured limits.
    #[error(
        "Tried refining beyond the AMR limits in element {element}, dimension {dimension}: \
         requested {kind} {requested}, allowed bound {bound}"
    )]
    LimitViolation {
        element: String,
        dimension: usize,
        kind: LimitKind,
        requested: usize,
        bound: usize,
    },
    /// The requested Split/Join would produce an invalid mesh.
    #[error("Invalid h-refinement in element {element}, dimension {dimension}: {reason}")]
    Topology {
        element: String,
        dimension: usize,
        reason: TopologyReason,
    },
    /// Two dimensions of an isotropic element disagree in direction.
    #[error(
        "Isotropic refinement of element {element} requested opposite directions in \
         dimensions {first} and {second}"
    )]
    IsotropyConflict {
        element: String,
        first: usize,
        second: usize,
    },
    /// A mesh extent is below the minimum for its basis and quadrature.
    #[error("Invalid extent {extent} in dimension {dimension}: minimum is {minimum}")]
    InvalidExtent {
        dimension: usize,
        extent: usize,
        minimum: usize,
    },
    #[error("Invalid element id: {0}")]
    InvalidElementId(String),
    #[error("Invalid orientation map: {0}")]
    InvalidOrientation(String),
    /// The arena holds no record for this element.
    #[error("Unknown element {0}")]
    UnknownElement(String),
    #[error("Unknown block {0}")]
    UnknownBlock(usize),
    /// Neighbor balancing kept changing decisions for the whole pass budget.
    #[error("Refinement decisions did not settle after {passes} balancing passes")]
    Unsettled { passes: usize },
}

impl AmrError {
    /// Name of the element this error is scoped to, if any.
    pub fn element(&self) -> Option<&str> {
        match self {
            AmrError::LimitViolation { element, .. }
            | AmrError::Topology { element, .. }
            | AmrError::IsotropyConflict { element, .. } => Some(element),
            AmrError::UnknownElement(element) => Some(element),
            _ => None,
        }
    }

    /// Offending dimension for element-scoped refinement errors.
    pub fn dimension(&self) -> Option<usize> {
        match self {
            AmrError::LimitViolation { dimension, .. }
            | AmrError::Topology { dimension, .. }
            | AmrError::InvalidExtent { dimension, .. } => Some(*dimension),
            AmrError::IsotropyConflict { first, .. } => Some(*first),
            _ => None,
        }
    }
}

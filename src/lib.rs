#![cfg_attr(docsrs, feature(doc_cfg))]
//! # spectral-amr
//!
//! spectral-amr is the decision-and-enforcement core of adaptive mesh
//! refinement for block-structured spectral element codes. Each element
//! decides, dimension by dimension, whether to change its resolution
//! (p-refinement) or its tree level (h-refinement), validates that decision
//! against global policies and its neighbors, and produces its new mesh and
//! identity.
//!
//! ## Features
//! - Criteria that propose refinement flags per dimension (`IncreaseResolution`,
//!   `DriveToTarget`), combined with a fixed precedence
//! - Policies: isotropy, per-dimension level and resolution limits, clamp-or-fail
//!   handling of violations, and topology validity checks
//! - 2:1 balance between face neighbors, including neighbors in rotated blocks
//! - A per-element refinement cycle with an explicit state machine and deferral
//!   when neighbor decisions are not yet available
//! - An arena of element records that applies splits and joins and keeps neighbor
//!   orientation maps consistent
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! spectral-amr = "0.3"
//! # Optional features:
//! # features = ["rayon", "check-invariants"]
//! ```
//!
//! A run validates an [`AmrConfig`](config::AmrConfig) once, builds an
//! [`ElementArena`](arena::ElementArena) from a [`DomainLayout`](domain::DomainLayout)
//! and calls [`refine_all`](arena::ElementArena::refine_all) per coordination
//! round. Layers that own their own element storage call
//! [`run_cycle`](cycle::run_cycle) directly.
//!
//! ## Logging
//! The crate logs through the `log` facade: clamps and cycle aborts at `debug`,
//! phase changes at `trace`, abandoned joins at `warn`. No logger is installed.

pub mod amr_error;
pub mod arena;
pub mod balance;
pub mod config;
pub mod criteria;
pub mod cycle;
pub mod debug_invariants;
pub mod domain;
pub mod flag;
pub mod mesh;
pub mod policies;

pub use amr_error::AmrError;
pub use debug_invariants::DebugInvariants;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::amr_error::{AmrError, LimitKind, TopologyReason};
    pub use crate::arena::{ElementArena, ElementRecord, OrientationDelta, RoundSummary};
    pub use crate::balance::{BalanceOutcome, balance_against_neighbors, update_amr_decision};
    pub use crate::config::{
        AmrConfig, AmrOptions, CriterionOptions, LimitsOptions, PerDimension, PoliciesOptions,
    };
    pub use crate::criteria::{
        Criterion, CriterionContext, DimensionScope, DriveToTarget, IncreaseResolution,
    };
    pub use crate::cycle::{
        CycleOutcome, CyclePhase, CycleStatus, FeedFn, HRefinement, NeighborFeed, RefinementCycle,
        proposed_flags, rebalance_cycle, run_cycle,
    };
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::domain::{
        Direction, DomainLayout, Element, ElementId, Neighbors, Orientation, OrientationMap,
        SegmentId, Side,
    };
    pub use crate::flag::{Flag, FlagSet};
    pub use crate::mesh::{Basis, Mesh, Quadrature, create_initial_mesh};
    pub use crate::policies::{
        HRefinementRules, Isotropy, Limits, Policies, RefinementMode, enforce_policies,
    };
}

//! Startup configuration of the AMR core.
//!
//! The option structs deserialize with `serde` from whatever format the
//! enclosing application reads; they use plain vectors so they do not depend
//! on the spatial dimension. [`AmrConfig::from_options`] validates them once
//! into the immutable, dimension-typed configuration that every refinement
//! cycle receives explicitly.

use crate::amr_error::AmrError;
use crate::criteria::{
    Criterion, DimensionScope, DriveToTarget, IncreaseResolution, validate_criteria,
};
use crate::domain::segment::MAX_REFINEMENT_LEVEL;
use crate::flag::Flag;
use crate::mesh::{Basis, Quadrature};
use crate::policies::{HRefinementRules, Isotropy, Limits, Policies, RefinementMode};
use serde::{Deserialize, Serialize};

/// A value given once for every dimension, or once per dimension.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PerDimension<T> {
    Uniform(T),
    Each(Vec<T>),
}

impl<T: Copy> PerDimension<T> {
    fn to_array<const D: usize>(&self, what: &str) -> Result<[T; D], AmrError> {
        match self {
            PerDimension::Uniform(value) => Ok([*value; D]),
            PerDimension::Each(values) => <[T; D]>::try_from(values.as_slice()).map_err(|_| {
                AmrError::Configuration(format!(
                    "{what} has {} entries, expected {D}",
                    values.len()
                ))
            }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", deny_unknown_fields)]
pub enum CriterionOptions {
    IncreaseResolution {
        #[serde(default)]
        dimensions: Option<Vec<usize>>,
    },
    DriveToTarget {
        target_extents: Vec<usize>,
        target_levels: Vec<u8>,
        #[serde(default)]
        flags_at_target: Option<Vec<Flag>>,
        #[serde(default)]
        dimensions: Option<Vec<usize>>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsOptions {
    pub min_level: PerDimension<u8>,
    pub max_level: PerDimension<u8>,
    pub min_extent: PerDimension<usize>,
    /// Unbounded (apart from the basis maximum) when absent.
    pub max_extent: Option<PerDimension<usize>>,
}

impl Default for LimitsOptions {
    fn default() -> Self {
        Self {
            min_level: PerDimension::Uniform(0),
            max_level: PerDimension::Uniform(MAX_REFINEMENT_LEVEL),
            min_extent: PerDimension::Uniform(1),
            max_extent: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoliciesOptions {
    pub isotropy: Isotropy,
    pub limits: LimitsOptions,
    pub error_on_violation: bool,
    pub enforce_two_to_one_balance_in_normal_direction: bool,
}

impl Default for PoliciesOptions {
    fn default() -> Self {
        Self {
            isotropy: Isotropy::Anisotropic,
            limits: LimitsOptions::default(),
            error_on_violation: false,
            enforce_two_to_one_balance_in_normal_direction: true,
        }
    }
}

fn default_basis() -> Basis {
    Basis::Legendre
}

fn default_quadrature() -> Quadrature {
    Quadrature::GaussLobatto
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AmrOptions {
    /// Evaluated in order; see [`validate_criteria`] for allowed combinations.
    pub criteria: Vec<CriterionOptions>,
    #[serde(default)]
    pub policies: PoliciesOptions,
    #[serde(default)]
    pub mode: RefinementMode,
    #[serde(default = "default_basis")]
    pub basis: Basis,
    #[serde(default = "default_quadrature")]
    pub quadrature: Quadrature,
}

fn scope<const D: usize>(dimensions: &Option<Vec<usize>>) -> Result<DimensionScope<D>, AmrError> {
    match dimensions {
        None => Ok(DimensionScope::all()),
        Some(dims) => DimensionScope::only(dims),
    }
}

impl CriterionOptions {
    pub fn build<const D: usize>(&self) -> Result<Criterion<D>, AmrError> {
        match self {
            CriterionOptions::IncreaseResolution { dimensions } => {
                Ok(IncreaseResolution::new(scope(dimensions)?).into())
            }
            CriterionOptions::DriveToTarget {
                target_extents,
                target_levels,
                flags_at_target,
                dimensions,
            } => {
                let extents = PerDimension::Each(target_extents.clone())
                    .to_array::<D>("DriveToTarget target_extents")?;
                let levels = PerDimension::Each(target_levels.clone())
                    .to_array::<D>("DriveToTarget target_levels")?;
                let at_target = match flags_at_target {
                    Some(flags) => PerDimension::Each(flags.clone())
                        .to_array::<D>("DriveToTarget flags_at_target")?,
                    None => [Flag::DoNothing; D],
                };
                let scope = scope(dimensions)?;
                Ok(DriveToTarget::with_options(extents, levels, at_target, scope)?.into())
            }
        }
    }
}

impl LimitsOptions {
    pub fn build<const D: usize>(&self) -> Result<Limits<D>, AmrError> {
        let max_extent = match &self.max_extent {
            Some(max) => max.to_array::<D>("max_extent")?,
            None => [usize::MAX; D],
        };
        Limits::new(
            self.min_level.to_array::<D>("min_level")?,
            self.max_level.to_array::<D>("max_level")?,
            self.min_extent.to_array::<D>("min_extent")?,
            max_extent,
        )
    }
}

/// Validated, read-only configuration threaded into every refinement cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AmrConfig<const D: usize> {
    criteria: Vec<Criterion<D>>,
    policies: Policies<D>,
    rules: HRefinementRules,
}

impl<const D: usize> AmrConfig<D> {
    pub fn new(
        criteria: Vec<Criterion<D>>,
        policies: Policies<D>,
        rules: HRefinementRules,
    ) -> Result<Self, AmrError> {
        if !rules.basis.supports(rules.quadrature) {
            return Err(AmrError::Configuration(format!(
                "{:?} quadrature is not defined for the {:?} basis",
                rules.quadrature, rules.basis
            )));
        }
        policies.limits.check_compatible(rules.basis, rules.quadrature)?;
        validate_criteria(&criteria, policies.isotropy)?;
        log::debug!(
            "AMR configured with {} criteria, {:?}, {:?}, error_on_violation={}",
            criteria.len(),
            policies.isotropy,
            rules.mode,
            policies.error_on_violation
        );
        Ok(Self {
            criteria,
            policies,
            rules,
        })
    }

    pub fn from_options(options: &AmrOptions) -> Result<Self, AmrError> {
        let criteria = options
            .criteria
            .iter()
            .map(CriterionOptions::build::<D>)
            .collect::<Result<Vec<_>, _>>()?;
        let policies = Policies {
            isotropy: options.policies.isotropy,
            limits: options.policies.limits.build()?,
            error_on_violation: options.policies.error_on_violation,
            enforce_two_to_one_balance_in_normal_direction: options
                .policies
                .enforce_two_to_one_balance_in_normal_direction,
        };
        let rules = HRefinementRules {
            mode: options.mode,
            basis: options.basis,
            quadrature: options.quadrature,
        };
        Self::new(criteria, policies, rules)
    }

    pub fn criteria(&self) -> &[Criterion<D>] {
        &self.criteria
    }

    pub fn policies(&self) -> &Policies<D> {
        &self.policies
    }

    pub fn rules(&self) -> &HRefinementRules {
        &self.rules
    }

    pub fn mode(&self) -> RefinementMode {
        self.rules.mode
    }

    pub fn basis(&self) -> Basis {
        self.rules.basis
    }

    pub fn quadrature(&self) -> Quadrature {
        self.rules.quadrature
    }

    /// True if any criterion needs neighbor snapshots to evaluate.
    pub fn requires_neighbor_data(&self) -> bool {
        self.criteria.iter().any(Criterion::requires_neighbor_data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_from_json() {
        let options: AmrOptions = serde_json::from_str(
            r#"{
                "criteria": [
                    { "kind": "DriveToTarget", "target_extents": [4, 5], "target_levels": [1, 1] }
                ],
                "policies": {
                    "isotropy": "Anisotropic",
                    "limits": { "max_level": [3, 2], "min_extent": 3, "max_extent": 6 },
                    "error_on_violation": true
                },
                "mode": "HAndP"
            }"#,
        )
        .unwrap();
        let config = AmrConfig::<2>::from_options(&options).unwrap();
        assert_eq!(config.criteria().len(), 1);
        assert_eq!(config.policies().limits.max_level(1), 2);
        assert_eq!(config.policies().limits.min_extent(0), 3);
        assert!(config.policies().error_on_violation);
        assert!(config.policies().enforce_two_to_one_balance_in_normal_direction);
        assert_eq!(config.basis(), Basis::Legendre);
        assert_eq!(config.quadrature(), Quadrature::GaussLobatto);
        assert!(!config.requires_neighbor_data());
    }

    #[test]
    fn wrong_dimension_count() {
        let options = AmrOptions {
            criteria: vec![CriterionOptions::DriveToTarget {
                target_extents: vec![4],
                target_levels: vec![0],
                flags_at_target: None,
                dimensions: None,
            }],
            policies: PoliciesOptions::default(),
            mode: RefinementMode::POnly,
            basis: Basis::Chebyshev,
            quadrature: Quadrature::Gauss,
        };
        assert!(AmrConfig::<1>::from_options(&options).is_ok());
        assert!(matches!(
            AmrConfig::<3>::from_options(&options),
            Err(AmrError::Configuration(_))
        ));
    }

    #[test]
    fn rejects_bad_limits_and_pairs() {
        let mut options: AmrOptions =
            serde_json::from_str(r#"{ "criteria": [ { "kind": "IncreaseResolution" } ] }"#)
                .unwrap();
        options.policies.limits.min_extent = PerDimension::Uniform(5);
        options.policies.limits.max_extent = Some(PerDimension::Uniform(4));
        assert!(AmrConfig::<1>::from_options(&options).is_err());

        options.policies.limits = LimitsOptions::default();
        options.quadrature = Quadrature::CellCentered;
        assert!(AmrConfig::<1>::from_options(&options).is_err());

        options.basis = Basis::FiniteDifference;
        assert!(AmrConfig::<1>::from_options(&options).is_ok());
    }

    #[test]
    fn rejects_unknown_fields() {
        let parsed: Result<AmrOptions, _> =
            serde_json::from_str(r#"{ "criteria": [], "isotropy": "Isotropic" }"#);
        assert!(parsed.is_err());
    }
}

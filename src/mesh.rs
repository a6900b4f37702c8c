//! Spectral mesh descriptor of an element.
//!
//! A [`Mesh`] records, per logical dimension, the number of grid points
//! (extent), the basis family and the quadrature rule. Meshes are built from
//! an element's tracked extents or from its block's initial extents; a
//! neighbor's view is obtained by permuting through an [`OrientationMap`].

use crate::amr_error::AmrError;
use crate::domain::element_id::ElementId;
use crate::domain::layout::DomainLayout;
use crate::domain::orientation::OrientationMap;
use std::fmt;

/// Maximum number of points of a spectral basis in one dimension.
pub const MAXIMUM_SPECTRAL_POINTS: usize = 20;

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub enum Basis {
    Legendre,
    Chebyshev,
    FiniteDifference,
}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub enum Quadrature {
    Gauss,
    GaussLobatto,
    CellCentered,
    FaceCentered,
}

impl Basis {
    /// True if `quadrature` is a valid point distribution for this basis.
    pub fn supports(self, quadrature: Quadrature) -> bool {
        match self {
            Basis::Legendre | Basis::Chebyshev => {
                matches!(quadrature, Quadrature::Gauss | Quadrature::GaussLobatto)
            }
            Basis::FiniteDifference => matches!(
                quadrature,
                Quadrature::CellCentered | Quadrature::FaceCentered
            ),
        }
    }

    /// Largest extent the basis supports, if bounded.
    pub fn maximum_points(self) -> Option<usize> {
        match self {
            Basis::Legendre | Basis::Chebyshev => Some(MAXIMUM_SPECTRAL_POINTS),
            Basis::FiniteDifference => None,
        }
    }
}

impl Quadrature {
    /// Smallest extent for which the point distribution is defined.
    pub fn minimum_points(self) -> usize {
        match self {
            Quadrature::Gauss | Quadrature::CellCentered => 1,
            Quadrature::GaussLobatto | Quadrature::FaceCentered => 2,
        }
    }
}

/// Smallest valid extent for a basis/quadrature pair.
pub fn minimum_extent(_basis: Basis, quadrature: Quadrature) -> usize {
    quadrature.minimum_points()
}

/// Largest valid extent for a basis/quadrature pair.
pub fn maximum_extent(basis: Basis, _quadrature: Quadrature) -> usize {
    basis.maximum_points().unwrap_or(usize::MAX)
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Mesh<const D: usize> {
    extents: [usize; D],
    basis: [Basis; D],
    quadrature: [Quadrature; D],
}

impl<const D: usize> Mesh<D> {
    /// A mesh with the same basis and quadrature in every dimension.
    pub fn new(
        extents: [usize; D],
        basis: Basis,
        quadrature: Quadrature,
    ) -> Result<Self, AmrError> {
        Self::with_per_dimension(extents, [basis; D], [quadrature; D])
    }

    pub fn with_per_dimension(
        extents: [usize; D],
        basis: [Basis; D],
        quadrature: [Quadrature; D],
    ) -> Result<Self, AmrError> {
        for d in 0..D {
            if !basis[d].supports(quadrature[d]) {
                return Err(AmrError::Configuration(format!(
                    "{:?} quadrature is not defined for the {:?} basis",
                    quadrature[d], basis[d]
                )));
            }
            let minimum = minimum_extent(basis[d], quadrature[d]);
            if extents[d] < minimum {
                return Err(AmrError::InvalidExtent {
                    dimension: d,
                    extent: extents[d],
                    minimum,
                });
            }
        }
        Ok(Self {
            extents,
            basis,
            quadrature,
        })
    }

    #[inline]
    pub fn extents(&self) -> [usize; D] {
        self.extents
    }

    #[inline]
    pub fn extent(&self, dimension: usize) -> usize {
        self.extents[dimension]
    }

    pub fn basis(&self) -> [Basis; D] {
        self.basis
    }

    pub fn quadrature(&self) -> [Quadrature; D] {
        self.quadrature
    }

    pub fn number_of_grid_points(&self) -> usize {
        self.extents.iter().product()
    }

    pub fn minimum_extent(&self, dimension: usize) -> usize {
        minimum_extent(self.basis[dimension], self.quadrature[dimension])
    }

    pub fn maximum_extent(&self, dimension: usize) -> usize {
        maximum_extent(self.basis[dimension], self.quadrature[dimension])
    }

    /// The same mesh with new extents, validated against the basis minimum.
    pub fn with_extents(&self, extents: [usize; D]) -> Result<Self, AmrError> {
        Self::with_per_dimension(extents, self.basis, self.quadrature)
    }

    /// This mesh as seen in the axis order of a neighbor related by `orientation`.
    pub fn oriented(&self, orientation: &OrientationMap<D>) -> Self {
        Self {
            extents: orientation.permute_to_neighbor(self.extents),
            basis: orientation.permute_to_neighbor(self.basis),
            quadrature: orientation.permute_to_neighbor(self.quadrature),
        }
    }
}

impl<const D: usize> fmt::Display for Mesh<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mesh{:?}", self.extents)
    }
}

/// Mesh built from an element's tracked extents.
///
/// `orientation` is the map from the element to the observer; pass
/// `OrientationMap::aligned()` for the element's own mesh.
pub fn mesh_for_extents<const D: usize>(
    extents: [usize; D],
    basis: Basis,
    quadrature: Quadrature,
    orientation: &OrientationMap<D>,
) -> Result<Mesh<D>, AmrError> {
    Ok(Mesh::new(extents, basis, quadrature)?.oriented(orientation))
}

/// Initial mesh of `element_id` (or of a neighbor, when `orientation` is not
/// aligned) from the block's configured initial extents.
pub fn create_initial_mesh<const D: usize>(
    layout: &DomainLayout<D>,
    element_id: &ElementId<D>,
    basis: Basis,
    quadrature: Quadrature,
    orientation: &OrientationMap<D>,
) -> Result<Mesh<D>, AmrError> {
    let extents = layout.initial_extents(element_id.block_id())?;
    mesh_for_extents(extents, basis, quadrature, orientation)
}

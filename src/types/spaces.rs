//! State-partition markers and typed vectors
//!
//! The model exposes three state partitions (dynamic state, collapsed
//! state and static parameters) plus the observation
//! space. This module provides typed vectors so values from different
//! partitions cannot be accidentally mixed: a dynamic-state vector cannot
//! be handed to a routine expecting a parameter vector, even when the
//! dimensions happen to agree.

use ::core::marker::PhantomData;
use ::core::ops::{Add, Mul, Neg, Sub};
use nalgebra::{RealField, SVector, Scalar};

// ============================================================================
// Partition Markers
// ============================================================================

/// Marker type for the dynamic state partition (integrated forward in time)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DynamicSpace;

/// Marker type for the collapsed/marginalized state partition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollapsedSpace;

/// Marker type for the static parameter partition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpace;

/// Marker type for observation-space vectors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObsSpace;

// ============================================================================
// Typed Vector
// ============================================================================

/// A vector parameterized by scalar type, dimension, and state partition.
///
/// The `Space` parameter ensures that vectors from different partitions
/// cannot be accidentally mixed in operations.
///
/// # Type Parameters
///
/// - `T`: The scalar type (typically `f32` or `f64`)
/// - `N`: The dimension of the vector (const generic)
/// - `Space`: A marker type indicating the partition this vector belongs to
#[repr(transparent)]
#[derive(Debug, Clone, PartialEq)]
pub struct Vector<T: Scalar, const N: usize, Space> {
    inner: SVector<T, N>,
    _marker: PhantomData<Space>,
}

impl<T: Scalar, const N: usize, Space> Vector<T, N, Space> {
    /// Creates a new vector from raw components.
    #[inline]
    pub fn from_array(data: [T; N]) -> Self {
        Self {
            inner: SVector::from(data),
            _marker: PhantomData,
        }
    }

    /// Creates a new vector from an nalgebra SVector.
    #[inline]
    pub fn from_svector(inner: SVector<T, N>) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    /// Returns a reference to the underlying nalgebra vector.
    #[inline]
    pub fn as_svector(&self) -> &SVector<T, N> {
        &self.inner
    }

    /// Consumes self and returns the underlying nalgebra vector.
    #[inline]
    pub fn into_svector(self) -> SVector<T, N> {
        self.inner
    }

    /// Returns a reference to the raw data array.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        self.inner.as_slice()
    }

    /// Access element at index.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.inner.get(index)
    }

    /// Access element at index (unchecked).
    ///
    /// # Panics
    /// Panics if index is out of bounds.
    #[inline]
    #[allow(clippy::should_implement_trait)]
    pub fn index(&self, index: usize) -> &T {
        &self.inner[index]
    }
}

impl<T: Scalar + Copy, const N: usize, Space: Clone> Copy for Vector<T, N, Space> {}

impl<T: RealField + Copy, const N: usize, Space> Vector<T, N, Space> {
    /// Creates a zero vector.
    #[inline]
    pub fn zeros() -> Self {
        Self {
            inner: SVector::zeros(),
            _marker: PhantomData,
        }
    }

    /// Creates a vector with every component set to `value`.
    #[inline]
    pub fn from_element(value: T) -> Self {
        Self {
            inner: SVector::from_element(value),
            _marker: PhantomData,
        }
    }

    /// Computes the squared Euclidean norm.
    #[inline]
    pub fn norm_squared(&self) -> T {
        self.inner.norm_squared()
    }

    /// Computes the Euclidean norm.
    #[inline]
    pub fn norm(&self) -> T {
        self.inner.norm()
    }

    /// Scales the vector by a scalar.
    #[inline]
    pub fn scale(&self, s: T) -> Self {
        Self {
            inner: self.inner.scale(s),
            _marker: PhantomData,
        }
    }

    /// Applies `f` to every component.
    #[inline]
    pub fn map(&self, f: impl Fn(T) -> T) -> Self {
        Self {
            inner: self.inner.map(f),
            _marker: PhantomData,
        }
    }

    /// Squared Euclidean distance to another vector of the same partition.
    #[inline]
    pub fn distance_squared(&self, other: &Self) -> T {
        (self.inner - other.inner).norm_squared()
    }
}

// ============================================================================
// Type Aliases
// ============================================================================

/// A dynamic-state vector.
pub type DynVector<T, const N: usize> = Vector<T, N, DynamicSpace>;

/// A collapsed (marginalized) state vector.
pub type CollapsedVector<T, const N: usize> = Vector<T, N, CollapsedSpace>;

/// A static parameter vector.
pub type ParamVector<T, const N: usize> = Vector<T, N, ParamSpace>;

/// An observation vector.
pub type ObsVector<T, const N: usize> = Vector<T, N, ObsSpace>;

// ============================================================================
// Operations: Same-Space Arithmetic
// ============================================================================

impl<T: RealField + Copy, const N: usize, Space> Add for Vector<T, N, Space> {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self::Output {
        Self {
            inner: self.inner + rhs.inner,
            _marker: PhantomData,
        }
    }
}

impl<T: RealField + Copy, const N: usize, Space> Sub for Vector<T, N, Space> {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            inner: self.inner - rhs.inner,
            _marker: PhantomData,
        }
    }
}

impl<T: RealField + Copy, const N: usize, Space> Neg for Vector<T, N, Space> {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self::Output {
        Self {
            inner: -self.inner,
            _marker: PhantomData,
        }
    }
}

impl<T: RealField + Copy, const N: usize, Space> Mul<T> for Vector<T, N, Space> {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: T) -> Self::Output {
        Self {
            inner: self.inner * rhs,
            _marker: PhantomData,
        }
    }
}

// ============================================================================
// Covariance Matrix
// ============================================================================

/// A covariance matrix bound to a specific partition.
///
/// Used for prior and proposal covariances over the parameter partition
/// and for reporting marginal uncertainty over the dynamic partition.
#[repr(transparent)]
#[derive(Debug, Clone, PartialEq)]
pub struct Covariance<T: Scalar, const N: usize, Space> {
    inner: nalgebra::SMatrix<T, N, N>,
    _marker: PhantomData<Space>,
}

impl<T: Scalar, const N: usize, Space> Covariance<T, N, Space> {
    /// Creates a covariance matrix from a raw matrix.
    ///
    /// The caller should ensure the matrix is symmetric and positive
    /// semi-definite; routines that require strict positive definiteness
    /// (e.g. proposal construction) verify it via Cholesky and fail with
    /// [`crate::SmcError::NotPositiveDefinite`] otherwise.
    #[inline]
    pub fn from_matrix(inner: nalgebra::SMatrix<T, N, N>) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    /// Returns a reference to the underlying matrix.
    #[inline]
    pub fn as_matrix(&self) -> &nalgebra::SMatrix<T, N, N> {
        &self.inner
    }

    /// Consumes self and returns the underlying matrix.
    #[inline]
    pub fn into_matrix(self) -> nalgebra::SMatrix<T, N, N> {
        self.inner
    }
}

impl<T: Scalar + Copy, const N: usize, Space: Clone> Copy for Covariance<T, N, Space> where
    nalgebra::SMatrix<T, N, N>: Copy
{
}

impl<T: RealField + Copy, const N: usize, Space> Covariance<T, N, Space> {
    /// Creates an identity covariance matrix.
    #[inline]
    pub fn identity() -> Self {
        Self {
            inner: nalgebra::SMatrix::identity(),
            _marker: PhantomData,
        }
    }

    /// Creates a diagonal covariance matrix.
    #[inline]
    pub fn from_diagonal(diagonal: &SVector<T, N>) -> Self {
        Self {
            inner: nalgebra::SMatrix::from_diagonal(diagonal),
            _marker: PhantomData,
        }
    }

    /// Scales the covariance by a scalar factor.
    #[inline]
    pub fn scale(&self, s: T) -> Self {
        Self {
            inner: self.inner.scale(s),
            _marker: PhantomData,
        }
    }

    /// Sum of the diagonal (total variance).
    #[inline]
    pub fn trace(&self) -> T {
        self.inner.trace()
    }
}

/// Covariance over the parameter partition (priors, proposals).
pub type ParamCovariance<T, const N: usize> = Covariance<T, N, ParamSpace>;

/// Covariance over the dynamic partition (marginal uncertainty reports).
pub type DynCovariance<T, const N: usize> = Covariance<T, N, DynamicSpace>;

//! Labeled mesh domain: a multi-domain clipped to a bounding sphere.
//!
//! [`LabeledDomain`] is what the mesher consumes. It answers two queries:
//! the label of a point ([`LabeledDomain::label_at`]) and, for a segment
//! whose endpoints carry different labels, where the label changes
//! ([`LabeledDomain::surface_crossing`]). Everything outside the bounding
//! sphere is [`SubdomainLabel::Outside`].

use serde::{Deserialize, Serialize};

use crate::domain::function::ScalarFunction;
use crate::domain::multi_domain::{DomainError, MultiDomain, SubdomainLabel, SubdomainSpec};
use crate::geometry::point::Point3;

/// Bisection never needs more steps than this to reach any positive
/// relative tolerance representable in `f64`.
const MAX_BISECTION_STEPS: usize = 128;

/// Sphere bounding the meshed region, given by its squared radius.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingSphere {
    pub center: Point3,
    pub squared_radius: f64,
}

impl BoundingSphere {
    #[must_use]
    pub const fn new(center: Point3, squared_radius: f64) -> Self {
        Self {
            center,
            squared_radius,
        }
    }

    #[must_use]
    pub fn radius(&self) -> f64 {
        self.squared_radius.sqrt()
    }

    /// Returns `true` if `point` is strictly inside the sphere.
    #[inline]
    #[must_use]
    pub fn contains(&self, point: Point3) -> bool {
        point.distance_squared(self.center) < self.squared_radius
    }
}

/// A [`MultiDomain`] restricted to a [`BoundingSphere`], with the relative
/// tolerance used to isolate surface crossings.
///
/// # Examples
///
/// ```rust
/// use implicit_mesh::domain::function::{ScalarFunction, SphereFunction};
/// use implicit_mesh::domain::labeled::{BoundingSphere, LabeledDomain};
/// use implicit_mesh::domain::multi_domain::SubdomainLabel;
/// use implicit_mesh::geometry::point::Point3;
///
/// let functions: Vec<Box<dyn ScalarFunction>> = vec![Box::new(SphereFunction::centered(1.0))];
/// let domain = LabeledDomain::from_patterns(
///     functions,
///     &["-"],
///     BoundingSphere::new(Point3::ORIGIN, 4.0),
///     1e-6,
/// )
/// .unwrap();
///
/// let crossing = domain
///     .surface_crossing(Point3::ORIGIN, Point3::new(1.5, 0.0, 0.0))
///     .unwrap();
/// assert!((crossing.x() - 1.0).abs() < 1e-5);
/// assert_eq!(domain.label_at(Point3::new(3.0, 0.0, 0.0)), SubdomainLabel::Outside);
/// ```
#[derive(Debug)]
pub struct LabeledDomain {
    domain: MultiDomain,
    bounding: BoundingSphere,
    isolation_epsilon: f64,
}

impl LabeledDomain {
    /// Wraps a combinator with a bounding sphere and a relative isolation
    /// tolerance (a fraction of the bounding radius).
    ///
    /// # Errors
    ///
    /// Returns [`DomainError`] if the squared radius or the tolerance is not
    /// strictly positive and finite.
    pub fn new(
        domain: MultiDomain,
        bounding: BoundingSphere,
        isolation_epsilon: f64,
    ) -> Result<Self, DomainError> {
        if !(bounding.squared_radius.is_finite() && bounding.squared_radius > 0.0)
            || !bounding.center.is_finite()
        {
            return Err(DomainError::InvalidBoundingSphere {
                squared_radius: bounding.squared_radius,
            });
        }
        if !(isolation_epsilon.is_finite() && isolation_epsilon > 0.0) {
            return Err(DomainError::InvalidIsolationEpsilon {
                epsilon: isolation_epsilon,
            });
        }
        Ok(Self {
            domain,
            bounding,
            isolation_epsilon,
        })
    }

    /// Builds the combinator and the domain in one call.
    ///
    /// # Errors
    ///
    /// See [`MultiDomain::new`] and [`LabeledDomain::new`].
    pub fn from_specs(
        functions: Vec<Box<dyn ScalarFunction>>,
        specs: Vec<SubdomainSpec>,
        bounding: BoundingSphere,
        isolation_epsilon: f64,
    ) -> Result<Self, DomainError> {
        Self::new(MultiDomain::new(functions, specs)?, bounding, isolation_epsilon)
    }

    /// Builds the domain from compact sign-pattern strings such as `"+-"`.
    ///
    /// # Errors
    ///
    /// See [`MultiDomain::from_patterns`] and [`LabeledDomain::new`].
    pub fn from_patterns(
        functions: Vec<Box<dyn ScalarFunction>>,
        patterns: &[&str],
        bounding: BoundingSphere,
        isolation_epsilon: f64,
    ) -> Result<Self, DomainError> {
        Self::new(
            MultiDomain::from_patterns(functions, patterns)?,
            bounding,
            isolation_epsilon,
        )
    }

    #[must_use]
    pub const fn multi_domain(&self) -> &MultiDomain {
        &self.domain
    }

    #[must_use]
    pub const fn bounding_sphere(&self) -> &BoundingSphere {
        &self.bounding
    }

    #[must_use]
    pub const fn isolation_epsilon(&self) -> f64 {
        self.isolation_epsilon
    }

    /// Absolute length below which surface crossings are not refined further.
    #[must_use]
    pub fn error_bound(&self) -> f64 {
        self.isolation_epsilon * self.bounding.radius()
    }

    #[must_use]
    pub fn number_of_subdomains(&self) -> usize {
        self.domain.number_of_subdomains()
    }

    /// Label of `point`; `Outside` beyond the bounding sphere.
    #[inline]
    #[must_use]
    pub fn label_at(&self, point: Point3) -> SubdomainLabel {
        if self.bounding.contains(point) {
            self.domain.classify(point)
        } else {
            SubdomainLabel::Outside
        }
    }

    /// Locates a label transition on the segment `[a, b]` by bisection.
    ///
    /// Returns `None` when both endpoints carry the same label. Otherwise the
    /// returned point lies within [`error_bound`](Self::error_bound) of a
    /// point where the label changes away from `label_at(a)`.
    #[must_use]
    pub fn surface_crossing(&self, a: Point3, b: Point3) -> Option<Point3> {
        let start_label = self.label_at(a);
        if start_label == self.label_at(b) {
            return None;
        }
        let tolerance2 = self.error_bound() * self.error_bound();
        let (mut lo, mut hi) = (a, b);
        for _ in 0..MAX_BISECTION_STEPS {
            if lo.distance_squared(hi) <= tolerance2 {
                break;
            }
            let mid = lo.midpoint(hi);
            if self.label_at(mid) == start_label {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        Some(lo.midpoint(hi))
    }
}

// =============================================================================
// TESTS
// =============================================================================

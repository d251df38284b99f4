//! Multi-domain combinator: sub-domains from sign patterns.
//!
//! Several scalar functions are evaluated at a point, producing a sign
//! vector. A [`SubdomainSpec`] lists the sign each function must have for a
//! point to belong to its sub-domain. [`MultiDomain::classify`] returns the
//! first matching spec, or [`SubdomainLabel::Outside`].
//!
//! # Zero policy
//!
//! A value of exactly `0` has [`Sign::Positive`]: points on a zero level-set
//! belong to the `+` side. `NaN` is [`Sign::Negative`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::collections::SmallBuffer;
use crate::domain::function::ScalarFunction;
use crate::geometry::point::Point3;

/// Inline capacity for per-point sign vectors.
const SIGN_BUFFER_SIZE: usize = 4;

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors raised while parsing a sign-pattern string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpecParseError {
    /// The pattern has no characters.
    #[error("Sign pattern is empty")]
    Empty,

    /// A character other than `+` or `-`.
    #[error("Invalid character {character:?} at position {position} in sign pattern")]
    InvalidCharacter {
        /// The offending character
        character: char,
        /// Zero-based position in the pattern
        position: usize,
    },
}

/// Errors raised while assembling a domain.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DomainError {
    /// No scalar functions were supplied.
    #[error("A domain needs at least one scalar function")]
    NoFunctions,

    /// No sub-domain specs were supplied.
    #[error("A domain needs at least one sub-domain spec")]
    NoSubdomains,

    /// A spec constrains a function that does not exist.
    #[error("Sub-domain spec {spec_index} references function {function_index}, but only {function_count} functions exist")]
    FunctionIndexOutOfRange {
        /// Index of the offending spec
        spec_index: usize,
        /// Function index it references
        function_index: usize,
        /// Number of available functions
        function_count: usize,
    },

    /// A spec has no constraints at all.
    #[error("Sub-domain spec {spec_index} has no sign constraints")]
    EmptySpec {
        /// Index of the offending spec
        spec_index: usize,
    },

    /// A sign-pattern string failed to parse.
    #[error("Invalid sub-domain spec: {0}")]
    Parse(#[from] SpecParseError),

    /// The bounding sphere has a non-positive or non-finite radius.
    #[error("Bounding sphere squared radius must be positive and finite, got {squared_radius}")]
    InvalidBoundingSphere {
        /// The rejected squared radius
        squared_radius: f64,
    },

    /// The isolation tolerance is non-positive or non-finite.
    #[error("Isolation epsilon must be positive and finite, got {epsilon}")]
    InvalidIsolationEpsilon {
        /// The rejected tolerance
        epsilon: f64,
    },
}

// =============================================================================
// SIGNS AND LABELS
// =============================================================================

/// Sign of a scalar function value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sign {
    /// `value >= 0`
    Positive,
    /// `value < 0`
    Negative,
}

impl Sign {
    /// Sign of `value`. Zero is positive.
    #[inline]
    #[must_use]
    pub fn of(value: f64) -> Self {
        if value >= 0.0 {
            Self::Positive
        } else {
            Self::Negative
        }
    }

    #[must_use]
    pub const fn symbol(self) -> char {
        match self {
            Self::Positive => '+',
            Self::Negative => '-',
        }
    }
}

/// Sub-domain membership of a point, cell or vertex.
///
/// Labels are ordered: every `Subdomain` sorts before `Outside`, and
/// sub-domains sort by index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SubdomainLabel {
    /// Member of the sub-domain defined by the spec at this index.
    Subdomain(usize),
    /// Not in any sub-domain.
    Outside,
}

impl SubdomainLabel {
    #[inline]
    #[must_use]
    pub const fn is_outside(self) -> bool {
        matches!(self, Self::Outside)
    }

    /// Spec index for a sub-domain label.
    #[inline]
    #[must_use]
    pub const fn index(self) -> Option<usize> {
        match self {
            Self::Subdomain(i) => Some(i),
            Self::Outside => None,
        }
    }
}

impl fmt::Display for SubdomainLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subdomain(i) => write!(f, "subdomain {i}"),
            Self::Outside => write!(f, "outside"),
        }
    }
}

// =============================================================================
// SUB-DOMAIN SPEC
// =============================================================================

/// Ordered `(function index, required sign)` constraints defining one
/// sub-domain.
///
/// The compact string form assigns the `i`-th character to function `i`, so
/// `"+-"` means `f0 >= 0` and `f1 < 0`.
///
/// # Examples
///
/// ```rust
/// use implicit_mesh::domain::multi_domain::{Sign, SubdomainSpec};
///
/// let spec: SubdomainSpec = "+-".parse().unwrap();
/// assert_eq!(spec.constraints(), &[(0, Sign::Positive), (1, Sign::Negative)]);
/// assert!(spec.matches(&[Sign::Positive, Sign::Negative]));
/// assert!(!spec.matches(&[Sign::Negative, Sign::Negative]));
/// assert_eq!(spec.to_string(), "+-");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubdomainSpec {
    constraints: Vec<(usize, Sign)>,
}

impl SubdomainSpec {
    /// Creates a spec from explicit constraints.
    #[must_use]
    pub const fn new(constraints: Vec<(usize, Sign)>) -> Self {
        Self { constraints }
    }

    #[must_use]
    pub fn constraints(&self) -> &[(usize, Sign)] {
        &self.constraints
    }

    /// Largest function index referenced, if any.
    #[must_use]
    pub fn max_function_index(&self) -> Option<usize> {
        self.constraints.iter().map(|&(i, _)| i).max()
    }

    /// Returns `true` if every constraint holds for `signs`.
    ///
    /// A constraint on a function missing from `signs` never holds.
    #[must_use]
    pub fn matches(&self, signs: &[Sign]) -> bool {
        self.constraints
            .iter()
            .all(|&(i, sign)| signs.get(i) == Some(&sign))
    }

    /// Returns `true` when the constraints cover functions `0..n` in order,
    /// so the spec has a compact string form.
    fn is_compact(&self) -> bool {
        self.constraints
            .iter()
            .enumerate()
            .all(|(position, &(index, _))| position == index)
    }
}

impl FromStr for SubdomainSpec {
    type Err = SpecParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(SpecParseError::Empty);
        }
        let constraints = s
            .chars()
            .enumerate()
            .map(|(position, character)| match character {
                '+' => Ok((position, Sign::Positive)),
                '-' => Ok((position, Sign::Negative)),
                _ => Err(SpecParseError::InvalidCharacter {
                    character,
                    position,
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { constraints })
    }
}

impl fmt::Display for SubdomainSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_compact() {
            for &(_, sign) in &self.constraints {
                write!(f, "{}", sign.symbol())?;
            }
            return Ok(());
        }
        write!(f, "[")?;
        for (n, &(index, sign)) in self.constraints.iter().enumerate() {
            if n > 0 {
                write!(f, ", ")?;
            }
            write!(f, "f{index}{}", sign.symbol())?;
        }
        write!(f, "]")
    }
}

// =============================================================================
// COMBINATOR
// =============================================================================

/// A set of scalar functions combined into labeled sub-domains.
pub struct MultiDomain {
    functions: Vec<Box<dyn ScalarFunction>>,
    specs: Vec<SubdomainSpec>,
}

impl MultiDomain {
    /// Creates a combinator, validating that every spec references existing
    /// functions.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError`] if either list is empty, a spec is empty, or a
    /// spec references a function index out of range.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use implicit_mesh::domain::function::{ScalarFunction, SphereFunction, TorusFunction};
    /// use implicit_mesh::domain::multi_domain::{MultiDomain, SubdomainLabel};
    /// use implicit_mesh::geometry::point::Point3;
    ///
    /// let functions: Vec<Box<dyn ScalarFunction>> = vec![
    ///     Box::new(TorusFunction::default()),
    ///     Box::new(SphereFunction::centered(3.0)),
    /// ];
    /// let domain = MultiDomain::new(functions, vec!["+-".parse().unwrap()]).unwrap();
    ///
    /// assert_eq!(domain.classify(Point3::ORIGIN), SubdomainLabel::Subdomain(0));
    /// assert_eq!(domain.classify(Point3::new(1.5, 0.0, 0.0)), SubdomainLabel::Outside);
    /// ```
    pub fn new(
        functions: Vec<Box<dyn ScalarFunction>>,
        specs: Vec<SubdomainSpec>,
    ) -> Result<Self, DomainError> {
        if functions.is_empty() {
            return Err(DomainError::NoFunctions);
        }
        if specs.is_empty() {
            return Err(DomainError::NoSubdomains);
        }
        for (spec_index, spec) in specs.iter().enumerate() {
            match spec.max_function_index() {
                None => return Err(DomainError::EmptySpec { spec_index }),
                Some(function_index) if function_index >= functions.len() => {
                    return Err(DomainError::FunctionIndexOutOfRange {
                        spec_index,
                        function_index,
                        function_count: functions.len(),
                    });
                }
                Some(_) => {}
            }
        }
        Ok(Self { functions, specs })
    }

    /// Convenience constructor from compact sign-pattern strings.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Parse`] for malformed patterns, otherwise the
    /// same errors as [`MultiDomain::new`].
    pub fn from_patterns(
        functions: Vec<Box<dyn ScalarFunction>>,
        patterns: &[&str],
    ) -> Result<Self, DomainError> {
        let specs = patterns
            .iter()
            .map(|p| p.parse::<SubdomainSpec>())
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(functions, specs)
    }

    #[must_use]
    pub fn number_of_functions(&self) -> usize {
        self.functions.len()
    }

    #[must_use]
    pub fn number_of_subdomains(&self) -> usize {
        self.specs.len()
    }

    #[must_use]
    pub fn specs(&self) -> &[SubdomainSpec] {
        &self.specs
    }

    /// Evaluates every function once and returns their signs.
    #[must_use]
    pub fn sign_vector(&self, point: Point3) -> SmallBuffer<Sign, SIGN_BUFFER_SIZE> {
        self.functions
            .iter()
            .map(|f| Sign::of(f.evaluate(point)))
            .collect()
    }

    /// Label of the first spec matching `point`, or `Outside`.
    #[must_use]
    pub fn classify(&self, point: Point3) -> SubdomainLabel {
        let signs = self.sign_vector(point);
        self.specs
            .iter()
            .position(|spec| spec.matches(&signs))
            .map_or(SubdomainLabel::Outside, SubdomainLabel::Subdomain)
    }
}

impl fmt::Debug for MultiDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiDomain")
            .field("functions", &self.functions.len())
            .field("specs", &self.specs)
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================

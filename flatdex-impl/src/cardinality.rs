use std::fmt;

/// Raw encoding of an infinite cardinality.
pub const INFINITE_CARDINALITY: i64 = -1;
/// Raw encoding of a cardinality that cannot be determined.
pub const UNKNOWN_CARDINALITY: i64 = -2;

/// Number of elements a sequence produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    /// The exact number of elements is known.
    Finite(u64),
    /// The sequence never ends.
    Infinite,
    /// The number of elements cannot be determined without iterating.
    Unknown,
}

impl Cardinality {
    pub fn is_finite(&self) -> bool {
        matches!(self, Cardinality::Finite(_))
    }

    pub fn finite(&self) -> Option<u64> {
        match self {
            Cardinality::Finite(n) => Some(*n),
            _ => None,
        }
    }

    /// Raw `i64` form, with the sentinels mapped to [`INFINITE_CARDINALITY`]
    /// and [`UNKNOWN_CARDINALITY`]. A finite count past `i64::MAX` has no raw
    /// form and reports as unknown.
    pub fn as_raw(&self) -> i64 {
        match self {
            Cardinality::Finite(n) => i64::try_from(*n).unwrap_or(UNKNOWN_CARDINALITY),
            Cardinality::Infinite => INFINITE_CARDINALITY,
            Cardinality::Unknown => UNKNOWN_CARDINALITY,
        }
    }

    /// Adds two cardinalities. A non-finite operand wins (infinite before
    /// unknown on the left), and a finite sum leaving the raw range is unknown.
    pub fn checked_sum(self, other: Cardinality) -> Cardinality {
        match (self, other) {
            (Cardinality::Finite(a), Cardinality::Finite(b)) => match a.checked_add(b) {
                Some(sum) if sum <= i64::MAX as u64 => Cardinality::Finite(sum),
                _ => Cardinality::Unknown,
            },
            (Cardinality::Finite(_), sentinel) => sentinel,
            (sentinel, _) => sentinel,
        }
    }
}

/// Raised when a raw value is negative but not one of the sentinels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidCardinality(pub i64);

impl fmt::Display for InvalidCardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid raw cardinality {}: expected a non-negative count, {} (infinite) or {} (unknown)",
            self.0, INFINITE_CARDINALITY, UNKNOWN_CARDINALITY
        )
    }
}

impl std::error::Error for InvalidCardinality {}

impl TryFrom<i64> for Cardinality {
    type Error = InvalidCardinality;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        match raw {
            INFINITE_CARDINALITY => Ok(Cardinality::Infinite),
            UNKNOWN_CARDINALITY => Ok(Cardinality::Unknown),
            n if n >= 0 => Ok(Cardinality::Finite(n as u64)),
            n => Err(InvalidCardinality(n)),
        }
    }
}

impl From<Cardinality> for i64 {
    fn from(cardinality: Cardinality) -> Self {
        cardinality.as_raw()
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cardinality::Finite(n) => write!(f, "{n}"),
            Cardinality::Infinite => write!(f, "inf"),
            Cardinality::Unknown => write!(f, "?"),
        }
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Cardinality {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_i64(self.as_raw())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Cardinality {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = i64::deserialize(deserializer)?;
        Cardinality::try_from(raw).map_err(serde::de::Error::custom)
    }
}

/// Prefix sums of sub-sequence cardinalities.
///
/// Entry `i` holds the number of elements in sub-sequences `0..=i`. The table
/// stops at the first non-finite entry, since no later prefix can be finite.
/// It is never empty: a source without elements yields `[0]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CumulativeCardinalities {
    entries: Vec<Cardinality>,
}

impl CumulativeCardinalities {
    /// Builds the table, querying each cardinality lazily and in order. The
    /// iterator is not advanced past the first infinite or unknown cardinality.
    pub fn from_cardinalities<I>(cardinalities: I) -> Self
    where
        I: IntoIterator<Item = Cardinality>,
    {
        let cardinalities = cardinalities.into_iter();
        let mut entries = Vec::with_capacity(cardinalities.size_hint().0.max(1));
        for cardinality in cardinalities {
            let cumulative = match entries.last() {
                Some(previous) => Cardinality::checked_sum(*previous, cardinality),
                None => cardinality,
            };
            entries.push(cumulative);
            if !cumulative.is_finite() {
                break;
            }
        }
        if entries.is_empty() {
            entries.push(Cardinality::Finite(0));
        }
        CumulativeCardinalities { entries }
    }

    /// Total cardinality of the flattened sequence.
    pub fn total(&self) -> Cardinality {
        // never empty, see `from_cardinalities`
        self.entries[self.entries.len() - 1]
    }

    pub fn as_slice(&self) -> &[Cardinality] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the table stops at a sentinel rather than covering every
    /// sub-sequence with a finite count.
    pub fn is_truncated(&self) -> bool {
        !self.total().is_finite()
    }
}

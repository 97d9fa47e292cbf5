use std::error::Error;
use std::fmt;

/// Errors reported by the filter layers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum FilterError {
    /// The engine holds one fingerprint per slot and has no slot left.
    Full,
    /// The requested slot count would leave no remainder bits for the
    /// configured fingerprint width.
    CapacityExceeded,
    /// Zero remainder bits, or a quotient/remainder split wider than 64 bits.
    InvalidGeometry,
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterError::Full => write!(f, "quotient filter is full"),
            FilterError::CapacityExceeded => {
                write!(f, "fingerprint width cannot support the requested slot count")
            }
            FilterError::InvalidGeometry => write!(f, "invalid quotient/remainder geometry"),
        }
    }
}

impl Error for FilterError {}

//! Parsing of `:NUM:NORM:VALUE?` replies.
//!
//! A reply is a comma-separated list of decimals matched by position against
//! the active item list. Parsing never fails: whatever prefix parses cleanly is
//! kept, and [`Completeness`] records whether the reply covered every item and
//! why it stopped if it did not.

use crate::variable::MeasurementVariable;
use std::fmt;

/// Why a reply was only partially parsed.
#[derive(Debug, Clone, PartialEq)]
pub enum PartialReason {
    /// Reply was not valid UTF-8
    InvalidEncoding,
    /// Token at `position` is not a number
    InvalidNumber {
        /// Zero-based position in the reply
        position: usize,
        /// Offending token, trimmed
        token: String,
    },
    /// Fewer values than active items
    MissingValues {
        /// Active items
        expected: usize,
        /// Values in the reply
        received: usize,
    },
    /// More values than active items; the surplus is ignored
    ExtraValues {
        /// Active items
        expected: usize,
        /// Values in the reply
        received: usize,
    },
}

impl fmt::Display for PartialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartialReason::InvalidEncoding => f.write_str("reply is not valid UTF-8"),
            PartialReason::InvalidNumber { position, token } => {
                write!(f, "value {position} ({token:?}) is not a number")
            }
            PartialReason::MissingValues { expected, received } => {
                write!(f, "expected {expected} values, received {received}")
            }
            PartialReason::ExtraValues { expected, received } => {
                write!(f, "expected {expected} values, received {received} (surplus ignored)")
            }
        }
    }
}

/// Whether a reading covers every active item.
#[derive(Debug, Clone, PartialEq)]
pub enum Completeness {
    /// One value per item
    Complete,
    /// Parsing stopped early
    Partial(PartialReason),
}

/// Values of one measurement, in item order.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    values: Vec<(MeasurementVariable, f64)>,
    completeness: Completeness,
}

impl Reading {
    /// Parsed `(variable, value)` pairs in reply order.
    pub fn values(&self) -> &[(MeasurementVariable, f64)] {
        &self.values
    }

    /// Value of `variable`, if it was parsed.
    pub fn get(&self, variable: &str) -> Option<f64> {
        self.values
            .iter()
            .find(|(var, _)| var.display_name() == variable)
            .map(|(_, value)| *value)
    }

    /// Number of parsed values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when nothing was parsed.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// True when the reply covered every item.
    pub fn is_complete(&self) -> bool {
        self.completeness == Completeness::Complete
    }

    /// Completeness marker.
    pub fn completeness(&self) -> &Completeness {
        &self.completeness
    }

    /// Iterate `(identifier, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        self.values.iter().map(|(var, value)| (var.display_name(), *value))
    }
}

/// Parse a raw reply against the active item list.
pub fn parse_reading(raw: &[u8], variables: &[MeasurementVariable]) -> Reading {
    let text = match std::str::from_utf8(raw) {
        Ok(text) => text.trim(),
        Err(_) => {
            return Reading {
                values: Vec::new(),
                completeness: Completeness::Partial(PartialReason::InvalidEncoding),
            }
        }
    };

    let tokens: Vec<&str> = if text.is_empty() {
        Vec::new()
    } else {
        text.split(',').map(str::trim).collect()
    };

    let mut values = Vec::with_capacity(variables.len());
    for (position, token) in tokens.iter().enumerate() {
        let Some(variable) = variables.get(position) else {
            return Reading {
                values,
                completeness: Completeness::Partial(PartialReason::ExtraValues {
                    expected: variables.len(),
                    received: tokens.len(),
                }),
            };
        };
        match token.parse::<f64>() {
            Ok(value) => values.push((*variable, value)),
            Err(_) => {
                return Reading {
                    values,
                    completeness: Completeness::Partial(PartialReason::InvalidNumber {
                        position,
                        token: token.to_string(),
                    }),
                }
            }
        }
    }

    let completeness = if tokens.len() < variables.len() {
        Completeness::Partial(PartialReason::MissingValues {
            expected: variables.len(),
            received: tokens.len(),
        })
    } else {
        Completeness::Complete
    };

    Reading {
        values,
        completeness,
    }
}

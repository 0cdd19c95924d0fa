//! Measurement variables understood by the GPM-8213.
//!
//! The instrument reports up to 33 numeric items per `:NUM:NORM:VALUE?` reply.
//! Each item is selected by one of the identifiers in [`CATALOG`] (see the
//! numeric item table of the user manual). Identifiers are matched exactly and
//! case-sensitively: `URANge` is valid, `URANGE` is not.

use crate::error::{GpmError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Every identifier the instrument accepts for a numeric item slot.
pub static CATALOG: &[&str] = &[
    "U", "I", "P", "S", "Q", "LAMB", "PHI", "FU", "FI", "UPPeak", "UMPeak", "IPPeak", "IMPeak",
    "TIME", "WH", "WHP", "WHM", "AH", "AHP", "AHM", "PPPeak", "PMPeak", "CFU", "CFI", "UTHD",
    "ITHD", "URANge", "IRANge",
];

/// Static catalog of valid identifiers.
pub struct VariableCatalog;

impl VariableCatalog {
    /// Exact, case-sensitive membership test.
    pub fn is_valid(identifier: &str) -> bool {
        CATALOG.contains(&identifier)
    }

    /// All identifiers in catalog order.
    pub fn all() -> &'static [&'static str] {
        CATALOG
    }

    fn lookup(identifier: &str) -> Option<&'static str> {
        CATALOG.iter().copied().find(|id| *id == identifier)
    }
}

/// A single validated measurement quantity (voltage, current, power, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeasurementVariable(&'static str);

impl MeasurementVariable {
    /// Validate `identifier` against the catalog.
    pub fn new(identifier: &str) -> Result<Self> {
        VariableCatalog::lookup(identifier)
            .map(MeasurementVariable)
            .ok_or_else(|| GpmError::InvalidVariable(identifier.to_string()))
    }

    /// The identifier exactly as the instrument spells it.
    pub fn display_name(&self) -> &'static str {
        self.0
    }

    /// Validate a list of identifiers, failing on the first unknown one.
    pub fn parse_list<S: AsRef<str>>(identifiers: &[S]) -> Result<Vec<Self>> {
        identifiers
            .iter()
            .map(|id| Self::new(id.as_ref()))
            .collect()
    }
}

impl fmt::Display for MeasurementVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl FromStr for MeasurementVariable {
    type Err = GpmError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<&str> for MeasurementVariable {
    type Error = GpmError;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl Serialize for MeasurementVariable {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0)
    }
}

impl<'de> Deserialize<'de> for MeasurementVariable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::new(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_has_28_unique_entries() {
        assert_eq!(CATALOG.len(), 28);
        let mut sorted = CATALOG.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 28);
    }

    #[test]
    fn membership_is_exact_and_case_sensitive() {
        assert!(VariableCatalog::is_valid("URANge"));
        assert!(!VariableCatalog::is_valid("URANGE"));
        assert!(!VariableCatalog::is_valid("u"));
        assert!(!VariableCatalog::is_valid("U "));
        assert!(!VariableCatalog::is_valid("UI"));
        assert!(!VariableCatalog::is_valid(""));
    }

    #[test]
    fn rejects_identifiers_outside_catalog() {
        for bad in ["V", "lamb", "Phi", "WH,", "POWER", "IRANGE"] {
            match MeasurementVariable::new(bad) {
                Err(GpmError::InvalidVariable(id)) => assert_eq!(id, bad),
                other => panic!("expected InvalidVariable for {bad:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn display_returns_identifier_unchanged() {
        let var: MeasurementVariable = "PPPeak".parse().unwrap();
        assert_eq!(var.display_name(), "PPPeak");
        assert_eq!(var.to_string(), "PPPeak");
        assert_eq!(var, MeasurementVariable::new("PPPeak").unwrap());
    }

    #[test]
    fn parse_list_stops_at_first_unknown() {
        let err = MeasurementVariable::parse_list(&["U", "I", "nope", "also-bad"]).unwrap_err();
        assert!(matches!(err, GpmError::InvalidVariable(ref id) if id == "nope"));
    }

    #[test]
    fn deserializes_with_validation() {
        #[derive(Deserialize)]
        struct Wrapper {
            vars: Vec<MeasurementVariable>,
        }
        let ok: Wrapper = toml::from_str(r#"vars = ["U", "WH"]"#).unwrap();
        assert_eq!(ok.vars.len(), 2);
        assert!(toml::from_str::<Wrapper>(r#"vars = ["X"]"#).is_err());
    }
}

//! Mirrored device configuration.
//!
//! [`DeviceConfig`] holds the part of the instrument state the session has to
//! track to interpret replies: the numeric item list, the preset pattern, the
//! input mode and the input range. It is never mutated field by field. Every
//! setter validates its input and returns a [`Transition`], which pairs the
//! next configuration with the commands that bring the instrument there. The
//! session sends the commands and only then commits the new configuration.
//!
//! The three axes are independent:
//!
//! | Axis | Values | Commands |
//! |------|--------|----------|
//! | variable selection | custom list (pattern 0) or preset 1-4 | `NUMB` + `ITEM<k>`, or `PRES` |
//! | mode | DC, AC, ACDC | `:INPUT:MODE` |
//! | range | voltage/current keyed by crest factor | `:INP:VOLT:RANG`, `:INP:CURR:RANG` |

use crate::error::{GpmError, RangeAxis, Result};
use crate::protocol;
use crate::variable::MeasurementVariable;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The instrument rejects a 34th numeric item.
pub const MAX_VARIABLES: usize = 33;

/// Highest preset pattern number.
pub const MAX_PATTERN: u8 = 4;

// =============================================================================
// Mode
// =============================================================================

/// Input coupling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Mode {
    /// DC only
    Dc,
    /// AC only
    Ac,
    /// AC + DC
    #[default]
    AcDc,
}

impl Mode {
    /// Mnemonic used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Dc => "DC",
            Mode::Ac => "AC",
            Mode::AcDc => "ACDC",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = GpmError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "DC" => Ok(Mode::Dc),
            "AC" => Ok(Mode::Ac),
            "ACDC" => Ok(Mode::AcDc),
            other => Err(GpmError::InvalidMode(other.to_string())),
        }
    }
}

impl TryFrom<String> for Mode {
    type Error = GpmError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Mode> for String {
    fn from(mode: Mode) -> Self {
        mode.as_str().to_string()
    }
}

// =============================================================================
// Crest factor and input range
// =============================================================================

static CF3_VOLTAGES: &[f64] = &[15.0, 30.0, 60.0, 150.0, 300.0, 600.0];
static CF3_CURRENTS: &[f64] = &[
    0.005, 0.010, 0.020, 0.050, 0.100, 0.200, 0.500, 1.0, 2.0, 5.0, 10.0, 20.0,
];
static CF6_VOLTAGES: &[f64] = &[7.5, 15.0, 30.0, 75.0, 150.0, 300.0];
static CF6_CURRENTS: &[f64] = &[
    0.0025, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Crest factor selects the family of legal input ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrestFactor {
    /// CF = 3
    #[default]
    Three,
    /// CF = 6 (halved ranges)
    Six,
}

impl CrestFactor {
    /// Numeric value (3 or 6).
    pub fn value(&self) -> u8 {
        match self {
            CrestFactor::Three => 3,
            CrestFactor::Six => 6,
        }
    }

    /// Legal voltage ranges in volts.
    pub fn voltage_ranges(&self) -> &'static [f64] {
        match self {
            CrestFactor::Three => CF3_VOLTAGES,
            CrestFactor::Six => CF6_VOLTAGES,
        }
    }

    /// Legal current ranges in amps.
    pub fn current_ranges(&self) -> &'static [f64] {
        match self {
            CrestFactor::Three => CF3_CURRENTS,
            CrestFactor::Six => CF6_CURRENTS,
        }
    }

    /// Current ranges strictly below this are sent in milliamps.
    pub fn milliamp_threshold(&self) -> f64 {
        match self {
            CrestFactor::Three => 1.0,
            CrestFactor::Six => 0.5,
        }
    }
}

impl TryFrom<u8> for CrestFactor {
    type Error = GpmError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            3 => Ok(CrestFactor::Three),
            6 => Ok(CrestFactor::Six),
            other => Err(GpmError::InvalidCrestFactor(other)),
        }
    }
}

/// Find `value` in a legal range table, returning the table's canonical entry.
fn snap(value: f64, legal: &'static [f64]) -> Option<f64> {
    legal
        .iter()
        .copied()
        .find(|candidate| (candidate - value).abs() <= candidate * 1e-9)
}

/// Validated voltage/current range pair for one crest factor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputRange {
    current: f64,
    voltage: f64,
    crest_factor: CrestFactor,
}

impl InputRange {
    /// Validate a range triple.
    ///
    /// The crest factor is checked first, then voltage, then current.
    pub fn new(current: f64, voltage: f64, crest_factor: u8) -> Result<Self> {
        let cf = CrestFactor::try_from(crest_factor)?;
        let voltage = snap(voltage, cf.voltage_ranges()).ok_or(GpmError::InvalidRange {
            axis: RangeAxis::Voltage,
            value: voltage,
            crest_factor,
            legal: cf.voltage_ranges(),
        })?;
        let current = snap(current, cf.current_ranges()).ok_or(GpmError::InvalidRange {
            axis: RangeAxis::Current,
            value: current,
            crest_factor,
            legal: cf.current_ranges(),
        })?;
        Ok(Self {
            current,
            voltage,
            crest_factor: cf,
        })
    }

    /// Current range in amps.
    pub fn current(&self) -> f64 {
        self.current
    }

    /// Voltage range in volts.
    pub fn voltage(&self) -> f64 {
        self.voltage
    }

    /// Crest factor the range was validated against.
    pub fn crest_factor(&self) -> CrestFactor {
        self.crest_factor
    }
}

impl Default for InputRange {
    fn default() -> Self {
        Self {
            current: 10.0,
            voltage: 600.0,
            crest_factor: CrestFactor::Three,
        }
    }
}

// =============================================================================
// Preset patterns
// =============================================================================

const PATTERN_1: &[&str] = &["U", "I", "P"];
const PATTERN_2_EXTRA: &[&str] = &["S", "Q", "LAMB", "PHI", "FU", "FI"];
const PATTERN_3_EXTRA: &[&str] = &["UPPeak", "UMPeak", "IPPeak", "IMPeak", "PPPeak", "PMPeak"];
const PATTERN_4_REPLACED: &[(usize, &str)] = &[(13, "TIME"), (14, "WH")];
const PATTERN_4_EXTRA: &[&str] = &[
    "WHP", "WHM", "AH", "AHP", "AHM", "PPPeak", "PMPeak", "CFU", "CFI", "UTHD", "ITHD", "URANge",
    "IRANge",
];

/// Item list the instrument uses for preset `pattern`.
///
/// Each preset extends the previous one; preset 4 additionally moves the
/// power peaks behind the integration items.
pub fn pattern_variables(pattern: u8) -> Result<Vec<MeasurementVariable>> {
    if !(1..=MAX_PATTERN).contains(&pattern) {
        return Err(GpmError::InvalidPattern(pattern));
    }

    let mut names: Vec<&str> = PATTERN_1.to_vec();
    if pattern >= 2 {
        names.extend_from_slice(PATTERN_2_EXTRA);
    }
    if pattern >= 3 {
        names.extend_from_slice(PATTERN_3_EXTRA);
    }
    if pattern >= 4 {
        for &(index, name) in PATTERN_4_REPLACED {
            names[index] = name;
        }
        names.extend_from_slice(PATTERN_4_EXTRA);
    }

    names.into_iter().map(MeasurementVariable::new).collect()
}

// =============================================================================
// Configuration state
// =============================================================================

/// How the numeric item list is chosen.
#[derive(Debug, Clone, PartialEq)]
pub enum VariableSelection {
    /// Explicit list, written slot by slot
    Custom(Vec<MeasurementVariable>),
    /// Instrument preset 1-4
    Pattern(u8),
}

impl Default for VariableSelection {
    fn default() -> Self {
        VariableSelection::Pattern(MAX_PATTERN)
    }
}

/// Next configuration plus the commands that produce it on the instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// State to commit once every command was sent
    pub next: DeviceConfig,
    /// Commands, in order, each terminated
    pub commands: Vec<String>,
}

/// Local mirror of the instrument configuration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeviceConfig {
    variables: Vec<MeasurementVariable>,
    pattern: u8,
    mode: Option<Mode>,
    range: Option<InputRange>,
}

impl DeviceConfig {
    /// Active items in reply order.
    pub fn variables(&self) -> &[MeasurementVariable] {
        &self.variables
    }

    /// 0 for a custom list, 1-4 for a preset.
    pub fn pattern(&self) -> u8 {
        self.pattern
    }

    /// Input mode, `None` until one was sent.
    pub fn mode(&self) -> Option<Mode> {
        self.mode
    }

    /// Input range, `None` until one was sent.
    pub fn range(&self) -> Option<InputRange> {
        self.range
    }

    /// Replace the whole item list.
    pub fn set_variables(&self, variables: Vec<MeasurementVariable>) -> Result<Transition> {
        check_list(&variables)?;

        let mut commands = Vec::with_capacity(variables.len() + 1);
        commands.push(protocol::item_count(variables.len()));
        commands.extend(
            variables
                .iter()
                .enumerate()
                .map(|(index, var)| protocol::item(index + 1, *var)),
        );

        Ok(Transition {
            next: DeviceConfig {
                variables,
                pattern: 0,
                ..self.clone()
            },
            commands,
        })
    }

    /// Append one item, writing only the new slot.
    pub fn add_variable(&self, variable: MeasurementVariable) -> Result<Transition> {
        let mut variables = self.variables.clone();
        variables.push(variable);
        check_list(&variables)?;

        let slot = variables.len();
        Ok(Transition {
            commands: vec![protocol::item(slot, variable), protocol::item_count(slot)],
            next: DeviceConfig {
                variables,
                pattern: 0,
                ..self.clone()
            },
        })
    }

    /// Append several items and rewrite the full list.
    pub fn add_variables(&self, extra: &[MeasurementVariable]) -> Result<Transition> {
        let mut variables = self.variables.clone();
        variables.extend_from_slice(extra);
        self.set_variables(variables)
    }

    /// Switch to a preset pattern.
    pub fn set_pattern(&self, pattern: u8) -> Result<Transition> {
        let variables = pattern_variables(pattern)?;
        Ok(Transition {
            next: DeviceConfig {
                variables,
                pattern,
                ..self.clone()
            },
            commands: vec![protocol::preset(pattern)],
        })
    }

    /// Apply either selection form.
    pub fn select(&self, selection: &VariableSelection) -> Result<Transition> {
        match selection {
            VariableSelection::Custom(list) => self.set_variables(list.clone()),
            VariableSelection::Pattern(pattern) => self.set_pattern(*pattern),
        }
    }

    /// Change the input mode.
    pub fn set_mode(&self, mode: Mode) -> Transition {
        Transition {
            next: DeviceConfig {
                mode: Some(mode),
                ..self.clone()
            },
            commands: vec![protocol::input_mode(mode)],
        }
    }

    /// Change the input range; voltage is sent before current.
    pub fn set_range(&self, current: f64, voltage: f64, crest_factor: u8) -> Result<Transition> {
        let range = InputRange::new(current, voltage, crest_factor)?;
        Ok(self.set_input_range(range))
    }

    /// Apply an already validated range.
    pub fn set_input_range(&self, range: InputRange) -> Transition {
        Transition {
            commands: vec![protocol::voltage_range(&range), protocol::current_range(&range)],
            next: DeviceConfig {
                range: Some(range),
                ..self.clone()
            },
        }
    }
}

fn check_list(variables: &[MeasurementVariable]) -> Result<()> {
    if variables.len() > MAX_VARIABLES {
        return Err(GpmError::TooManyVariables {
            count: variables.len(),
            max: MAX_VARIABLES,
        });
    }
    for (index, var) in variables.iter().enumerate() {
        if variables[..index].contains(var) {
            return Err(GpmError::DuplicateVariable(var.to_string()));
        }
    }
    Ok(())
}

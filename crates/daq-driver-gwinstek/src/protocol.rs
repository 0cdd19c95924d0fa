//! Wire commands of the GPM-8213 remote interface.
//!
//! Every command is ASCII and terminated by `\r\n`. Replies are single lines
//! ending in `\n` (the instrument sends `\r\n`).

use crate::device::{InputRange, Mode};
use crate::variable::MeasurementVariable;

/// Line terminator appended to every command.
pub const TERMINATOR: &str = "\r\n";

/// Reply frame delimiter.
pub const REPLY_DELIMITER: u8 = b'\n';

/// Default control port (Telnet).
pub const DEFAULT_PORT: u16 = 23;

/// Default connect/read timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// Default receive buffer exponent (2^9 = 512 bytes).
pub const DEFAULT_BUFFER_EXPONENT: u32 = 9;

/// Identity query.
pub const IDENTIFY: &str = "*IDN?\r\n";

/// Hand the front panel back to the operator.
pub const RELEASE_REMOTE: &str = ":COMM:REM 0\r\n";

/// Query the values of the active numeric items.
pub const VALUE_QUERY: &str = ":NUM:NORM:VALUE?\r\n";

/// `:NUM:NORM:NUMB <n>`
pub fn item_count(count: usize) -> String {
    format!(":NUM:NORM:NUMB {count}{TERMINATOR}")
}

/// `:NUM:NORM:ITEM<k> <name>`, slots are 1-indexed.
pub fn item(slot: usize, variable: MeasurementVariable) -> String {
    format!(":NUM:NORM:ITEM{slot} {variable}{TERMINATOR}")
}

/// `:NUM:NORM:PRES <n>`
pub fn preset(pattern: u8) -> String {
    format!(":NUM:NORM:PRES {pattern}{TERMINATOR}")
}

/// `:INPUT:MODE <DC|AC|ACDC>`
pub fn input_mode(mode: Mode) -> String {
    format!(":INPUT:MODE {mode}{TERMINATOR}")
}

/// `:INP:VOLT:RANG <v>V`
pub fn voltage_range(range: &InputRange) -> String {
    format!(":INP:VOLT:RANG {}V{TERMINATOR}", range.voltage())
}

/// `:INP:CURR:RANG <i>A` or `<i>mA`.
///
/// Ranges below the crest factor's milliamp threshold must be sent in mA.
pub fn current_range(range: &InputRange) -> String {
    let current = range.current();
    if current < range.crest_factor().milliamp_threshold() {
        let milliamps = (current * 10_000.0).round() / 10.0;
        format!(":INP:CURR:RANG {milliamps}mA{TERMINATOR}")
    } else {
        format!(":INP:CURR:RANG {current}A{TERMINATOR}")
    }
}

//! Timestamped readings and their time integrals.

use chrono::{DateTime, Utc};
use daq_driver_gwinstek::Reading;
use serde::Serialize;
use std::collections::BTreeMap;

/// One reading from one instrument.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    /// When the round that produced the reading started
    pub timestamp: DateTime<Utc>,
    /// Instrument label, `identity,host,port`
    pub instrument: String,
    /// Parsed values by item identifier
    pub values: BTreeMap<String, f64>,
    /// True when the reply did not cover every active item
    pub partial: bool,
}

impl Sample {
    /// Build a sample from a parsed reading.
    pub fn from_reading(timestamp: DateTime<Utc>, instrument: impl Into<String>, reading: &Reading) -> Self {
        Self {
            timestamp,
            instrument: instrument.into(),
            values: reading
                .iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
            partial: !reading.is_complete(),
        }
    }
}

/// Time integral of every variable of one instrument over a sampling run.
///
/// Values are in the variable's unit times seconds (`P` in W gives J).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Integral {
    /// Instrument label
    pub instrument: String,
    /// First sample time
    pub start: DateTime<Utc>,
    /// Last sample time
    pub end: DateTime<Utc>,
    /// Integral by item identifier
    pub values: BTreeMap<String, f64>,
}

/// Trapezoidal integrals, one per instrument, in order of first appearance.
///
/// A segment only contributes to a variable when both of its end samples
/// carry that variable. Instruments with a single sample integrate to zero.
pub fn integrate(samples: &[Sample]) -> Vec<Integral> {
    let mut order: Vec<&str> = Vec::new();
    let mut series: BTreeMap<&str, Vec<&Sample>> = BTreeMap::new();
    for sample in samples {
        let entry = series.entry(sample.instrument.as_str()).or_default();
        if entry.is_empty() {
            order.push(sample.instrument.as_str());
        }
        entry.push(sample);
    }

    order
        .into_iter()
        .filter_map(|instrument| {
            let points = series.get(instrument)?;
            let first = points.first()?;
            let last = points.last()?;

            let mut values: BTreeMap<String, f64> = points
                .iter()
                .flat_map(|sample| sample.values.keys())
                .map(|name| (name.clone(), 0.0))
                .collect();

            for pair in points.windows(2) {
                let (a, b) = (pair[0], pair[1]);
                let dt = (b.timestamp - a.timestamp)
                    .to_std()
                    .map(|d| d.as_secs_f64())
                    .unwrap_or(0.0);
                for (name, total) in values.iter_mut() {
                    if let (Some(va), Some(vb)) = (a.values.get(name), b.values.get(name)) {
                        *total += (va + vb) / 2.0 * dt;
                    }
                }
            }

            Some(Integral {
                instrument: instrument.to_string(),
                start: first.timestamp,
                end: last.timestamp,
                values,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    fn sample(instrument: &str, seconds: i64, values: &[(&str, f64)]) -> Sample {
        Sample {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + TimeDelta::seconds(seconds),
            instrument: instrument.into(),
            values: values.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            partial: false,
        }
    }

    #[test]
    fn ramp_integrates_to_triangle_area() {
        let samples = vec![
            sample("a", 0, &[("P", 0.0)]),
            sample("a", 1, &[("P", 10.0)]),
            sample("a", 2, &[("P", 20.0)]),
        ];
        let integrals = integrate(&samples);
        assert_eq!(integrals.len(), 1);
        assert_eq!(integrals[0].values["P"], 20.0);
        assert_eq!((integrals[0].end - integrals[0].start).num_seconds(), 2);
    }

    #[test]
    fn instruments_are_integrated_separately() {
        let samples = vec![
            sample("b", 0, &[("U", 230.0)]),
            sample("a", 0, &[("U", 1.0)]),
            sample("b", 2, &[("U", 230.0)]),
            sample("a", 2, &[("U", 3.0)]),
        ];
        let integrals = integrate(&samples);
        let labels: Vec<_> = integrals.iter().map(|i| i.instrument.as_str()).collect();
        assert_eq!(labels, ["b", "a"]);
        assert_eq!(integrals[0].values["U"], 460.0);
        assert_eq!(integrals[1].values["U"], 4.0);
    }

    #[test]
    fn gaps_skip_segments() {
        let samples = vec![
            sample("a", 0, &[("P", 4.0), ("I", 1.0)]),
            sample("a", 1, &[("P", 4.0)]),
            sample("a", 2, &[("P", 4.0), ("I", 1.0)]),
        ];
        let integrals = integrate(&samples);
        assert_eq!(integrals[0].values["P"], 8.0);
        assert_eq!(integrals[0].values["I"], 0.0);
    }

    #[test]
    fn single_sample_integrates_to_zero() {
        let integrals = integrate(&[sample("a", 0, &[("P", 100.0)])]);
        assert_eq!(integrals[0].values["P"], 0.0);
        assert!(integrate(&[]).is_empty());
    }

    #[test]
    fn serializes_as_json_object() {
        let json = serde_json::to_value(sample("GPM,h,23", 0, &[("U", 1.5)])).unwrap();
        assert_eq!(json["instrument"], "GPM,h,23");
        assert_eq!(json["values"]["U"], 1.5);
        assert_eq!(json["partial"], false);
    }
}

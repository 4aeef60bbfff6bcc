//! Inbound sensor reading.
//!
//! Readings arrive already normalized: timestamps are UTC and transport-level
//! validation has been done upstream. [`Reading::validate_reading`] only checks
//! the structural preconditions the aggregation core relies on.

use super::histogram::RainHistogram;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

/// Scalar metric carried by a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Air temperature.
    Temperature,
    /// Relative humidity.
    Humidity,
    /// Barometric pressure.
    Pressure,
}

impl MetricKind {
    /// All metric kinds, in storage order.
    pub const ALL: [Self; 3] = [Self::Temperature, Self::Humidity, Self::Pressure];
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Temperature => write!(f, "temperature"),
            Self::Humidity => write!(f, "humidity"),
            Self::Pressure => write!(f, "pressure"),
        }
    }
}

/// One reading from one device.
///
/// # Example
///
/// ```
/// use shared::models::Reading;
/// use shared::chrono::{TimeZone, Utc};
///
/// let reading = Reading::new("station-1", Utc.with_ymd_and_hms(2025, 8, 14, 15, 0, 0).unwrap())
///     .with_temperature(21.5)
///     .with_humidity(40.0);
///
/// assert!(reading.validate_reading().is_ok());
/// assert_eq!(reading.source_id(), "station-1@2025-08-14T15:00:00Z");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Reading {
    /// Reporting device.
    #[validate(length(min = 1, message = "Device id cannot be empty"))]
    pub device_id: String,

    /// Identifier of the raw event this reading came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,

    /// Event time (UTC).
    pub timestamp: DateTime<Utc>,

    /// Temperature, if measured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// Humidity, if measured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,

    /// Pressure, if measured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f64>,

    /// Rain histogram, if the device has a rain gauge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub rain: Option<RainHistogram>,
}

/// Errors that can occur during reading validation.
#[derive(Debug, Error)]
pub enum ReadingValidationError {
    /// Validation failed with details.
    #[error("Validation failed: {0}")]
    ValidationError(#[from] validator::ValidationErrors),
}

impl Reading {
    /// Creates a reading with no measurements.
    #[must_use]
    pub fn new(device_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            device_id: device_id.into(),
            source_id: None,
            timestamp,
            temperature: None,
            humidity: None,
            pressure: None,
            rain: None,
        }
    }

    /// Sets the raw event id.
    #[must_use]
    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    /// Sets the temperature.
    #[must_use]
    pub fn with_temperature(mut self, value: f64) -> Self {
        self.temperature = Some(value);
        self
    }

    /// Sets the humidity.
    #[must_use]
    pub fn with_humidity(mut self, value: f64) -> Self {
        self.humidity = Some(value);
        self
    }

    /// Sets the pressure.
    #[must_use]
    pub fn with_pressure(mut self, value: f64) -> Self {
        self.pressure = Some(value);
        self
    }

    /// Attaches a rain histogram.
    #[must_use]
    pub fn with_rain(mut self, histogram: RainHistogram) -> Self {
        self.rain = Some(histogram);
        self
    }

    /// Idempotency key for this reading.
    ///
    /// Falls back to `"{device_id}@{timestamp}"` when no raw event id was given.
    #[must_use]
    pub fn source_id(&self) -> String {
        self.source_id.clone().unwrap_or_else(|| {
            format!(
                "{}@{}",
                self.device_id,
                self.timestamp
                    .to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true)
            )
        })
    }

    /// Returns the value of one metric.
    #[must_use]
    pub const fn metric(&self, kind: MetricKind) -> Option<f64> {
        match kind {
            MetricKind::Temperature => self.temperature,
            MetricKind::Humidity => self.humidity,
            MetricKind::Pressure => self.pressure,
        }
    }

    /// Iterates over the metrics present on this reading.
    pub fn metric_values(&self) -> impl Iterator<Item = (MetricKind, f64)> + '_ {
        MetricKind::ALL
            .into_iter()
            .filter_map(|kind| self.metric(kind).map(|v| (kind, v)))
    }

    /// Validates the structural preconditions of the reading.
    ///
    /// # Errors
    ///
    /// Returns an error if the device id is empty, the rain interval is zero,
    /// or the value per unit is negative.
    pub fn validate_reading(&self) -> Result<(), ReadingValidationError> {
        self.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 14, 15, 20, 0).unwrap()
    }

    #[test]
    fn test_metric_values_skips_missing() {
        let reading = Reading::new("dev", ts()).with_temperature(20.0).with_pressure(1013.0);
        let values: Vec<_> = reading.metric_values().collect();
        assert_eq!(
            values,
            vec![(MetricKind::Temperature, 20.0), (MetricKind::Pressure, 1013.0)]
        );
    }

    #[test]
    fn test_explicit_source_id_wins() {
        let reading = Reading::new("dev", ts()).with_source_id("raw-42");
        assert_eq!(reading.source_id(), "raw-42");
    }

    #[test]
    fn test_empty_device_id_fails_validation() {
        let reading = Reading::new("", ts());
        assert!(reading.validate_reading().is_err());
    }

    #[test]
    fn test_nested_rain_histogram_is_validated() {
        let hist = RainHistogram::from_counts(&[1], 60, ts(), -0.2);
        let reading = Reading::new("dev", ts()).with_rain(hist);
        assert!(reading.validate_reading().is_err());
    }

    #[test]
    fn test_offset_timestamp_is_normalized_on_deserialize() {
        let json = r#"{"device_id": "dev", "timestamp": "2025-09-11T00:15:00+02:00"}"#;
        let reading: Reading = serde_json::from_str(json).unwrap();
        assert_eq!(reading.timestamp, Utc.with_ymd_and_hms(2025, 9, 10, 22, 15, 0).unwrap());
    }

    #[test]
    fn test_rain_histogram_on_the_wire() {
        let json = r#"{
            "device_id": "dev",
            "timestamp": "2025-08-14T15:30:00Z",
            "rain": {
                "unit_counts": {"0": 1, "3": 2},
                "interval_seconds": 120,
                "start_time": "2025-08-14T15:18:00Z",
                "value_per_unit": 0.2
            }
        }"#;
        let reading: Reading = serde_json::from_str(json).unwrap();
        let rain = reading.rain.unwrap();
        assert_eq!(rain.interval_seconds, 120);
        assert_eq!(rain.total_units(), 3);
        assert_eq!(rain.value_per_unit, 0.2);
    }
}

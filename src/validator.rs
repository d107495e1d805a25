use crate::db::models::WeatherRecord;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationStatus {
    Ok,
    /// Column names of the absent or empty attributes.
    MissingFields(Vec<&'static str>),
}

impl ValidationStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, ValidationStatus::Ok)
    }
}

pub struct Validator;

impl Validator {
    /// Check that every attribute of `record` is present.
    ///
    /// Advisory only: the record is never modified, and the caller decides
    /// whether a flagged record is still loaded.
    pub fn validate(record: &WeatherRecord) -> ValidationStatus {
        let missing = missing_fields(record);

        if missing.is_empty() {
            return ValidationStatus::Ok;
        }

        warn!(
            "Missing values detected for {} (id {}): {}",
            record.city,
            record.id,
            missing.join(", ")
        );
        ValidationStatus::MissingFields(missing)
    }
}

fn missing_fields(record: &WeatherRecord) -> Vec<&'static str> {
    let checks = [
        ("city", record.city.trim().is_empty()),
        ("temperature", record.temperature_c.is_none()),
        ("wind_speed", record.wind_kph.is_none()),
        (
            "condition",
            record
                .condition_text
                .as_deref()
                .map_or(true, |text| text.trim().is_empty()),
        ),
        ("precipitation", record.precipitation_mm.is_none()),
        ("humidity", record.humidity_pct.is_none()),
        ("feels_like_temp", record.feels_like_c.is_none()),
        ("pressure", record.pressure_mb.is_none()),
        ("visibility", record.visibility_km.is_none()),
        ("is_day", record.is_day.is_none()),
        ("id", record.id.is_empty()),
    ];

    checks
        .into_iter()
        .filter_map(|(name, missing)| missing.then_some(name))
        .collect()
}

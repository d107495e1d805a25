use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// One current-conditions observation for one city.
///
/// Measurement fields are `None` when the provider sent an explicit `null`;
/// the validator flags such records.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherRecord {
    pub city: String,
    pub temperature_c: Option<f64>,
    pub wind_kph: Option<f64>,
    pub condition_text: Option<String>,
    pub precipitation_mm: Option<f64>,
    pub humidity_pct: Option<i32>,
    pub feels_like_c: Option<f64>,
    pub pressure_mb: Option<f64>,
    pub visibility_km: Option<f64>,
    pub is_day: Option<bool>,
    pub observed_at: DateTime<Utc>,
    pub id: String,
}

/// Separator between the components of a record id.
pub const ID_SEPARATOR: char = '-';

impl WeatherRecord {
    /// Derive the record id from capture time, city and temperature.
    ///
    /// Format: `YYYY-MM-DD HH:MM:SS.ffffff-{city}-{temperature}`. The
    /// temperature always carries a fractional digit (`21.0`, not `21`).
    pub fn compute_id(
        observed_at: &DateTime<Utc>,
        city: &str,
        temperature_c: Option<f64>,
    ) -> String {
        format!(
            "{}{sep}{}{sep}{}",
            observed_at.format("%Y-%m-%d %H:%M:%S%.6f"),
            city,
            format_temperature(temperature_c),
            sep = ID_SEPARATOR
        )
    }
}

fn format_temperature(value: Option<f64>) -> String {
    match value {
        None => "nan".to_string(),
        Some(v) if v.is_finite() && v.fract() == 0.0 => format!("{:.1}", v),
        Some(v) => v.to_string(),
    }
}

/// Records accumulated during one batch pass, in city-list order.
#[derive(Debug, Clone, Default)]
pub struct CityBatch {
    records: Vec<WeatherRecord>,
}

impl CityBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: WeatherRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[WeatherRecord] {
        &self.records
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

impl From<Vec<WeatherRecord>> for CityBatch {
    fn from(records: Vec<WeatherRecord>) -> Self {
        Self { records }
    }
}

/// A persisted `data_weather` row as read back from the store.
#[derive(Debug, Clone, FromRow)]
pub struct StoredObservation {
    pub id: String,
    pub city: String,
    pub temperature: Option<f64>,
    pub wind_speed: Option<f64>,
    pub condition: Option<String>,
    pub precipitation: Option<f64>,
    pub humidity: Option<i32>,
    pub feels_like_temp: Option<f64>,
    pub pressure: Option<f64>,
    pub visibility: Option<f64>,
    pub is_day: Option<bool>,
    pub timestamp: DateTime<Utc>,
}

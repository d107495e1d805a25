use crate::db::models::WeatherRecord;
use crate::error::SchemaError;
use crate::fetcher::RawPayload;
use chrono::{DateTime, SubsecRound, Utc};
use serde::Deserialize;

const HUMIDITY_RANGE: (i64, i64) = (0, 100);

// Every field is required but may be null: `Option::deserialize` turns a
// null into `None` while a missing key still fails the decode.
#[derive(Debug, Deserialize)]
struct WaCondition {
    #[serde(deserialize_with = "Option::deserialize")]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WaCurrent {
    #[serde(deserialize_with = "Option::deserialize")]
    temp_c: Option<f64>,
    #[serde(deserialize_with = "Option::deserialize")]
    wind_kph: Option<f64>,
    #[serde(deserialize_with = "Option::deserialize")]
    condition: Option<WaCondition>,
    #[serde(deserialize_with = "Option::deserialize")]
    precip_mm: Option<f64>,
    #[serde(deserialize_with = "Option::deserialize")]
    humidity: Option<i64>,
    #[serde(deserialize_with = "Option::deserialize")]
    feelslike_c: Option<f64>,
    #[serde(deserialize_with = "Option::deserialize")]
    pressure_mb: Option<f64>,
    #[serde(deserialize_with = "Option::deserialize")]
    vis_km: Option<f64>,
    #[serde(deserialize_with = "Option::deserialize")]
    is_day: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct WaResponse {
    current: WaCurrent,
}

pub struct Transformer;

impl Transformer {
    /// Map a provider payload onto a [`WeatherRecord`].
    ///
    /// Every key under `current` must be present. An explicit `null` becomes an
    /// absent attribute for the validator to flag; a missing key or a value of
    /// the wrong type is a [`SchemaError`]. `capture_time` is truncated to
    /// microseconds before the id is derived, so the id matches what the store
    /// can hold.
    pub fn transform(
        raw: &RawPayload,
        city: &str,
        capture_time: DateTime<Utc>,
    ) -> Result<WeatherRecord, SchemaError> {
        let response = WaResponse::deserialize(raw).map_err(schema_error)?;
        let current = response.current;

        let humidity_pct = current
            .humidity
            .map(|h| check_range("current.humidity", h, HUMIDITY_RANGE))
            .transpose()?;

        let observed_at = capture_time.trunc_subsecs(6);
        let id = WeatherRecord::compute_id(&observed_at, city, current.temp_c);

        Ok(WeatherRecord {
            city: city.to_string(),
            temperature_c: current.temp_c,
            wind_kph: current.wind_kph,
            condition_text: current.condition.and_then(|c| c.text),
            precipitation_mm: current.precip_mm,
            humidity_pct,
            feels_like_c: current.feelslike_c,
            pressure_mb: current.pressure_mb,
            visibility_km: current.vis_km,
            is_day: current.is_day.map(|flag| flag != 0),
            observed_at,
            id,
        })
    }
}

/// Name the JSON path of a missing key; anything else keeps the decoder message.
fn schema_error(err: serde_json::Error) -> SchemaError {
    let message = err.to_string();
    let missing = message
        .strip_prefix("missing field `")
        .and_then(|rest| rest.split('`').next());

    match missing {
        Some("current") => SchemaError::MissingField("current".to_string()),
        Some("text") => SchemaError::MissingField("current.condition.text".to_string()),
        Some(field) => SchemaError::MissingField(format!("current.{}", field)),
        None => SchemaError::Invalid(message),
    }
}

fn check_range(path: &str, value: i64, (min, max): (i64, i64)) -> Result<i32, SchemaError> {
    if value < min || value > max {
        return Err(SchemaError::OutOfRange {
            field: path.to_string(),
            value,
            min,
            max,
        });
    }
    // bounded by the range check above
    Ok(value as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::{json, Value};

    fn capture_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 10, 15, 0, 0).unwrap()
            + chrono::Duration::nanoseconds(123_456_789)
    }

    fn sample_payload() -> Value {
        json!({
            "location": { "name": "Curitiba", "country": "Brazil" },
            "current": {
                "temp_c": 21.5,
                "wind_kph": 11.2,
                "condition": { "text": "Partly cloudy", "code": 1003 },
                "precip_mm": 0.1,
                "humidity": 78,
                "feelslike_c": 21.5,
                "pressure_mb": 1017.0,
                "vis_km": 10.0,
                "is_day": 1
            }
        })
    }

    #[test]
    fn test_transform_maps_all_fields() {
        let record = Transformer::transform(&sample_payload(), "Curitiba", capture_time()).unwrap();

        assert_eq!(record.city, "Curitiba");
        assert_eq!(record.temperature_c, Some(21.5));
        assert_eq!(record.wind_kph, Some(11.2));
        assert_eq!(record.condition_text.as_deref(), Some("Partly cloudy"));
        assert_eq!(record.precipitation_mm, Some(0.1));
        assert_eq!(record.humidity_pct, Some(78));
        assert_eq!(record.feels_like_c, Some(21.5));
        assert_eq!(record.pressure_mb, Some(1017.0));
        assert_eq!(record.visibility_km, Some(10.0));
        assert_eq!(record.is_day, Some(true));
    }

    #[test]
    fn test_transform_truncates_capture_time_to_micros() {
        let record = Transformer::transform(&sample_payload(), "Curitiba", capture_time()).unwrap();
        assert_eq!(record.observed_at.timestamp_subsec_nanos(), 123_456_000);
        assert_eq!(record.id, "2025-04-10 15:00:00.123456-Curitiba-21.5");
    }

    #[test]
    fn test_transform_is_deterministic() {
        let payload = sample_payload();
        let a = Transformer::transform(&payload, "Curitiba", capture_time()).unwrap();
        let b = Transformer::transform(&payload, "Curitiba", capture_time()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_transform_is_day_flag() {
        let mut payload = sample_payload();
        payload["current"]["is_day"] = json!(0);
        let record = Transformer::transform(&payload, "Curitiba", capture_time()).unwrap();
        assert_eq!(record.is_day, Some(false));

        payload["current"]["is_day"] = json!(1);
        let record = Transformer::transform(&payload, "Curitiba", capture_time()).unwrap();
        assert_eq!(record.is_day, Some(true));
    }

    #[test]
    fn test_transform_integral_number_as_float() {
        let mut payload = sample_payload();
        payload["current"]["temp_c"] = json!(28);
        let record = Transformer::transform(&payload, "Salvador", capture_time()).unwrap();
        assert_eq!(record.temperature_c, Some(28.0));
        assert!(record.id.ends_with("-Salvador-28.0"));
    }

    #[test]
    fn test_transform_null_becomes_absent() {
        let mut payload = sample_payload();
        payload["current"]["vis_km"] = Value::Null;
        payload["current"]["condition"]["text"] = Value::Null;

        let record = Transformer::transform(&payload, "Curitiba", capture_time()).unwrap();
        assert_eq!(record.visibility_km, None);
        assert_eq!(record.condition_text, None);
    }

    #[test]
    fn test_transform_missing_key_is_schema_error() {
        let mut payload = sample_payload();
        payload["current"]
            .as_object_mut()
            .unwrap()
            .remove("pressure_mb");

        let err = Transformer::transform(&payload, "Curitiba", capture_time()).unwrap_err();
        assert_eq!(err, SchemaError::MissingField("current.pressure_mb".to_string()));
    }

    #[test]
    fn test_transform_missing_current_block() {
        let payload = json!({ "location": { "name": "Curitiba" } });
        let err = Transformer::transform(&payload, "Curitiba", capture_time()).unwrap_err();
        assert_eq!(err, SchemaError::MissingField("current".to_string()));
    }

    #[test]
    fn test_transform_missing_condition_text() {
        let mut payload = sample_payload();
        payload["current"]["condition"] = json!({ "code": 1003 });
        let err = Transformer::transform(&payload, "Curitiba", capture_time()).unwrap_err();
        assert_eq!(
            err,
            SchemaError::MissingField("current.condition.text".to_string())
        );
    }

    #[test]
    fn test_transform_wrong_type() {
        let mut payload = sample_payload();
        payload["current"]["temp_c"] = json!("hot");
        let err = Transformer::transform(&payload, "Curitiba", capture_time()).unwrap_err();
        match err {
            SchemaError::Invalid(message) => {
                assert!(message.contains("invalid type"), "{}", message)
            }
            other => panic!("Expected Invalid, got: {:?}", other),
        }
    }

    #[test]
    fn test_transform_current_not_an_object() {
        let payload = json!({ "current": "unavailable" });
        let err = Transformer::transform(&payload, "Curitiba", capture_time()).unwrap_err();
        assert!(matches!(err, SchemaError::Invalid(_)), "got {:?}", err);
    }

    #[test]
    fn test_transform_null_condition_block() {
        let mut payload = sample_payload();
        payload["current"]["condition"] = Value::Null;
        let record = Transformer::transform(&payload, "Curitiba", capture_time()).unwrap();
        assert_eq!(record.condition_text, None);
    }

    #[test]
    fn test_transform_fractional_humidity_is_rejected() {
        let mut payload = sample_payload();
        payload["current"]["humidity"] = json!(78.5);
        let err = Transformer::transform(&payload, "Curitiba", capture_time()).unwrap_err();
        assert!(matches!(err, SchemaError::Invalid(_)), "got {:?}", err);
    }

    #[test]
    fn test_transform_humidity_out_of_range() {
        let mut payload = sample_payload();
        payload["current"]["humidity"] = json!(140);
        let err = Transformer::transform(&payload, "Curitiba", capture_time()).unwrap_err();
        assert!(matches!(err, SchemaError::OutOfRange { value: 140, .. }));
    }
}

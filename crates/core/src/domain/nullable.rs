//! Serde helpers for nullable upstream fields.
//!
//! Providers spell "no value" in several ways (`null`, a missing key, `""`, `"N/A"`). All of
//! them decode to `None`, and `None` always encodes as JSON `null`. Anything else that is not
//! a number is rejected rather than coerced to zero.
//!
//! Use together with `#[serde(default)]` so that a missing key also decodes to `None`.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum RawNumber {
    Number(f64),
    Text(String),
}

fn is_unavailable(s: &str) -> bool {
    s.is_empty() || s.eq_ignore_ascii_case("n/a")
}

/// Parses a textual number. Returns `Ok(None)` for the "not available" spellings.
pub fn parse_number(text: &str) -> Result<Option<f64>, String> {
    let t = text.trim();
    if is_unavailable(t) {
        return Ok(None);
    }

    let digits: String = t
        .strip_prefix('$')
        .unwrap_or(t)
        .chars()
        .filter(|c| *c != ',')
        .collect();
    match digits.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(format!("invalid numeric value {text:?}")),
    }
}

/// Parses an RFC 3339 timestamp or a bare `YYYY-MM-DD` date (taken as midnight UTC).
pub fn parse_datetime(text: &str) -> Result<Option<DateTime<Utc>>, String> {
    let t = text.trim();
    if is_unavailable(t) {
        return Ok(None);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(t) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }
    if let Ok(d) = NaiveDate::parse_from_str(t, "%Y-%m-%d") {
        return Ok(Some(d.and_time(NaiveTime::MIN).and_utc()));
    }
    Err(format!(
        "could not parse time {text:?}, expected RFC 3339 or YYYY-MM-DD"
    ))
}

pub mod number {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Option<f64>, s: S) -> Result<S::Ok, S::Error> {
        value.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        match Option::<RawNumber>::deserialize(d)? {
            None => Ok(None),
            Some(RawNumber::Number(v)) if v.is_finite() => Ok(Some(v)),
            Some(RawNumber::Number(v)) => Err(D::Error::custom(format!(
                "non-finite numeric value {v}"
            ))),
            Some(RawNumber::Text(s)) => parse_number(&s).map_err(D::Error::custom),
        }
    }
}

pub mod datetime {
    use super::*;

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(dt) => s.serialize_str(&dt.to_rfc3339()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<String>::deserialize(d)? {
            None => Ok(None),
            Some(s) => parse_datetime(&s).map_err(D::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Probe {
        #[serde(default, with = "number")]
        value: Option<f64>,
        #[serde(default, with = "datetime")]
        at: Option<DateTime<Utc>>,
    }

    fn probe(v: serde_json::Value) -> Result<Probe, serde_json::Error> {
        serde_json::from_value(v)
    }

    #[test]
    fn numbers_decode_from_numbers_and_numeric_strings() {
        assert_eq!(probe(json!({"value": 123.45})).unwrap().value, Some(123.45));
        assert_eq!(probe(json!({"value": 7})).unwrap().value, Some(7.0));
        assert_eq!(probe(json!({"value": "12.5"})).unwrap().value, Some(12.5));
        assert_eq!(probe(json!({"value": "$1,250.10"})).unwrap().value, Some(1250.10));
    }

    #[test]
    fn zero_is_a_value_not_an_absence() {
        assert_eq!(probe(json!({"value": 0})).unwrap().value, Some(0.0));
    }

    #[test]
    fn unavailable_spellings_decode_to_none() {
        for v in [json!(null), json!(""), json!("N/A"), json!("n/a"), json!("  ")] {
            assert_eq!(probe(json!({ "value": v })).unwrap().value, None, "input {v}");
        }
        assert_eq!(probe(json!({})).unwrap().value, None);
    }

    #[test]
    fn non_numeric_strings_are_rejected() {
        assert!(probe(json!({"value": "abc"})).is_err());
        assert!(probe(json!({"value": "NaN"})).is_err());
        assert!(probe(json!({"value": "inf"})).is_err());
    }

    #[test]
    fn datetimes_accept_rfc3339_and_plain_dates() {
        let p = probe(json!({"at": "2025-05-02T14:30:00Z"})).unwrap();
        assert_eq!(p.at, Some(Utc.with_ymd_and_hms(2025, 5, 2, 14, 30, 0).unwrap()));

        let p = probe(json!({"at": "2025-05-02"})).unwrap();
        assert_eq!(p.at, Some(Utc.with_ymd_and_hms(2025, 5, 2, 0, 0, 0).unwrap()));

        assert_eq!(probe(json!({"at": ""})).unwrap().at, None);
        assert!(probe(json!({"at": "yesterday"})).is_err());
    }

    #[test]
    fn absence_round_trips_as_null() {
        let p = Probe { value: None, at: None };
        let encoded = serde_json::to_value(&p).unwrap();
        assert_eq!(encoded, json!({"value": null, "at": null}));
        assert_eq!(probe(encoded).unwrap(), p);
    }
}

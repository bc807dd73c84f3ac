//! Best-effort conversion of raw wire values into typed parameters

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use super::{DecodedObject, ParamKind, ParamSpec, ParamValue, RawParam, TypeRegistry};

/// Naive date-time layouts accepted after RFC 3339, interpreted as UTC
const NAIVE_TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Coerce a raw value into the declared parameter type
///
/// Returns `None` when the value cannot be converted. Panics only if a
/// registered object decoder does.
#[must_use]
pub fn coerce(raw: &RawParam, spec: &ParamSpec, types: &TypeRegistry) -> Option<ParamValue> {
    if is_null(raw, &spec.kind) {
        return spec.nullable.then_some(ParamValue::Null);
    }

    match &spec.kind {
        ParamKind::Text => scalar_text(raw).map(ParamValue::Text),
        ParamKind::Integer => scalar_text(raw)?.parse().ok().map(ParamValue::Integer),
        ParamKind::Float => scalar_text(raw)?.parse().ok().map(ParamValue::Float),
        ParamKind::Bool => match scalar_text(raw)?.as_str() {
            "true" => Some(ParamValue::Bool(true)),
            "false" => Some(ParamValue::Bool(false)),
            _ => None,
        },
        ParamKind::Timestamp => parse_timestamp(&scalar_text(raw)?).map(ParamValue::Timestamp),
        ParamKind::Object(type_name) => {
            let payload = match raw {
                RawParam::Text(s) => serde_json::from_str::<Value>(s).ok()?,
                RawParam::Structured(value) => value.clone(),
            };
            let decoded = types.decode(type_name, payload).ok()?;
            Some(ParamValue::Object(DecodedObject::new(type_name.clone(), decoded)))
        }
    }
}

/// Coerce every raw parameter that the schema declares
///
/// Undeclared raw keys are dropped. Declared keys that are absent or fail to
/// coerce are omitted from the result.
#[must_use]
pub fn coerce_all(
    raw: &HashMap<String, RawParam>,
    schema: &BTreeMap<String, ParamSpec>,
    types: &TypeRegistry,
) -> super::CallParams {
    let mut params = super::CallParams::new();
    for (name, value) in raw {
        let Some(spec) = schema.get(name) else {
            continue;
        };
        match coerce(value, spec, types) {
            Some(typed) => params.insert(name.clone(), typed),
            None => tracing::debug!(param = %name, kind = %spec.kind, "dropping uncoercible parameter"),
        }
    }
    params
}

fn is_null(raw: &RawParam, kind: &ParamKind) -> bool {
    match raw {
        RawParam::Structured(Value::Null) => true,
        RawParam::Text(s) => s == "null" && *kind != ParamKind::Text,
        RawParam::Structured(_) => false,
    }
}

/// Canonical string form of a scalar raw value
fn scalar_text(raw: &RawParam) -> Option<String> {
    match raw {
        RawParam::Text(s) => Some(s.clone()),
        RawParam::Structured(Value::String(s)) => Some(s.clone()),
        RawParam::Structured(Value::Number(n)) => Some(n.to_string()),
        RawParam::Structured(Value::Bool(b)) => Some(b.to_string()),
        RawParam::Structured(_) => None,
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }

    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Invoice {
        number: u32,
        total: f64,
    }

    fn types() -> TypeRegistry {
        let mut types = TypeRegistry::new();
        types.register::<Invoice>("Invoice");
        types
    }

    fn text(kind: ParamKind, raw: &str) -> Option<ParamValue> {
        coerce(&RawParam::from(raw), &ParamSpec::required(kind), &types())
    }

    #[test]
    fn text_passes_through_unchanged() {
        let value = text(ParamKind::Text, "  hello, world ");
        assert!(matches!(value, Some(ParamValue::Text(s)) if s == "  hello, world "));
    }

    #[test]
    fn text_null_literal_stays_text() {
        assert!(matches!(text(ParamKind::Text, "null"), Some(ParamValue::Text(s)) if s == "null"));
    }

    #[test]
    fn integer_parse() {
        assert!(matches!(text(ParamKind::Integer, "-42"), Some(ParamValue::Integer(-42))));
        assert!(text(ParamKind::Integer, "4.2").is_none());
        assert!(text(ParamKind::Integer, "forty").is_none());
        assert!(text(ParamKind::Integer, "").is_none());
    }

    #[test]
    fn float_parse() {
        assert!(matches!(text(ParamKind::Float, "2.5"), Some(ParamValue::Float(f)) if (f - 2.5).abs() < f64::EPSILON));
        assert!(matches!(text(ParamKind::Float, "7"), Some(ParamValue::Float(f)) if (f - 7.0).abs() < f64::EPSILON));
        assert!(text(ParamKind::Float, "2,5").is_none());
    }

    #[test]
    fn bool_is_case_sensitive() {
        assert!(matches!(text(ParamKind::Bool, "true"), Some(ParamValue::Bool(true))));
        assert!(matches!(text(ParamKind::Bool, "false"), Some(ParamValue::Bool(false))));
        assert!(text(ParamKind::Bool, "True").is_none());
        assert!(text(ParamKind::Bool, "1").is_none());
        assert!(text(ParamKind::Bool, "yes").is_none());
    }

    #[test]
    fn timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 9, 14, 30, 0).unwrap();
        for raw in [
            "2024-03-09T14:30:00Z",
            "2024-03-09T16:30:00+02:00",
            "2024-03-09T14:30:00",
            "2024-03-09 14:30:00.000",
        ] {
            assert!(
                matches!(text(ParamKind::Timestamp, raw), Some(ParamValue::Timestamp(ts)) if ts == expected),
                "{raw} should parse"
            );
        }

        let midnight = Utc.with_ymd_and_hms(2024, 3, 9, 0, 0, 0).unwrap();
        assert!(matches!(text(ParamKind::Timestamp, "2024-03-09"), Some(ParamValue::Timestamp(ts)) if ts == midnight));
        assert!(text(ParamKind::Timestamp, "yesterday").is_none());
        assert!(text(ParamKind::Timestamp, "2024-13-40").is_none());
    }

    #[test]
    fn object_from_text_payload() {
        let value = text(ParamKind::object("Invoice"), r#"{"number":7,"total":19.5}"#);
        let Some(ParamValue::Object(obj)) = value else {
            panic!("expected object");
        };
        assert_eq!(obj.type_name(), "Invoice");
        assert_eq!(
            obj.downcast_ref::<Invoice>(),
            Some(&Invoice {
                number: 7,
                total: 19.5
            })
        );
    }

    #[test]
    fn object_from_structured_payload() {
        let raw = RawParam::Structured(json!({"number": 1, "total": 0.0}));
        let value = coerce(&raw, &ParamSpec::required(ParamKind::object("Invoice")), &types());
        assert!(matches!(value, Some(ParamValue::Object(_))));
    }

    #[test]
    fn object_failures_degrade_to_none() {
        assert!(text(ParamKind::object("Invoice"), "{not json").is_none());
        assert!(text(ParamKind::object("Invoice"), r#"{"number":"x"}"#).is_none());
        assert!(text(ParamKind::object("Unknown"), r#"{"number":1,"total":1}"#).is_none());
    }

    #[test]
    fn structured_scalars_use_canonical_text() {
        let spec = ParamSpec::required(ParamKind::Integer);
        let value = coerce(&RawParam::Structured(json!(12)), &spec, &types());
        assert!(matches!(value, Some(ParamValue::Integer(12))));

        let spec = ParamSpec::required(ParamKind::Bool);
        let value = coerce(&RawParam::Structured(json!(true)), &spec, &types());
        assert!(matches!(value, Some(ParamValue::Bool(true))));

        let spec = ParamSpec::required(ParamKind::Text);
        assert!(coerce(&RawParam::Structured(json!([1, 2])), &spec, &types()).is_none());
    }

    #[test]
    fn null_respects_nullability() {
        let nullable = ParamSpec::nullable(ParamKind::Integer);
        let required = ParamSpec::required(ParamKind::Integer);

        assert!(matches!(
            coerce(&RawParam::Structured(Value::Null), &nullable, &types()),
            Some(ParamValue::Null)
        ));
        assert!(matches!(
            coerce(&RawParam::from("null"), &nullable, &types()),
            Some(ParamValue::Null)
        ));
        assert!(coerce(&RawParam::Structured(Value::Null), &required, &types()).is_none());
    }

    #[test]
    fn canonical_strings_round_trip() {
        for n in [0_i64, 1, -1, i64::MAX, i64::MIN] {
            assert!(matches!(text(ParamKind::Integer, &n.to_string()), Some(ParamValue::Integer(v)) if v == n));
        }
        for f in [0.0_f64, -1.5, 1e-12, 123_456.789, f64::MAX] {
            assert!(matches!(text(ParamKind::Float, &f.to_string()), Some(ParamValue::Float(v)) if v.to_bits() == f.to_bits()));
        }
        for b in [true, false] {
            assert!(matches!(text(ParamKind::Bool, &b.to_string()), Some(ParamValue::Bool(v)) if v == b));
        }
        let ts = Utc.with_ymd_and_hms(1999, 12, 31, 23, 59, 59).unwrap()
            + chrono::Duration::milliseconds(250);
        assert!(matches!(text(ParamKind::Timestamp, &ts.to_rfc3339()), Some(ParamValue::Timestamp(v)) if v == ts));
        for s in ["", "plain", "ünïcödé", "{\"a\":1}"] {
            assert!(matches!(text(ParamKind::Text, s), Some(ParamValue::Text(v)) if v == s));
        }
    }

    #[test]
    fn coercion_is_total() {
        let kinds = [
            ParamKind::Text,
            ParamKind::Integer,
            ParamKind::Float,
            ParamKind::Bool,
            ParamKind::Timestamp,
            ParamKind::object("Invoice"),
            ParamKind::object("Missing"),
        ];
        let inputs = [
            "", " ", "null", "NaN", "-", "9999999999999999999999", "\u{0}", "[]", "{}",
            "1e400", "2024-02-30", "💥", "true ", "\"quoted\"",
        ];
        for kind in &kinds {
            for input in inputs {
                let _ = coerce(&RawParam::from(input), &ParamSpec::nullable(kind.clone()), &types());
                let _ = coerce(&RawParam::from(input), &ParamSpec::required(kind.clone()), &types());
            }
        }
    }

    #[test]
    fn coerce_all_drops_undeclared_and_uncoercible() {
        let schema = BTreeMap::from([
            ("count".to_string(), ParamSpec::required(ParamKind::Integer)),
            ("flag".to_string(), ParamSpec::required(ParamKind::Bool)),
            ("note".to_string(), ParamSpec::nullable(ParamKind::Text)),
        ]);
        let raw = HashMap::from([
            ("count".to_string(), RawParam::from("3")),
            ("flag".to_string(), RawParam::from("maybe")),
            ("extra".to_string(), RawParam::from("ignored")),
        ]);

        let params = coerce_all(&raw, &schema, &types());
        assert_eq!(params.names(), vec!["count"]);
        assert_eq!(params.integer("count"), Some(3));
    }
}

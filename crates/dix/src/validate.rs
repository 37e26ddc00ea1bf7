//! 🚦 Validation: where a row of strings becomes a record, or a list of reasons it can't.
//!
//! 🎬 *[a CSV cell reading " 2024-13-45 " approaches the border]*
//! *[the guard does not wave it through]*
//!
//! [`validate`] is pure: one [`RawRecord`] and one [`EntitySchema`] in, a
//! [`ValidatedRecord`] or a [`ValidationError`] out. No I/O, no clock, no store.
//! Every failing field is reported, not just the first, then every failing
//! refinement, so a state analyst can fix a file in one pass instead of six.
//!
//! 🧠 Knowledge graph:
//! - "absent" = missing column, JSON `null`, or a blank string. Absent + required is an
//!   error; absent + optional takes the default (coerced like any other raw text) or null.
//! - an empty string is never a zero, a false, or a date. It's absent. Full stop.
//! - derived fields are computed last and are part of the checksum
//!
//! 🦆

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::{Map, Value};

use crate::common::{Checksum, FieldValue, Fields, RawRecord, RecordKey, StateCode, ValidatedRecord};
use crate::errors::{FieldError, ValidationError};
use crate::schema::{EntitySchema, EnumVariant, FieldSpec, FieldType};

pub(crate) const MISSING_REQUIRED: &str = "required field is missing";

/// 🚦 Type one raw row against its schema.
pub fn validate(raw: &RawRecord, schema: &EntitySchema) -> Result<ValidatedRecord, ValidationError> {
    let mut fields = Fields::new();
    let mut errors = Vec::new();

    for spec in schema.fields {
        match coerce_field(spec, raw) {
            Ok(value) => fields.push(spec.name, value),
            Err(message) => errors.push(FieldError::new(spec.name, message)),
        }
    }

    // -- refinements see only the fields that typed cleanly. a refinement whose inputs
    // -- failed stays quiet; the field error already says what's wrong.
    for refinement in schema.refinements {
        if let Some(error) = (refinement.check)(&fields) {
            errors.push(error);
        }
    }

    let key = if errors.is_empty() {
        match key_from_fields(schema, &fields) {
            Ok(key) => Some(key),
            Err(error) => {
                errors.push(error);
                None
            }
        }
    } else {
        None
    };

    let (Some(key), true) = (key, errors.is_empty()) else {
        return Err(ValidationError {
            row_number: raw.row_number,
            key: schema.raw_key(raw),
            errors,
        });
    };

    for derived in schema.derived {
        let value = (derived.compute)(&fields);
        fields.push(derived.name, value);
    }

    let partition = schema
        .partition_field
        .and_then(|name| fields.get(name))
        .and_then(FieldValue::as_text)
        .and_then(|code| code.parse::<StateCode>().ok());

    let checksum = Checksum::compute(schema.kind, &fields);
    Ok(ValidatedRecord {
        entity: schema.kind,
        row_number: raw.row_number,
        key,
        partition,
        fields,
        checksum,
    })
}

fn coerce_field(spec: &FieldSpec, raw: &RawRecord) -> Result<FieldValue, String> {
    match spec.raw_value(raw).filter(|value| !is_absent(value)) {
        Some(value) => coerce(spec.field_type, value),
        None => match spec.default {
            Some(default) => coerce(spec.field_type, &Value::String(default.to_string())),
            None if spec.required => Err(MISSING_REQUIRED.to_string()),
            None => Ok(FieldValue::Null),
        },
    }
}

fn is_absent(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn key_from_fields(schema: &EntitySchema, fields: &Fields) -> Result<RecordKey, FieldError> {
    let mut parts = Vec::with_capacity(schema.key.len());
    for name in schema.key {
        let text = match fields.get(name) {
            Some(FieldValue::Text(s)) => s.clone(),
            Some(FieldValue::Integer(i)) => i.to_string(),
            Some(value) if !value.is_null() => value.to_json().to_string(),
            _ => return Err(FieldError::new(*name, "key field is missing")),
        };
        parts.push(text);
    }
    Ok(RecordKey::from_parts(parts))
}

// ============================================================
// 🧪 Coercion, one FieldType at a time
// ============================================================

fn coerce(field_type: FieldType, value: &Value) -> Result<FieldValue, String> {
    match field_type {
        FieldType::Text => coerce_text(value).map(FieldValue::Text),
        FieldType::Integer => coerce_integer(value).map(FieldValue::Integer),
        FieldType::Float => coerce_float(value).map(FieldValue::Float),
        FieldType::Boolean => coerce_boolean(value).map(FieldValue::Boolean),
        FieldType::Date => coerce_date(value).map(FieldValue::Date),
        FieldType::DateTime => coerce_datetime(value).map(FieldValue::DateTime),
        FieldType::Enum(variants) => coerce_enum(variants, value).map(FieldValue::Text),
        FieldType::StateCode => {
            let text = coerce_text(value)?;
            let code = text.parse::<StateCode>()?;
            Ok(FieldValue::Text(code.as_str().to_string()))
        }
        FieldType::TextList => coerce_text_list(value).map(FieldValue::TextList),
        FieldType::FullName => coerce_full_name(value).map(FieldValue::Text),
        FieldType::Object(members) => coerce_object(members, value).map(FieldValue::Json),
        FieldType::ObjectList(members) => coerce_object_list(members, value).map(FieldValue::Json),
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s.trim()),
        Value::Array(_) => "an array".to_string(),
        Value::Object(_) => "an object".to_string(),
        other => other.to_string(),
    }
}

fn coerce_text(value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(format!("expected text, found {}", describe(other))),
    }
}

fn coerce_integer(value: &Value) -> Result<i64, String> {
    let parsed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| format!("expected an integer, found {}", describe(value)))
}

fn coerce_float(value: &Value) -> Result<f64, String> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|f| f.is_finite())
        .ok_or_else(|| format!("expected a number, found {}", describe(value)))
}

fn coerce_boolean(value: &Value) -> Result<bool, String> {
    let parsed = match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    };
    parsed.ok_or_else(|| format!("expected true or false, found {}", describe(value)))
}

fn coerce_date(value: &Value) -> Result<NaiveDate, String> {
    let Value::String(s) = value else {
        return Err(format!("expected a date, found {}", describe(value)));
    };
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_instant(s).map(|t| t.date_naive()))
        .ok_or_else(|| format!("expected a date (YYYY-MM-DD), found '{s}'"))
}

fn coerce_datetime(value: &Value) -> Result<DateTime<Utc>, String> {
    let Value::String(s) = value else {
        return Err(format!("expected a timestamp, found {}", describe(value)));
    };
    let s = s.trim();
    parse_instant(s)
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN).and_utc())
        })
        .ok_or_else(|| format!("expected an RFC 3339 timestamp, found '{s}'"))
}

/// ⏱️ RFC 3339, or a zone-less timestamp the feeds emit, read as UTC.
fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn coerce_enum(variants: &'static [EnumVariant], value: &Value) -> Result<String, String> {
    let text = coerce_text(value)?;
    variants
        .iter()
        .find(|variant| {
            variant.name.eq_ignore_ascii_case(&text)
                || variant.aliases.iter().any(|alias| alias.eq_ignore_ascii_case(&text))
        })
        .map(|variant| variant.name.to_string())
        .ok_or_else(|| {
            let allowed: Vec<&str> = variants.iter().map(|v| v.name).collect();
            format!("'{text}' is not one of {}", allowed.join(", "))
        })
}

fn coerce_text_list(value: &Value) -> Result<Vec<String>, String> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.trim().to_string()),
                Value::Number(n) => Ok(n.to_string()),
                other => Err(format!("expected a list of text, found {} in the list", describe(other))),
            })
            .collect(),
        Value::String(s) if s.trim_start().starts_with('[') => {
            let parsed: Value = serde_json::from_str(s.trim())
                .map_err(|e| format!("expected a JSON list of text: {e}"))?;
            coerce_text_list(&parsed)
        }
        // -- CSV exports flatten lists to "a, b, c". we take them back.
        Value::String(s) => Ok(s
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect()),
        other => Err(format!("expected a list of text, found {}", describe(other))),
    }
}

const NAME_PARTS: [&str; 4] = ["given_names", "middle_names", "surname", "name_suffix"];

fn coerce_full_name(value: &Value) -> Result<String, String> {
    match value {
        Value::Object(parts) => {
            let name = NAME_PARTS
                .iter()
                .filter_map(|part| parts.get(*part).and_then(Value::as_str))
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            if name.is_empty() {
                Err("name object has no name parts".to_string())
            } else {
                Ok(name)
            }
        }
        // -- the feeds ship the name object as a JSON string. sometimes. usually.
        Value::String(s) if s.trim_start().starts_with('{') => {
            let parsed: Value = serde_json::from_str(s.trim())
                .map_err(|e| format!("expected a name object: {e}"))?;
            coerce_full_name(&parsed)
        }
        Value::String(s) => Ok(s.trim().to_string()),
        other => Err(format!("expected a name, found {}", describe(other))),
    }
}

/// 🧾 Nested structures arrive as JSON text inside a cell, or as real JSON from NDJSON.
fn embedded_json(value: &Value) -> Result<Value, String> {
    match value {
        Value::String(s) => serde_json::from_str(s.trim()).map_err(|e| format!("expected JSON: {e}")),
        other => Ok(other.clone()),
    }
}

fn coerce_object(members: &'static [FieldSpec], value: &Value) -> Result<Value, String> {
    let Value::Object(columns) = embedded_json(value)? else {
        return Err(format!("expected a JSON object, found {}", describe(value)));
    };
    typed_members(members, columns)
}

fn coerce_object_list(members: &'static [FieldSpec], value: &Value) -> Result<Value, String> {
    let Value::Array(items) = embedded_json(value)? else {
        return Err(format!("expected a JSON list of objects, found {}", describe(value)));
    };
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(columns) => {
                typed_members(members, columns).map_err(|e| format!("item {}: {e}", i + 1))
            }
            other => Err(format!("item {}: expected an object, found {}", i + 1, describe(&other))),
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

/// 📦 The same absent/required/default rules as top-level fields, one level down.
/// Unknown members are dropped; absent optional members are left out.
fn typed_members(members: &'static [FieldSpec], columns: Map<String, Value>) -> Result<Value, String> {
    let nested = RawRecord::new(0, 0, columns);
    let mut typed = Map::new();
    let mut problems = Vec::new();
    for spec in members {
        match coerce_field(spec, &nested) {
            Ok(FieldValue::Null) => {}
            Ok(value) => {
                typed.insert(spec.name.to_string(), value.to_json());
            }
            Err(message) => problems.push(format!("{}: {message}", spec.column)),
        }
    }
    if problems.is_empty() {
        Ok(Value::Object(typed))
    } else {
        Err(problems.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::EntityKind;
    use serde_json::json;

    fn row(value: Value) -> RawRecord {
        let Value::Object(columns) = value else {
            panic!("💀 test rows are objects");
        };
        RawRecord::new(3, 4, columns)
    }

    fn good_client() -> Value {
        json!({
            "external_id": " c-1 ",
            "pseudonymized_id": "p-1",
            "state_code": "US_IX",
            "full_name": "{\"given_names\": \"ANA\", \"surname\": \"LOPEZ\"}",
            "gender": "F",
            "birth_date": "1990-04-01",
            "case_ids": "[\"k-1\", \"k-2\"]"
        })
    }

    #[test]
    fn the_one_where_a_good_client_passes_customs() {
        let record = validate(&row(good_client()), EntityKind::Client.schema())
            .expect("💀 a good client should validate");
        assert_eq!(record.key, RecordKey::from_parts(["c-1"]));
        assert_eq!(record.partition, Some(StateCode::US_ID));
        assert_eq!(record.row_number, 3);
        assert_eq!(record.fields.get("fullName"), Some(&FieldValue::Text("ANA LOPEZ".into())));
        assert_eq!(record.fields.get("gender"), Some(&FieldValue::Text("FEMALE".into())));
        assert_eq!(record.fields.get("isGenderLocked"), Some(&FieldValue::Boolean(true)));
        assert_eq!(
            record.fields.get("caseIds"),
            Some(&FieldValue::TextList(vec!["k-1".into(), "k-2".into()]))
        );
        assert_eq!(record.fields.get("county"), Some(&FieldValue::Text("UNKNOWN".into())));
    }

    #[test]
    fn the_one_where_a_client_without_a_county_lives_in_unknown() {
        let mut blank = good_client();
        blank["county"] = json!("   ");
        let record = validate(&row(blank), EntityKind::Client.schema()).expect("💀 blank county is fine");
        assert_eq!(record.fields.get("county"), Some(&FieldValue::Text("UNKNOWN".into())));

        let mut ada = good_client();
        ada["county"] = json!("ADA");
        let record = validate(&row(ada), EntityKind::Client.schema()).expect("💀 real county is fine");
        assert_eq!(record.fields.get("county"), Some(&FieldValue::Text("ADA".into())));

        // -- cases keep a missing county missing, so the county lock stays off
        let case = json!({
            "external_id": "k-1",
            "state_code": "US_ID",
            "staff_id": "s-1",
            "client_id": "c-1"
        });
        let record = validate(&row(case), EntityKind::Case.schema()).expect("💀 bare case is fine");
        assert_eq!(record.fields.get("county"), Some(&FieldValue::Null));
        assert_eq!(record.fields.get("isCountyLocked"), Some(&FieldValue::Boolean(false)));
    }

    #[test]
    fn the_one_where_every_broken_field_is_reported_at_once() {
        let mut value = good_client();
        value["external_id"] = json!("   ");
        value["birth_date"] = json!("1990-02-30");
        value["gender"] = json!("DRAGON");
        let err = validate(&row(value), EntityKind::Client.schema())
            .expect_err("💀 three broken fields should fail");
        let fields: Vec<&str> = err.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["externalId", "gender", "birthDate"]);
        assert_eq!(err.errors[0].message, MISSING_REQUIRED);
        assert_eq!(err.row_number, 3);
        assert_eq!(err.key, None, "a blank key can't protect anything");
    }

    #[test]
    fn the_one_where_an_empty_string_is_not_zero() {
        let value = json!({
            "external_id": "k-1",
            "state_code": "US_ID",
            "staff_id": "s-1",
            "client_id": "c-1",
            "lsir_score": ""
        });
        let record = validate(&row(value), EntityKind::Case.schema())
            .expect("💀 optional blank score is just absent");
        assert_eq!(record.fields.get("lsirScore"), Some(&FieldValue::Null));
        assert_eq!(record.fields.get("isLsirScoreLocked"), Some(&FieldValue::Boolean(false)));
        assert_eq!(record.fields.get("isReportTypeLocked"), Some(&FieldValue::Boolean(false)));
    }

    #[test]
    fn the_one_where_refinements_catch_what_types_cannot() {
        let value = json!({
            "external_id": "k-1",
            "state_code": "US_ID",
            "staff_id": "s-1",
            "client_id": "c-1",
            "lsir_score": "71",
            "assigned_date": "2024-05-01",
            "completion_date": "2024-04-01",
            "report_type": "PSI File Review w/LSI Assigned"
        });
        let err = validate(&row(value), EntityKind::Case.schema())
            .expect_err("💀 out-of-range score and backwards dates");
        let fields: Vec<&str> = err.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["lsirScore", "completionDate"]);
        assert_eq!(err.key, Some(RecordKey::from_parts(["k-1"])));
    }

    #[test]
    fn the_one_where_opportunities_get_a_provider_whether_they_like_it_or_not() {
        let value = json!({
            "OpportunityName": "Recovery Court",
            "developmentalDisabilityDiagnosisCriterion": false,
            "noCurrentOrPriorSexOffenseCriterion": "true",
            "noCurrentOrPriorViolentOffenseCriterion": "no",
            "entryOfGuiltyPleaCriterion": 1,
            "veteranStatusCriterion": "0",
            "minAge": "18",
            "maxAge": 65,
            "lastUpdatedDate": "2024-06-01"
        });
        let record = validate(&row(value), EntityKind::Opportunity.schema())
            .expect("💀 opportunity should validate");
        assert_eq!(
            record.key,
            RecordKey::from_parts(["Recovery Court", "UNKNOWN PROVIDER"])
        );
        assert_eq!(record.partition, None);
        assert_eq!(record.fields.get("status"), Some(&FieldValue::Text("ACTIVE".into())));
    }

    #[test]
    fn the_one_where_an_upside_down_age_range_is_refused() {
        let value = json!({
            "OpportunityName": "Recovery Court",
            "developmentalDisabilityDiagnosisCriterion": false,
            "noCurrentOrPriorSexOffenseCriterion": false,
            "noCurrentOrPriorViolentOffenseCriterion": false,
            "entryOfGuiltyPleaCriterion": false,
            "veteranStatusCriterion": false,
            "minAge": 70,
            "maxAge": 18,
            "lastUpdatedDate": "2024-06-01T10:00:00Z"
        });
        let err = validate(&row(value), EntityKind::Opportunity.schema())
            .expect_err("💀 min above max");
        assert_eq!(err.errors.len(), 1);
        assert_eq!(err.errors[0].field, "minAge");
    }

    #[test]
    fn the_one_where_the_same_row_always_hashes_the_same() {
        let a = validate(&row(good_client()), EntityKind::Client.schema()).expect("💀 valid");
        let b = validate(&row(good_client()), EntityKind::Client.schema()).expect("💀 valid");
        assert_eq!(a.checksum, b.checksum);

        let mut changed = good_client();
        changed["county"] = json!("ADA");
        let c = validate(&row(changed), EntityKind::Client.schema()).expect("💀 valid");
        assert_ne!(a.checksum, c.checksum);
    }

    fn good_insight() -> Value {
        json!({
            "state_code": "US_IX",
            "gender": "MALE",
            "assessment_score_bucket_start": "0",
            "assessment_score_bucket_end": "20",
            "most_severe_description": "BURGLARY",
            "recidivism_rollup": "{\"state_code\": \"US_IX\", \"gender\": \"M\", \"most_severe_ncic_category_uniform\": \"Burglary\", \"any_is_violent_uniform\": true}",
            "recidivism_num_records": "412",
            "recidivism_probation_series": "[{\"cohort_months\": 12, \"event_rate\": 0.1, \"lower_ci\": 0.05, \"upper_ci\": 0.15}, {\"cohort_months\": 24, \"event_rate\": 0.2, \"lower_ci\": 0.15, \"upper_ci\": 0.25}]",
            "recidivism_rider_series": "",
            "disposition_num_records": 388,
            "disposition_probation_pc": 0.5,
            "disposition_rider_pc": "0.3",
            "disposition_term_pc": 0.2
        })
    }

    #[test]
    fn the_one_where_an_insight_unpacks_its_json_cells() {
        let record = validate(&row(good_insight()), EntityKind::Insight.schema())
            .expect("💀 a good insight should validate");
        assert_eq!(record.partition, Some(StateCode::US_ID));
        assert_eq!(record.key, RecordKey::from_parts(["MALE", "0", "20", "BURGLARY"]));
        assert_eq!(
            record.fields.get("recidivismRollup"),
            Some(&FieldValue::Json(json!({
                "stateCode": "US_ID",
                "gender": "MALE",
                "ncicCategory": "Burglary"
            })))
        );
        assert_eq!(
            record.fields.get("recidivismProbationSeries"),
            Some(&FieldValue::Json(json!([
                {"cohortMonths": 12, "eventRate": 0.1, "lowerCI": 0.05, "upperCI": 0.15},
                {"cohortMonths": 24, "eventRate": 0.2, "lowerCI": 0.15, "upperCI": 0.25}
            ])))
        );
        // -- a blank series cell is an absent series, not an empty one
        assert_eq!(record.fields.get("recidivismRiderSeries"), Some(&FieldValue::Null));
        assert_eq!(record.fields.get("recidivismTermSeries"), Some(&FieldValue::Null));
        assert_eq!(record.fields.get("dispositionRiderPc"), Some(&FieldValue::Float(0.3)));

        // -- same insight from NDJSON, nested values as real JSON: same checksum
        let mut ndjson = good_insight();
        ndjson["recidivism_rollup"] = json!({
            "state_code": "US_ID",
            "gender": "MALE",
            "most_severe_ncic_category_uniform": "Burglary"
        });
        ndjson["recidivism_probation_series"] = json!([
            {"cohort_months": "12", "event_rate": 0.1, "lower_ci": 0.05, "upper_ci": 0.15},
            {"cohort_months": 24, "event_rate": 0.2, "lower_ci": 0.15, "upper_ci": 0.25}
        ]);
        let twin = validate(&row(ndjson), EntityKind::Insight.schema()).expect("💀 twin should validate");
        assert_eq!(twin.checksum, record.checksum);
    }

    #[test]
    fn the_one_where_a_broken_insight_says_which_cell_and_which_item() {
        let mut value = good_insight();
        value["recidivism_rollup"] = json!("{\"gender\": \"MALE\"}");
        value["recidivism_term_series"] = json!([
            {"cohort_months": 12, "event_rate": 0.1, "lower_ci": 0.05, "upper_ci": 0.15},
            {"cohort_months": 24, "event_rate": "lots", "lower_ci": 0.15, "upper_ci": 0.25}
        ]);
        value["disposition_rider_pc"] = json!(1.5);
        let err = validate(&row(value), EntityKind::Insight.schema())
            .expect_err("💀 three problems should fail");
        let fields: Vec<&str> = err.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["recidivismRollup", "recidivismTermSeries", "dispositionRiderPc"]);
        assert!(err.errors[0].message.contains("state_code"), "{}", err.errors[0].message);
        assert!(err.errors[1].message.starts_with("item 2: event_rate"), "{}", err.errors[1].message);
        assert_eq!(err.key, Some(RecordKey::from_parts(["MALE", "0", "20", "BURGLARY"])));

        let mut garbled = good_insight();
        garbled["recidivism_probation_series"] = json!("[{\"cohort_months\": 12,");
        let err = validate(&row(garbled), EntityKind::Insight.schema())
            .expect_err("💀 half a JSON list is no list");
        assert_eq!(err.errors[0].field, "recidivismProbationSeries");
        assert!(err.errors[0].message.starts_with("expected JSON"));
    }
}

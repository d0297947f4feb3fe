//! Report schemas for therapy and radiation therapy documents.
//!
//! Each report type has a typed record (what the API returns) and a field
//! table ([`FieldSpec`]) describing the same shape. The table drives both the
//! field descriptions placed in the extraction prompt and the validation of
//! whatever JSON the model hands back.

use crate::error::{FieldViolation, ProcessingError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Textual date format used by every date field.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

// ============================================================================
// Report type selector
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    Therapy,
    Radiation,
}

impl ReportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Therapy => "therapy",
            Self::Radiation => "radiation",
        }
    }

    /// Human-readable name used in prompts and response messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Therapy => "therapy",
            Self::Radiation => "radiation therapy",
        }
    }

    pub fn fields(&self) -> &'static [FieldSpec] {
        match self {
            Self::Therapy => THERAPY_FIELDS,
            Self::Radiation => RADIATION_FIELDS,
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportType {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "therapy" => Ok(Self::Therapy),
            "radiation" => Ok(Self::Radiation),
            _ => Err(ProcessingError::UnsupportedReportType(s.to_string())),
        }
    }
}

// ============================================================================
// Typed records
// ============================================================================

pub const THERAPY_TYPES: &[&str] = &[
    "Chemotherapy",
    "Biological Therapy",
    "Targeted Therapy",
    "Hormonal Therapy",
    "Immunotherapy",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TherapyType {
    Chemotherapy,
    #[serde(rename = "Biological Therapy")]
    BiologicalTherapy,
    #[serde(rename = "Targeted Therapy")]
    TargetedTherapy,
    #[serde(rename = "Hormonal Therapy")]
    HormonalTherapy,
    Immunotherapy,
}

pub const RADIATION_TYPES: &[&str] = &[
    "EBRT",
    "IMRT",
    "IGRT",
    "VMAT",
    "SBRT",
    "Stereotactic",
    "Brachytherapy",
    "Proton",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RadiationType {
    #[serde(rename = "EBRT")]
    Ebrt,
    #[serde(rename = "IMRT")]
    Imrt,
    #[serde(rename = "IGRT")]
    Igrt,
    #[serde(rename = "VMAT")]
    Vmat,
    #[serde(rename = "SBRT")]
    Sbrt,
    Stereotactic,
    Brachytherapy,
    Proton,
}

/// A single drug administered during therapy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrugAdministered {
    pub drug_name: String,
    pub dosage: Option<f64>,
    pub unit: Option<String>,
}

/// Chemotherapy, biological, targeted, hormonal or immunotherapy report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TherapyReport {
    pub patient_id: String,
    pub therapy_type: TherapyType,
    pub administration_route: String,
    pub drugs_administered: Vec<DrugAdministered>,
    pub first_date_of_therapy: NaiveDate,
    pub number_of_cycles: i64,
    pub cycle_interval_days: i64,
    pub adverse_event_observed: bool,
    pub adverse_event_medication: Option<String>,
    pub comment: Option<String>,
    pub hospital_name: String,
    pub hospital_location: String,
}

/// Radiation therapy report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadiationTherapyReport {
    pub patient_name: String,
    pub test_therapy: String,
    pub radiation_type: RadiationType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub fractions: i64,
    pub dosage: f64,
    pub unit: String,
    pub area_treated: String,
    pub events: Option<String>,
    pub medication: Option<String>,
    pub lab_name: String,
    pub lab_location: String,
    pub comment: Option<String>,
}

/// Validated output of the mapper, one variant per report type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ReportData {
    Therapy(TherapyReport),
    Radiation(RadiationTherapyReport),
}

impl ReportData {
    pub fn report_type(&self) -> ReportType {
        match self {
            Self::Therapy(_) => ReportType::Therapy,
            Self::Radiation(_) => ReportType::Radiation,
        }
    }
}

// ============================================================================
// Field tables
// ============================================================================

/// Declared type of a schema field.
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    Text,
    Integer,
    Number,
    Boolean,
    Date,
    Enum(&'static [&'static str]),
    /// Ordered list of nested records.
    List(&'static [FieldSpec]),
}

impl FieldKind {
    /// Type description as shown to the model.
    pub fn describe(&self) -> String {
        match self {
            Self::Text => "string".to_string(),
            Self::Integer => "integer".to_string(),
            Self::Number => "number".to_string(),
            Self::Boolean => "boolean".to_string(),
            Self::Date => "date string, YYYY-MM-DD".to_string(),
            Self::Enum(labels) => {
                let quoted: Vec<String> = labels.iter().map(|l| format!("'{}'", l)).collect();
                format!("one of {}", quoted.join(", "))
            }
            Self::List(_) => "array of objects".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub description: &'static str,
}

const fn required(name: &'static str, kind: FieldKind, description: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required: true,
        description,
    }
}

const fn optional(name: &'static str, kind: FieldKind, description: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required: false,
        description,
    }
}

pub const DRUG_FIELDS: &[FieldSpec] = &[
    required(
        "drug_name",
        FieldKind::Text,
        "The name of the drug administered, e.g. 'Docetaxel'.",
    ),
    optional("dosage", FieldKind::Number, "The dosage of the drug."),
    optional(
        "unit",
        FieldKind::Text,
        "The unit of the dosage, e.g. 'mg' or 'mg/m²'.",
    ),
];

pub const THERAPY_FIELDS: &[FieldSpec] = &[
    required(
        "patient_id",
        FieldKind::Text,
        "Unique identifier for the patient or report.",
    ),
    required(
        "therapy_type",
        FieldKind::Enum(THERAPY_TYPES),
        "The overall type of therapy.",
    ),
    required(
        "administration_route",
        FieldKind::Text,
        "The route of administration, e.g. 'Intravenous', 'Oral', 'Subcutaneous', 'Intramuscular'.",
    ),
    required(
        "drugs_administered",
        FieldKind::List(DRUG_FIELDS),
        "Every drug administered during the therapy.",
    ),
    required(
        "first_date_of_therapy",
        FieldKind::Date,
        "The start date of the first cycle of therapy.",
    ),
    required(
        "number_of_cycles",
        FieldKind::Integer,
        "The number of therapy cycles administered.",
    ),
    required(
        "cycle_interval_days",
        FieldKind::Integer,
        "The interval between cycles in days.",
    ),
    required(
        "adverse_event_observed",
        FieldKind::Boolean,
        "Whether any adverse event or side effect was observed.",
    ),
    optional(
        "adverse_event_medication",
        FieldKind::Text,
        "Medication given for the adverse event.",
    ),
    optional(
        "comment",
        FieldKind::Text,
        "General comments about the therapy or the patient's condition.",
    ),
    required(
        "hospital_name",
        FieldKind::Text,
        "Name of the hospital or laboratory.",
    ),
    required(
        "hospital_location",
        FieldKind::Text,
        "Location of the hospital or laboratory.",
    ),
];

pub const RADIATION_FIELDS: &[FieldSpec] = &[
    required("patient_name", FieldKind::Text, "Name of the patient."),
    required(
        "test_therapy",
        FieldKind::Text,
        "The type of test or therapy, typically 'therapy'.",
    ),
    required(
        "radiation_type",
        FieldKind::Enum(RADIATION_TYPES),
        "The specific type of radiation therapy.",
    ),
    required(
        "start_date",
        FieldKind::Date,
        "The start date of the radiation therapy.",
    ),
    required(
        "end_date",
        FieldKind::Date,
        "The end date of the radiation therapy.",
    ),
    required(
        "fractions",
        FieldKind::Integer,
        "The number of fractions (treatment sessions) administered.",
    ),
    required(
        "dosage",
        FieldKind::Number,
        "The total dosage of radiation.",
    ),
    required(
        "unit",
        FieldKind::Text,
        "The unit of the dosage, commonly 'Gy'.",
    ),
    required(
        "area_treated",
        FieldKind::Text,
        "The anatomical area treated, e.g. 'Spine', 'Brain', 'Chest', 'Pelvis'.",
    ),
    optional(
        "events",
        FieldKind::Text,
        "Any adverse events noted during therapy.",
    ),
    optional(
        "medication",
        FieldKind::Text,
        "Medication given for adverse events.",
    ),
    required(
        "lab_name",
        FieldKind::Text,
        "Name of the hospital or laboratory.",
    ),
    required(
        "lab_location",
        FieldKind::Text,
        "Location of the hospital or laboratory.",
    ),
    optional(
        "comment",
        FieldKind::Text,
        "General comments about the therapy.",
    ),
];

/// Render a field table as an indented bullet list for the prompt.
pub fn describe_fields(fields: &[FieldSpec]) -> String {
    let mut out = String::new();
    write_fields(&mut out, fields, 0);
    out
}

fn write_fields(out: &mut String, fields: &[FieldSpec], depth: usize) {
    let indent = "  ".repeat(depth);
    for field in fields {
        let presence = if field.required {
            "required"
        } else {
            "optional, null if not mentioned"
        };
        out.push_str(&format!(
            "{}- {} ({}, {}): {}\n",
            indent,
            field.name,
            field.kind.describe(),
            presence,
            field.description
        ));
        if let FieldKind::List(nested) = field.kind {
            write_fields(out, nested, depth + 1);
        }
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Validate raw model JSON against the schema of `report_type`.
///
/// All violations are collected before failing. On success the value is
/// coerced (numeric strings, integral floats, boolean strings, enum casing,
/// trimmed text) and returned as the typed record.
pub fn validate(report_type: ReportType, value: &Value) -> Result<ReportData, ProcessingError> {
    let mut violations = Vec::new();

    let Some(object) = value.as_object() else {
        return Err(ProcessingError::SchemaValidation {
            violations: vec![FieldViolation::new(
                "$",
                format!("expected a JSON object, got {}", json_type(value)),
            )],
        });
    };

    let normalized = validate_object(report_type.fields(), object, "", &mut violations);
    if !violations.is_empty() {
        return Err(ProcessingError::SchemaValidation { violations });
    }

    let normalized = Value::Object(normalized);
    let data = match report_type {
        ReportType::Therapy => serde_json::from_value(normalized).map(ReportData::Therapy),
        ReportType::Radiation => serde_json::from_value(normalized).map(ReportData::Radiation),
    };

    data.map_err(|e| ProcessingError::SchemaValidation {
        violations: vec![FieldViolation::new("$", e.to_string())],
    })
}

fn validate_object(
    fields: &[FieldSpec],
    object: &Map<String, Value>,
    prefix: &str,
    violations: &mut Vec<FieldViolation>,
) -> Map<String, Value> {
    let mut normalized = Map::new();
    for field in fields {
        let path = format!("{}{}", prefix, field.name);
        let value = object.get(field.name).filter(|v| !v.is_null());

        let coerced = match value {
            None if field.required => {
                violations.push(FieldViolation::new(path, "field required"));
                continue;
            }
            None => Value::Null,
            Some(v) => match validate_value(&field.kind, v, &path, violations) {
                Some(v) => v,
                None => continue,
            },
        };
        normalized.insert(field.name.to_string(), coerced);
    }
    normalized
}

/// Returns `None` after recording a violation for `path`.
fn validate_value(
    kind: &FieldKind,
    value: &Value,
    path: &str,
    violations: &mut Vec<FieldViolation>,
) -> Option<Value> {
    let result = match kind {
        FieldKind::Text => coerce_text(value),
        FieldKind::Integer => coerce_integer(value),
        FieldKind::Number => coerce_number(value),
        FieldKind::Boolean => coerce_boolean(value),
        FieldKind::Date => coerce_date(value),
        FieldKind::Enum(labels) => coerce_enum(value, labels),
        FieldKind::List(fields) => return validate_list(fields, value, path, violations),
    };

    match result {
        Ok(v) => Some(v),
        Err(reason) => {
            violations.push(FieldViolation::new(path, reason));
            None
        }
    }
}

fn validate_list(
    fields: &[FieldSpec],
    value: &Value,
    path: &str,
    violations: &mut Vec<FieldViolation>,
) -> Option<Value> {
    let Some(items) = value.as_array() else {
        violations.push(FieldViolation::new(
            path,
            format!("expected an array, got {}", json_type(value)),
        ));
        return None;
    };

    let before = violations.len();
    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let item_path = format!("{}[{}]", path, i);
        match item.as_object() {
            Some(obj) => {
                let prefix = format!("{}.", item_path);
                out.push(Value::Object(validate_object(fields, obj, &prefix, violations)));
            }
            None => violations.push(FieldViolation::new(
                item_path,
                format!("expected an object, got {}", json_type(item)),
            )),
        }
    }

    (violations.len() == before).then_some(Value::Array(out))
}

fn coerce_text(value: &Value) -> Result<Value, String> {
    match value {
        Value::String(s) => Ok(Value::String(s.trim().to_string())),
        other => Err(format!("expected a string, got {}", json_type(other))),
    }
}

fn coerce_integer(value: &Value) -> Result<Value, String> {
    let parsed = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(integral)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral))
        }
        _ => None,
    };
    parsed
        .map(Value::from)
        .ok_or_else(|| format!("expected an integer, got {}", describe(value)))
}

/// Whole floats inside the `i64` range; `as` would saturate anything else.
fn integral(f: f64) -> Option<i64> {
    (f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64)
        .then_some(f as i64)
}

fn coerce_number(value: &Value) -> Result<Value, String> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    };
    parsed
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| format!("expected a number, got {}", describe(value)))
}

fn coerce_boolean(value: &Value) -> Result<Value, String> {
    let parsed = match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    };
    parsed
        .map(Value::Bool)
        .ok_or_else(|| format!("expected a boolean, got {}", describe(value)))
}

fn coerce_date(value: &Value) -> Result<Value, String> {
    let reason = || format!("expected date in YYYY-MM-DD format, got {}", describe(value));
    let s = value.as_str().ok_or_else(reason)?;
    let date = NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).map_err(|_| reason())?;
    Ok(Value::String(date.format(DATE_FORMAT).to_string()))
}

fn coerce_enum(value: &Value, labels: &[&str]) -> Result<Value, String> {
    let reason = || {
        format!(
            "expected one of [{}], got {}",
            labels.join(", "),
            describe(value)
        )
    };
    let s = value.as_str().ok_or_else(reason)?.trim();
    labels
        .iter()
        .find(|label| label.eq_ignore_ascii_case(s))
        .map(|label| Value::String(label.to_string()))
        .ok_or_else(reason)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s.chars().take(40).collect::<String>()),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => json_type(other).to_string(),
    }
}

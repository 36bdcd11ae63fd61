//! Field schema model
//!
//! A form is an ordered list of [`Field`]s. Each field carries a closed
//! [`FieldKind`] variant holding only the configuration relevant to its type,
//! so normalization and validation are exhaustive matches over five cases.
//!
//! The wire representation (`{"id", "type", "label", "options", "min", ...}`)
//! is modelled by [`RawField`]; converting it into a [`Field`] is the only way
//! to build one and is where schema errors are raised.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use crate::error::{SchemaError, SchemaResult};

/// Default lower bound of a rating scale
pub const DEFAULT_RATING_MIN: i64 = 1;

/// Default upper bound of a rating scale
pub const DEFAULT_RATING_MAX: i64 = 5;

/// Title given to forms created without one
pub const UNTITLED_FORM: &str = "Untitled Form";

/// Field configuration exactly as authored or stored
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawField {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub type_name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    /// Authored keys this model does not interpret, such as `visibleIf`
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Type-specific configuration of a field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// Single-line free text
    Text,
    /// Multi-line free text
    Textarea,
    /// Exactly one of the listed options
    Mcq { options: Vec<String> },
    /// Any subset of the listed options
    Checkbox { options: Vec<String> },
    /// Integer within `[min, max]`
    Rating { min: i64, max: i64 },
}

impl FieldKind {
    /// Wire tag of this variant
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Textarea => "textarea",
            FieldKind::Mcq { .. } => "mcq",
            FieldKind::Checkbox { .. } => "checkbox",
            FieldKind::Rating { .. } => "rating",
        }
    }

    /// Options of a choice field
    pub fn options(&self) -> Option<&[String]> {
        match self {
            FieldKind::Mcq { options } | FieldKind::Checkbox { options } => Some(options),
            FieldKind::Text | FieldKind::Textarea | FieldKind::Rating { .. } => None,
        }
    }

    /// Whether one answer may produce more than one bucket key
    pub fn is_multi_valued(&self) -> bool {
        matches!(self, FieldKind::Checkbox { .. })
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// One authored question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawField", into = "RawField")]
pub struct Field {
    pub id: String,
    pub label: String,
    pub required: bool,
    pub placeholder: Option<String>,
    pub kind: FieldKind,
    /// Uninterpreted authored keys, kept for round-trips
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Field {
    /// Create a field from an already valid variant
    pub fn new(id: impl Into<String>, label: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            required: false,
            placeholder: None,
            kind,
            extra: BTreeMap::new(),
        }
    }

    pub fn text(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(id, label, FieldKind::Text)
    }

    pub fn textarea(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(id, label, FieldKind::Textarea)
    }

    /// Single-choice field; fails when `options` is empty
    pub fn mcq<I, S>(id: impl Into<String>, label: impl Into<String>, options: I) -> SchemaResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = id.into();
        let options = non_empty_options(&id, "mcq", options.into_iter().map(Into::into).collect())?;
        Ok(Self::new(id, label, FieldKind::Mcq { options }))
    }

    /// Multi-choice field; fails when `options` is empty
    pub fn checkbox<I, S>(id: impl Into<String>, label: impl Into<String>, options: I) -> SchemaResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = id.into();
        let options =
            non_empty_options(&id, "checkbox", options.into_iter().map(Into::into).collect())?;
        Ok(Self::new(id, label, FieldKind::Checkbox { options }))
    }

    /// Rating field; fails when `min > max`
    pub fn rating(id: impl Into<String>, label: impl Into<String>, min: i64, max: i64) -> SchemaResult<Self> {
        let id = id.into();
        if min > max {
            return Err(SchemaError::InvertedRange { field_id: id, min, max });
        }
        Ok(Self::new(id, label, FieldKind::Rating { min, max }))
    }

    /// Mark the field as required
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Set the input placeholder
    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    /// Construct and validate a field from raw configuration
    pub fn from_raw(raw: RawField) -> SchemaResult<Self> {
        let kind = match raw.type_name.as_str() {
            "text" => FieldKind::Text,
            "textarea" => FieldKind::Textarea,
            "mcq" => FieldKind::Mcq {
                options: non_empty_options(&raw.id, "mcq", raw.options.unwrap_or_default())?,
            },
            "checkbox" => FieldKind::Checkbox {
                options: non_empty_options(&raw.id, "checkbox", raw.options.unwrap_or_default())?,
            },
            "rating" => {
                let min = raw.min.unwrap_or(DEFAULT_RATING_MIN);
                let max = raw.max.unwrap_or(DEFAULT_RATING_MAX);
                if min > max {
                    return Err(SchemaError::InvertedRange {
                        field_id: raw.id,
                        min,
                        max,
                    });
                }
                FieldKind::Rating { min, max }
            }
            other => {
                return Err(SchemaError::UnknownType {
                    field_id: raw.id.clone(),
                    type_name: other.to_string(),
                })
            }
        };

        Ok(Self {
            id: raw.id,
            label: raw.label,
            required: raw.required.unwrap_or(false),
            placeholder: raw.placeholder,
            kind,
            extra: raw.extra,
        })
    }
}

fn non_empty_options(field_id: &str, type_name: &str, options: Vec<String>) -> SchemaResult<Vec<String>> {
    if options.is_empty() {
        return Err(SchemaError::MissingOptions {
            field_id: field_id.to_string(),
            type_name: type_name.to_string(),
        });
    }
    Ok(options)
}

impl TryFrom<RawField> for Field {
    type Error = SchemaError;

    fn try_from(raw: RawField) -> SchemaResult<Self> {
        Field::from_raw(raw)
    }
}

impl From<Field> for RawField {
    fn from(field: Field) -> Self {
        let type_name = field.kind.type_name().to_string();
        let (options, min, max) = match field.kind {
            FieldKind::Text | FieldKind::Textarea => (None, None, None),
            FieldKind::Mcq { options } | FieldKind::Checkbox { options } => (Some(options), None, None),
            FieldKind::Rating { min, max } => (None, Some(min), Some(max)),
        };
        RawField {
            id: field.id,
            type_name,
            label: field.label,
            required: Some(field.required),
            options,
            min,
            max,
            placeholder: field.placeholder,
            extra: field.extra,
        }
    }
}

/// Check ordering-level invariants of a field list: non-empty, unique ids
pub fn validate_fields(fields: &[Field]) -> SchemaResult<()> {
    let mut seen = HashSet::with_capacity(fields.len());
    for (position, field) in fields.iter().enumerate() {
        if field.id.is_empty() {
            return Err(SchemaError::EmptyFieldId { position });
        }
        if !seen.insert(field.id.as_str()) {
            return Err(SchemaError::DuplicateFieldId(field.id.clone()));
        }
    }
    Ok(())
}

/// Publication state of a form
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormStatus {
    #[default]
    Draft,
    Published,
}

impl fmt::Display for FormStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormStatus::Draft => write!(f, "draft"),
            FormStatus::Published => write!(f, "published"),
        }
    }
}

/// A form as served by the remote API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Form {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: FormStatus,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub fields: Vec<Field>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Form {
    /// New draft form; a blank title becomes [`UNTITLED_FORM`]
    pub fn draft(title: impl Into<String>) -> Self {
        let title = title.into();
        let title = if title.is_empty() {
            UNTITLED_FORM.to_string()
        } else {
            title
        };
        Self {
            id: None,
            title,
            description: String::new(),
            status: FormStatus::Draft,
            fields: Vec::new(),
            created_at: None,
            updated_at: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Append a field, keeping ids unique
    pub fn with_field(mut self, field: Field) -> SchemaResult<Self> {
        if self.fields.iter().any(|f| f.id == field.id) {
            return Err(SchemaError::DuplicateFieldId(field.id));
        }
        self.fields.push(field);
        Ok(self)
    }

    /// Transition to published
    pub fn publish(&mut self) {
        self.status = FormStatus::Published;
    }

    pub fn is_published(&self) -> bool {
        self.status == FormStatus::Published
    }

    /// Validate list-level invariants of the field list
    pub fn validate(&self) -> SchemaResult<()> {
        validate_fields(&self.fields)
    }

    /// Look up a field by id
    pub fn field(&self, id: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.id == id)
    }

    /// Index of field variants by id
    pub fn index(&self) -> FieldIndex {
        FieldIndex::from_fields(&self.fields)
    }

    /// Decode a stored form field by field
    ///
    /// Stored forms may hold fields that were never checked when they were
    /// saved. Each field that fails conversion, has an empty id, or repeats
    /// an earlier id is left out and reported; the rest of the form is kept.
    /// A bare list of fields is accepted as an untitled draft.
    pub fn from_value_lenient(value: serde_json::Value) -> Result<(Form, Vec<SchemaError>), serde_json::Error> {
        let (mut form, raw_fields) = match value {
            serde_json::Value::Array(fields) => (Form::draft(""), fields),
            serde_json::Value::Object(mut map) => {
                let fields = match map.remove("fields") {
                    Some(serde_json::Value::Array(fields)) => fields,
                    Some(serde_json::Value::Null) | None => Vec::new(),
                    Some(other) => {
                        return Err(serde::de::Error::custom(format!(
                            "'fields' must be a list, got {}",
                            other
                        )))
                    }
                };
                let form: Form = serde_json::from_value(serde_json::Value::Object(map))?;
                (form, fields)
            }
            other => {
                return Err(serde::de::Error::custom(format!(
                    "expected a form object or a list of fields, got {}",
                    other
                )))
            }
        };

        let mut errors = Vec::new();
        for (position, value) in raw_fields.into_iter().enumerate() {
            let field = serde_json::from_value::<RawField>(value)
                .map_err(|e| SchemaError::MalformedField {
                    position,
                    reason: e.to_string(),
                })
                .and_then(Field::from_raw);
            let field = match field {
                Ok(field) => field,
                Err(err) => {
                    errors.push(err);
                    continue;
                }
            };
            if field.id.is_empty() {
                errors.push(SchemaError::EmptyFieldId { position });
            } else if form.field(&field.id).is_some() {
                errors.push(SchemaError::DuplicateFieldId(field.id));
            } else {
                form.fields.push(field);
            }
        }
        Ok((form, errors))
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Field id to variant lookup used while normalizing incoming answers
#[derive(Debug, Clone, Default)]
pub struct FieldIndex {
    kinds: HashMap<String, FieldKind>,
}

impl FieldIndex {
    pub fn from_fields(fields: &[Field]) -> Self {
        let kinds = fields
            .iter()
            .map(|f| (f.id.clone(), f.kind.clone()))
            .collect();
        Self { kinds }
    }

    pub fn kind(&self, field_id: &str) -> Option<&FieldKind> {
        self.kinds.get(field_id)
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

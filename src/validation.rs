use std::collections::BTreeMap;

use serde::{Serialize, Serializer};

/// 单个字段的校验失败原因
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("This field is required.")]
    Required,
    #[error("Must not be greater than {max} characters.")]
    TooLong { max: usize },
    #[error("Must be one of: {}.", .0.join(", "))]
    NotOneOf(Vec<String>),
    #[error("Unknown {catalog} \"{key}\".")]
    UnknownCatalogKey { catalog: &'static str, key: String },
    #[error("Must be a valid date (YYYY-MM-DD).")]
    InvalidDate,
    #[error("The end date must be a date after or equal to the start date.")]
    InvalidDateRange,
    #[error("Must be a valid URL.")]
    InvalidUrl,
    #[error("The file may not be greater than {limit} bytes (got {size}).")]
    AssetTooLarge { size: usize, limit: usize },
    #[error("The file could not be read: {0}")]
    AssetUnreadable(String),
}

impl Serialize for FieldError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// 按字段收集的全部校验错误，字段名形如 `name`、`links.0.url`、`assets.1`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<FieldError>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, error: FieldError) {
        self.0.entry(field.into()).or_default().push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> &[FieldError] {
        self.0.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn contains(&self, field: &str, error: &FieldError) -> bool {
        self.get(field).contains(error)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// 必填文本：去除首尾空白后不能为空，且不超过 `max` 个字符
pub fn required_text(
    errors: &mut FieldErrors,
    field: &str,
    value: Option<&str>,
    max: usize,
) -> Option<String> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => max_chars(errors, field, v, max),
        None => {
            errors.add(field, FieldError::Required);
            None
        }
    }
}

/// 可选文本：空白视为未填写
pub fn optional_text(
    errors: &mut FieldErrors,
    field: &str,
    value: Option<&str>,
    max: Option<usize>,
) -> Option<String> {
    let v = value.map(str::trim).filter(|v| !v.is_empty())?;
    match max {
        Some(max) => max_chars(errors, field, v, max),
        None => Some(v.to_string()),
    }
}

fn max_chars(errors: &mut FieldErrors, field: &str, value: &str, max: usize) -> Option<String> {
    if value.chars().count() > max {
        errors.add(field, FieldError::TooLong { max });
        None
    } else {
        Some(value.to_string())
    }
}

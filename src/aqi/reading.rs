use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// One value per bulletin: forecast, action day, real time.
pub const EXPECTED_AQI_VALUES: usize = 3;

/// Errors for model output that is not an array of AQI numbers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AqiParseError {
    #[error("Response is not a JSON array of numbers")]
    NotAnArray,
    #[error("Expected {expected} AQI values, found {found}")]
    WrongCount { expected: usize, found: usize },
    #[error("Not a valid AQI value: {0}")]
    InvalidValue(String),
}

/// US EPA AQI bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AqiCategory {
    Good,
    Moderate,
    UnhealthyForSensitiveGroups,
    Unhealthy,
    VeryUnhealthy,
    Hazardous,
}

impl AqiCategory {
    pub fn from_aqi(aqi: u32) -> Self {
        match aqi {
            0..=50 => AqiCategory::Good,
            51..=100 => AqiCategory::Moderate,
            101..=150 => AqiCategory::UnhealthyForSensitiveGroups,
            151..=200 => AqiCategory::Unhealthy,
            201..=300 => AqiCategory::VeryUnhealthy,
            _ => AqiCategory::Hazardous,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AqiCategory::Good => "Good",
            AqiCategory::Moderate => "Moderate",
            AqiCategory::UnhealthyForSensitiveGroups => "Unhealthy for Sensitive Groups",
            AqiCategory::Unhealthy => "Unhealthy",
            AqiCategory::VeryUnhealthy => "Very Unhealthy",
            AqiCategory::Hazardous => "Hazardous",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AqiReading {
    pub aqi: u32,
    pub category: AqiCategory,
    pub label: &'static str,
}

impl AqiReading {
    pub fn new(aqi: u32) -> Self {
        let category = AqiCategory::from_aqi(aqi);
        Self {
            aqi,
            category,
            label: category.label(),
        }
    }
}

/// Parses model output such as `[42, 57, 101]` into readings.
///
/// Surrounding whitespace and a Markdown code fence (```` ```json ````) are
/// tolerated; anything else around the array is not. Values must be whole,
/// non-negative numbers and there must be exactly [`EXPECTED_AQI_VALUES`].
pub fn parse_aqi_values(raw: &str) -> Result<Vec<AqiReading>, AqiParseError> {
    let body = strip_code_fence(raw.trim());

    let values: Vec<Value> = serde_json::from_str(body).map_err(|_| AqiParseError::NotAnArray)?;

    if values.len() != EXPECTED_AQI_VALUES {
        return Err(AqiParseError::WrongCount {
            expected: EXPECTED_AQI_VALUES,
            found: values.len(),
        });
    }

    values
        .iter()
        .map(|value| to_aqi(value).map(AqiReading::new))
        .collect()
}

fn to_aqi(value: &Value) -> Result<u32, AqiParseError> {
    let invalid = || AqiParseError::InvalidValue(value.to_string());

    if let Some(n) = value.as_u64() {
        return u32::try_from(n).map_err(|_| invalid());
    }

    // Whole floats like 42.0
    let n = value.as_f64().ok_or_else(invalid)?;
    if n.is_finite() && n >= 0.0 && n.fract() == 0.0 && n <= f64::from(u32::MAX) {
        Ok(n as u32)
    } else {
        Err(invalid())
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (e.g. "json") up to the first newline
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

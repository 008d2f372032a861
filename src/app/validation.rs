//! Structural checks run before anything is persisted.
//!
//! Every rule runs on every call so the caller gets the full list of
//! violations in one round trip.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use url::Url;

use crate::app::error::Violation;
use crate::domain::geo::GeoPoint;
use crate::domain::report::{IncidentCategory, ReportContent};

pub const TITLE_MIN_CHARS: usize = 5;
pub const TITLE_MAX_CHARS: usize = 120;
pub const DESCRIPTION_MAX_CHARS: usize = 2000;
pub const ADDRESS_MAX_CHARS: usize = 200;
pub const VOTE_COMMENT_MAX_CHARS: usize = 500;
pub const REVIEW_TEXT_MAX_CHARS: usize = 1000;

/// One submitted field as it arrived. A wrong JSON type is kept as
/// `Invalid` instead of failing the whole body, so it can be reported
/// next to the other violations.
#[derive(Debug, Clone, PartialEq)]
pub enum Field<T> {
    Missing,
    Invalid,
    Value(T),
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Field::Missing
    }
}

impl<T> Field<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Field::Value(value) => Some(value),
            Field::Missing | Field::Invalid => None,
        }
    }
}

impl<T> From<T> for Field<T> {
    fn from(value: T) -> Self {
        Field::Value(value)
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Field<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        if value.is_null() {
            return Ok(Field::Missing);
        }
        Ok(serde_json::from_value(value).map_or(Field::Invalid, Field::Value))
    }
}

/// Raw submission fields as received from a client.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContentSubmission {
    pub category: Field<String>,
    pub title: Field<String>,
    pub description: Field<String>,
    pub latitude: Field<f64>,
    pub longitude: Field<f64>,
    pub address: Field<String>,
    pub media_refs: Field<Vec<String>>,
}

fn required<'a, T>(
    field: &'static str,
    value: &'a Field<T>,
    expected: &str,
    violations: &mut Vec<Violation>,
) -> Option<&'a T> {
    match value {
        Field::Value(value) => Some(value),
        Field::Missing => {
            violations.push(Violation::new(field, format!("{} is required", field)));
            None
        }
        Field::Invalid => {
            violations.push(Violation::new(field, format!("{} must be {}", field, expected)));
            None
        }
    }
}

/// Anonymous intake is held to tighter limits than named intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationProfile {
    Named,
    Anonymous,
}

impl ValidationProfile {
    pub fn description_min_chars(&self) -> usize {
        match self {
            ValidationProfile::Named => 20,
            ValidationProfile::Anonymous => 30,
        }
    }

    pub fn max_media_refs(&self) -> usize {
        match self {
            ValidationProfile::Named => 5,
            ValidationProfile::Anonymous => 3,
        }
    }
}

pub fn validate(
    submission: &ContentSubmission,
    profile: ValidationProfile,
) -> Result<(), Vec<Violation>> {
    let mut violations = Vec::new();

    if let Some(category) = required("category", &submission.category, "a string", &mut violations) {
        if IncidentCategory::from_db(category.trim()).is_none() {
            violations.push(Violation::new(
                "category",
                "category must be one of flood, landslide, fire, structural_risk, drought, windstorm, other",
            ));
        }
    }

    if let Some(title) = required("title", &submission.title, "a string", &mut violations) {
        let title_len = title.trim().chars().count();
        if !(TITLE_MIN_CHARS..=TITLE_MAX_CHARS).contains(&title_len) {
            violations.push(Violation::new(
                "title",
                format!(
                    "title must be between {} and {} characters",
                    TITLE_MIN_CHARS, TITLE_MAX_CHARS
                ),
            ));
        }
    }

    let min_description = profile.description_min_chars();
    if let Some(description) =
        required("description", &submission.description, "a string", &mut violations)
    {
        let description_len = description.trim().chars().count();
        if !(min_description..=DESCRIPTION_MAX_CHARS).contains(&description_len) {
            violations.push(Violation::new(
                "description",
                format!(
                    "description must be between {} and {} characters",
                    min_description, DESCRIPTION_MAX_CHARS
                ),
            ));
        }
    }

    if let Some(&latitude) = required("latitude", &submission.latitude, "a number", &mut violations) {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            violations.push(Violation::new(
                "latitude",
                "latitude must be between -90 and 90",
            ));
        }
    }
    if let Some(&longitude) =
        required("longitude", &submission.longitude, "a number", &mut violations)
    {
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            violations.push(Violation::new(
                "longitude",
                "longitude must be between -180 and 180",
            ));
        }
    }

    match &submission.address {
        Field::Missing => {}
        Field::Invalid => violations.push(Violation::new("address", "address must be a string")),
        Field::Value(address) => {
            if address.chars().count() > ADDRESS_MAX_CHARS {
                violations.push(Violation::new(
                    "address",
                    format!("address must be at most {} characters", ADDRESS_MAX_CHARS),
                ));
            }
        }
    }

    match &submission.media_refs {
        Field::Missing => {}
        Field::Invalid => violations.push(Violation::new(
            "media_refs",
            "media_refs must be a list of URLs",
        )),
        Field::Value(refs) => {
            let max_media = profile.max_media_refs();
            if refs.len() > max_media {
                violations.push(Violation::new(
                    "media_refs",
                    format!("at most {} media references are allowed", max_media),
                ));
            }
            if refs.iter().any(|r| !is_http_url(r)) {
                violations.push(Violation::new(
                    "media_refs",
                    "media references must be http(s) URLs",
                ));
            }
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

/// Validates and converts into the typed content shape.
pub fn into_content(
    submission: ContentSubmission,
    profile: ValidationProfile,
) -> Result<ReportContent, Vec<Violation>> {
    validate(&submission, profile)?;

    let ContentSubmission {
        category,
        title,
        description,
        latitude,
        longitude,
        address,
        media_refs,
    } = submission;
    let (
        Field::Value(category),
        Field::Value(title),
        Field::Value(description),
        Field::Value(latitude),
        Field::Value(longitude),
    ) = (category, title, description, latitude, longitude)
    else {
        return Err(vec![Violation::new("body", "submission is incomplete")]);
    };
    let category = IncidentCategory::from_db(category.trim())
        .ok_or_else(|| vec![Violation::new("category", "unknown category")])?;
    let address = address
        .into_option()
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty());

    Ok(ReportContent {
        category,
        title: title.trim().to_string(),
        description: description.trim().to_string(),
        location: GeoPoint::new(latitude, longitude),
        address,
        media_refs: media_refs.into_option().unwrap_or_default(),
    })
}

pub fn validate_optional_text(
    field: &'static str,
    value: Option<&str>,
    max_chars: usize,
) -> Result<(), Violation> {
    match value {
        Some(text) if text.chars().count() > max_chars => Err(Violation::new(
            field,
            format!("{} must be at most {} characters", field, max_chars),
        )),
        _ => Ok(()),
    }
}

fn is_http_url(value: &str) -> bool {
    Url::parse(value)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.host().is_some())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission() -> ContentSubmission {
        ContentSubmission {
            category: "flood".to_string().into(),
            title: "Street flooded".to_string().into(),
            description: "Water up to the knees on Rua Augusta!!".to_string().into(),
            latitude: (-23.55).into(),
            longitude: (-46.63).into(),
            address: "Rua Augusta, 100".to_string().into(),
            media_refs: vec!["https://media.vigia.local/a.jpg".to_string()].into(),
        }
    }

    #[test]
    fn accepts_well_formed_submission() {
        assert_eq!(validate(&submission(), ValidationProfile::Named), Ok(()));
    }

    #[test]
    fn reports_every_violation_at_once() {
        let bad = ContentSubmission {
            category: "volcano".to_string().into(),
            title: "x".to_string().into(),
            description: "short".to_string().into(),
            latitude: 91.0.into(),
            longitude: (-181.0).into(),
            address: Field::Missing,
            media_refs: (0..6)
                .map(|i| format!("https://m/{i}.jpg"))
                .collect::<Vec<_>>()
                .into(),
        };

        let violations = validate(&bad, ValidationProfile::Named).unwrap_err();
        let fields: Vec<_> = violations.iter().map(|v| v.field).collect();
        assert_eq!(
            fields,
            vec!["category", "title", "description", "latitude", "longitude", "media_refs"]
        );
    }

    #[test]
    fn anonymous_profile_is_stricter() {
        let mut s = submission();
        s.description = "a".repeat(25).into();
        assert!(validate(&s, ValidationProfile::Named).is_ok());
        assert!(validate(&s, ValidationProfile::Anonymous).is_err());

        let mut s = submission();
        s.media_refs = (0..4)
            .map(|i| format!("https://m.example/{i}.jpg"))
            .collect::<Vec<_>>()
            .into();
        assert!(validate(&s, ValidationProfile::Named).is_ok());
        let violations = validate(&s, ValidationProfile::Anonymous).unwrap_err();
        assert_eq!(violations[0].field, "media_refs");
    }

    #[test]
    fn rejects_non_http_media_refs() {
        let mut s = submission();
        s.media_refs = vec!["file:///etc/passwd".to_string()].into();
        let violations = validate(&s, ValidationProfile::Named).unwrap_err();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, "media_refs");
    }

    #[test]
    fn rejects_nan_coordinates() {
        let mut s = submission();
        s.latitude = f64::NAN.into();
        let violations = validate(&s, ValidationProfile::Named).unwrap_err();
        assert_eq!(violations[0].field, "latitude");
    }

    #[test]
    fn into_content_trims_and_types_fields() {
        let mut s = submission();
        s.title = "  Street flooded  ".to_string().into();
        s.address = "   ".to_string().into();
        let content = into_content(s, ValidationProfile::Named).unwrap();
        assert_eq!(content.title, "Street flooded");
        assert_eq!(content.address, None);
        assert_eq!(content.category, IncidentCategory::Flood);
    }

    #[test]
    fn missing_and_mistyped_fields_are_violations() {
        let parsed: ContentSubmission = serde_json::from_value(serde_json::json!({
            "category": "flood",
            "title": 42,
            "latitude": "south",
            "media_refs": "https://media.vigia.local/a.jpg",
        }))
        .unwrap();
        assert_eq!(parsed.category, Field::Value("flood".to_string()));
        assert_eq!(parsed.title, Field::Invalid);
        assert_eq!(parsed.description, Field::Missing);

        let violations = validate(&parsed, ValidationProfile::Named).unwrap_err();
        let fields: Vec<_> = violations.iter().map(|v| v.field).collect();
        assert_eq!(
            fields,
            vec!["title", "description", "latitude", "longitude", "media_refs"]
        );
        assert_eq!(violations[1].message, "description is required");
        assert_eq!(violations[2].message, "latitude must be a number");
    }

    #[test]
    fn optional_fields_may_be_null_or_absent() {
        let parsed: ContentSubmission = serde_json::from_value(serde_json::json!({
            "category": "fire",
            "title": "Brush fire",
            "description": "Smoke coming over the ridge near the school",
            "latitude": -15.79,
            "longitude": -47.88,
            "address": null,
        }))
        .unwrap();
        let content = into_content(parsed, ValidationProfile::Named).unwrap();
        assert_eq!(content.address, None);
        assert!(content.media_refs.is_empty());
    }
}

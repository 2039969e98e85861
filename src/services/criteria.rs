//! Turns a user's alert form into canonical, matchable [`Criteria`].

use chrono::{Datelike, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::{
    error::{FieldErrors, ValidationError},
    models::{Criteria, GeoPoint, YearRange},
};

pub const EARLIEST_YEAR: i32 = 1900;

// large enough for any vehicle, small enough that cents fit in i64
const MAX_PRICE: f64 = 1_000_000_000.0;

/// Alert creation request as the dashboard sends it. Every value may be a
/// JSON string or number; blank means "no bound".
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAlertInput {
    #[serde(default, alias = "modelQuery")]
    pub model: Option<Value>,

    // "2017-2020", "2018", "2017-", "-2020"
    #[serde(default)]
    pub years: Option<Value>,
    // { "min": 2017, "max": 2020 }, as alerts are returned
    #[serde(default)]
    pub year_range: Option<Value>,
    #[serde(default)]
    pub min_year: Option<Value>,
    #[serde(default)]
    pub max_year: Option<Value>,

    #[serde(default, alias = "maxPrice")]
    pub price: Option<Value>,
    #[serde(default, alias = "maxDistanceMiles")]
    pub distance: Option<Value>,

    #[serde(default)]
    pub reference_lat: Option<Value>,
    #[serde(default)]
    pub reference_lng: Option<Value>,
    // { "lat": .., "lng": .. }, used when referenceLat/referenceLng are absent
    #[serde(default)]
    pub reference_location: Option<Value>,
}

pub fn validate(input: &CreateAlertInput) -> Result<Criteria, ValidationError> {
    validate_at(input, Utc::now().year())
}

/// Same as [`validate`] with an explicit "current year" for the upper year bound.
pub fn validate_at(input: &CreateAlertInput, current_year: i32) -> Result<Criteria, ValidationError> {
    let mut errs = FieldErrors::new();

    let model_query = text(&input.model).unwrap_or_default();
    if model_query.is_empty() {
        errs.insert("modelQuery".into(), "Enter a make or model.".into());
    }

    let year_range = match year_range(input, current_year) {
        Ok(r) => r,
        Err(msg) => {
            errs.insert("yearRange".into(), msg);
            YearRange::open()
        }
    };

    let max_price = match text(&input.price) {
        None => None,
        Some(s) => match parse_amount(&s) {
            Some(v) if v < 0.0 => {
                errs.insert("maxPrice".into(), "Max price must not be negative.".into());
                None
            }
            Some(v) if v > MAX_PRICE => {
                errs.insert("maxPrice".into(), "Max price is too large.".into());
                None
            }
            Some(v) => Some((v * 100.0).round() as i64),
            None => {
                errs.insert("maxPrice".into(), "Enter a valid max price.".into());
                None
            }
        },
    };

    let max_distance_miles = match text(&input.distance) {
        None => None,
        Some(s) => match parse_amount(&s) {
            Some(v) if v < 0.0 => {
                errs.insert("maxDistanceMiles".into(), "Max distance must not be negative.".into());
                None
            }
            Some(v) => Some(v),
            None => {
                errs.insert("maxDistanceMiles".into(), "Enter a valid distance in miles.".into());
                None
            }
        },
    };

    let (ref_lat, ref_lng) = reference_parts(input);
    let reference_location = match (text(&ref_lat), text(&ref_lng)) {
        (None, None) => None,
        (Some(lat), Some(lng)) => {
            let point = lat
                .parse::<f64>()
                .ok()
                .zip(lng.parse::<f64>().ok())
                .and_then(|(lat, lng)| GeoPoint::new(lat, lng));
            if point.is_none() {
                errs.insert("referenceLocation".into(), "Reference location is out of range.".into());
            }
            point
        }
        _ => {
            errs.insert(
                "referenceLocation".into(),
                "Reference location needs both latitude and longitude.".into(),
            );
            None
        }
    };

    if !errs.is_empty() {
        return Err(ValidationError { fields: errs });
    }

    Ok(Criteria {
        model_query,
        year_range,
        max_price,
        max_distance_miles,
        reference_location,
    })
}

fn text(v: &Option<Value>) -> Option<String> {
    let s = match v.as_ref()? {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    };
    (!s.is_empty()).then_some(s)
}

/// Accepts "9000", "9,000", "$9,000.50".
fn parse_amount(s: &str) -> Option<f64> {
    let cleaned: String = s
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    let v = cleaned.parse::<f64>().ok()?;
    v.is_finite().then_some(v)
}

fn reference_parts(input: &CreateAlertInput) -> (Option<Value>, Option<Value>) {
    let point = input.reference_location.as_ref().and_then(Value::as_object);
    match (&input.reference_lat, &input.reference_lng, point) {
        (None, None, Some(p)) => (p.get("lat").cloned(), p.get("lng").cloned()),
        (lat, lng, _) => (lat.clone(), lng.clone()),
    }
}

fn year_range(input: &CreateAlertInput, current_year: i32) -> Result<YearRange, String> {
    let years = text(&input.years).or_else(|| match &input.year_range {
        Some(Value::String(s)) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        _ => None,
    });

    let range = match years {
        Some(years) => parse_years(&years, current_year)?,
        None => {
            let (min, max) = match input.year_range.as_ref().and_then(Value::as_object) {
                Some(r) => (r.get("min").cloned(), r.get("max").cloned()),
                None => (input.min_year.clone(), input.max_year.clone()),
            };
            YearRange {
                min: text(&min).map(|s| parse_year(&s, current_year)).transpose()?,
                max: text(&max).map(|s| parse_year(&s, current_year)).transpose()?,
            }
        }
    };

    if let (Some(min), Some(max)) = (range.min, range.max) {
        if min > max {
            return Err(format!("Start year {min} is after end year {max}."));
        }
    }
    Ok(range)
}

fn parse_years(s: &str, current_year: i32) -> Result<YearRange, String> {
    let s = s.replace(['\u{2013}', '\u{2014}'], "-");
    let s = s.trim();

    if let Some(from) = s.strip_suffix('+') {
        return Ok(YearRange {
            min: Some(parse_year(from, current_year)?),
            max: None,
        });
    }

    let Some((from, to)) = s.split_once('-') else {
        let y = parse_year(s, current_year)?;
        return Ok(YearRange { min: Some(y), max: Some(y) });
    };

    let (from, to) = (from.trim(), to.trim());
    if from.is_empty() && to.is_empty() {
        return Err("Enter a year range like 2017-2020.".into());
    }

    Ok(YearRange {
        min: (!from.is_empty()).then(|| parse_year(from, current_year)).transpose()?,
        max: (!to.is_empty()).then(|| parse_year(to, current_year)).transpose()?,
    })
}

fn parse_year(s: &str, current_year: i32) -> Result<i32, String> {
    let s = s.trim();
    let latest = current_year + 1;

    if s.len() != 4 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("'{s}' is not a 4-digit year."));
    }
    let y: i32 = s.parse().map_err(|_| format!("'{s}' is not a 4-digit year."))?;
    if !(EARLIEST_YEAR..=latest).contains(&y) {
        return Err(format!("Years must be between {EARLIEST_YEAR} and {latest}."));
    }
    Ok(y)
}

//! Maps raw search-index records onto [`Listing`].
//!
//! Nothing here fails on a bad price, year or location: those become `None`
//! so one sloppy upstream record can't take down the batch it arrived in.
//! Only records we cannot identify at all are skipped.

use chrono::DateTime;
use serde_json::{Map, Value};

use crate::{
    error::NormalizationSkip,
    models::{GeoPoint, Listing, RawListing},
};

const MIN_YEAR: i64 = 1886;
const MAX_YEAR: i64 = 2100;

// anything above this is already in millis
const SECONDS_CUTOFF: i64 = 100_000_000_000;

pub fn normalize(raw: &RawListing) -> Result<Listing, NormalizationSkip> {
    let Value::Object(obj) = &raw.0 else {
        return Err(NormalizationSkip::NotAnObject);
    };

    let id = first(obj, &["id", "objectID", "_id"])
        .and_then(id_text)
        .ok_or(NormalizationSkip::MissingId)?;

    let title = obj
        .get("title")
        .and_then(Value::as_str)
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|t| !t.is_empty())
        .ok_or_else(|| NormalizationSkip::MissingTitle(id.clone()))?;

    Ok(Listing {
        price: obj.get("price").and_then(price_minor),
        year: obj.get("year").and_then(year),
        location: first(obj, &["location", "_geoloc"]).and_then(location),
        source_timestamp: first(obj, &["sourceTimestamp", "updatedAt", "timestamp"]).and_then(timestamp),
        id,
        title,
    })
}

fn first<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().filter_map(|k| obj.get(*k)).find(|v| !v.is_null())
}

fn id_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let cleaned: String = s
                .trim()
                .trim_start_matches('$')
                .chars()
                .filter(|c| *c != ',' && !c.is_whitespace())
                .collect();
            cleaned.parse().ok()?
        }
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn price_minor(v: &Value) -> Option<i64> {
    let dollars = number(v)?;
    if dollars < 0.0 || dollars > 1_000_000_000.0 {
        return None;
    }
    Some((dollars * 100.0).round() as i64)
}

fn year(v: &Value) -> Option<i32> {
    let y = number(v)?;
    if y.fract() != 0.0 {
        return None;
    }
    let y = y as i64;
    (MIN_YEAR..=MAX_YEAR).contains(&y).then_some(y as i32)
}

fn location(v: &Value) -> Option<GeoPoint> {
    match v {
        Value::Object(o) => {
            let lat = first(o, &["lat", "latitude"]).and_then(number)?;
            let lng = first(o, &["lng", "lon", "long", "longitude"]).and_then(number)?;
            GeoPoint::new(lat, lng)
        }
        // "lat,lng"
        Value::String(s) => {
            let (lat, lng) = s.split_once(',')?;
            GeoPoint::new(lat.trim().parse().ok()?, lng.trim().parse().ok()?)
        }
        Value::Array(a) if a.len() == 2 => GeoPoint::new(number(&a[0])?, number(&a[1])?),
        _ => None,
    }
}

fn timestamp(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => {
            let t = n.as_i64()?;
            if t <= 0 {
                None
            } else if t < SECONDS_CUTOFF {
                Some(t * 1000)
            } else {
                Some(t)
            }
        }
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.timestamp_millis()),
        _ => None,
    }
}

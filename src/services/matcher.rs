//! Pure match predicate between one listing and one set of criteria.
//!
//! Missing listing data never rejects: a null year, price or location passes
//! the corresponding check.

use std::sync::OnceLock;

use regex::Regex;

use crate::models::{Criteria, GeoPoint, Listing};

const EARTH_RADIUS_MILES: f64 = 3958.8;

pub fn matches(listing: &Listing, criteria: &Criteria) -> bool {
    model_matches(&listing.title, &criteria.model_query)
        && year_matches(listing, criteria)
        && price_matches(listing, criteria)
        && distance_matches(listing, criteria)
}

/// Lowercased alphanumeric tokens. "Honda Accord-LX" -> ["honda", "accord", "lx"]
pub fn tokens(s: &str) -> Vec<String> {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    let re = TOKEN.get_or_init(|| Regex::new(r"[[:alnum:]]+").expect("static regex"));
    re.find_iter(s).map(|m| m.as_str().to_lowercase()).collect()
}

/// Every query token appears in the title, in order. Gaps are allowed.
pub fn model_matches(title: &str, query: &str) -> bool {
    let wanted = tokens(query);
    if wanted.is_empty() {
        return true;
    }

    let mut title_tokens = tokens(title).into_iter();
    wanted
        .iter()
        .all(|w| title_tokens.by_ref().any(|t| &t == w))
}

fn year_matches(listing: &Listing, criteria: &Criteria) -> bool {
    listing.year.map_or(true, |y| criteria.year_range.contains(y))
}

fn price_matches(listing: &Listing, criteria: &Criteria) -> bool {
    match (listing.price, criteria.max_price) {
        (Some(price), Some(max)) => price <= max,
        _ => true,
    }
}

fn distance_matches(listing: &Listing, criteria: &Criteria) -> bool {
    match (criteria.max_distance_miles, listing.location, criteria.reference_location) {
        (Some(max), Some(at), Some(from)) => distance_miles(from, at) <= max,
        _ => true,
    }
}

/// Great-circle (haversine) distance.
pub fn distance_miles(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_MILES * h.sqrt().min(1.0).asin()
}

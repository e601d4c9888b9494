use geo::{HaversineDistance, Point};

use crate::core::features::normalize_label;

/// A predefined point used as a proxy for a neighbourhood
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NamedArea {
    pub name: &'static str,
    pub latitude: f64,
    pub longitude: f64,
}

/// Named areas known to location scoring, keyed by normalized name
pub const NAMED_AREAS: &[NamedArea] = &[
    NamedArea { name: "angel", latitude: 51.5322, longitude: -0.1058 },
    NamedArea { name: "brixton", latitude: 51.4613, longitude: -0.1156 },
    NamedArea { name: "camden", latitude: 51.5390, longitude: -0.1426 },
    NamedArea { name: "canary_wharf", latitude: 51.5054, longitude: -0.0235 },
    NamedArea { name: "city_of_london", latitude: 51.5155, longitude: -0.0922 },
    NamedArea { name: "clapham", latitude: 51.4620, longitude: -0.1380 },
    NamedArea { name: "greenwich", latitude: 51.4826, longitude: -0.0077 },
    NamedArea { name: "hackney", latitude: 51.5450, longitude: -0.0553 },
    NamedArea { name: "hammersmith", latitude: 51.4927, longitude: -0.2339 },
    NamedArea { name: "islington", latitude: 51.5416, longitude: -0.1022 },
    NamedArea { name: "kings_cross", latitude: 51.5308, longitude: -0.1238 },
    NamedArea { name: "london_bridge", latitude: 51.5079, longitude: -0.0877 },
    NamedArea { name: "notting_hill", latitude: 51.5096, longitude: -0.1967 },
    NamedArea { name: "shoreditch", latitude: 51.5265, longitude: -0.0788 },
    NamedArea { name: "soho", latitude: 51.5136, longitude: -0.1365 },
    NamedArea { name: "stratford", latitude: 51.5413, longitude: -0.0032 },
    NamedArea { name: "wembley", latitude: 51.5588, longitude: -0.2817 },
    NamedArea { name: "westminster", latitude: 51.4975, longitude: -0.1357 },
    NamedArea { name: "wimbledon", latitude: 51.4214, longitude: -0.2064 },
];

/// Postcode areas treated as neighbours for district matching
const ADJACENT_POSTCODE_AREAS: &[(&str, &[&str])] = &[
    ("E", &["EC", "N", "SE", "IG"]),
    ("EC", &["WC", "E", "N", "SE"]),
    ("N", &["NW", "EC", "E", "WC"]),
    ("NW", &["N", "W", "WC"]),
    ("SE", &["SW", "E", "EC", "WC"]),
    ("SW", &["W", "SE", "WC"]),
    ("W", &["NW", "SW", "WC"]),
    ("WC", &["EC", "W", "NW", "N", "SW", "SE"]),
];

/// Calculate the Haversine distance between two points in kilometers
///
/// # Arguments
/// * `lat1` - Latitude of first point in degrees
/// * `lon1` - Longitude of first point in degrees
/// * `lat2` - Latitude of second point in degrees
/// * `lon2` - Longitude of second point in degrees
#[inline]
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let from = Point::new(lon1, lat1);
    let to = Point::new(lon2, lat2);

    from.haversine_distance(&to) / 1000.0
}

/// Look up a named area, accepting any spelling that normalizes to its key
pub fn lookup_area(name: &str) -> Option<&'static NamedArea> {
    let key = normalize_label(name);
    NAMED_AREAS.iter().find(|area| area.name == key)
}

/// Distance in km from a point to a named area, if the area is known
pub fn distance_to_area(latitude: f64, longitude: f64, area_name: &str) -> Option<f64> {
    lookup_area(area_name)
        .map(|area| haversine_distance(latitude, longitude, area.latitude, area.longitude))
}

/// Bucketed proximity score (0-100) for a distance in km
#[inline]
pub fn proximity_score(distance_km: f64) -> f64 {
    match distance_km {
        d if d <= 1.0 => 100.0,
        d if d <= 3.0 => 80.0,
        d if d <= 5.0 => 60.0,
        d if d <= 10.0 => 40.0,
        _ => 20.0,
    }
}

/// Outward code of a UK-style postcode ("SW1A 1AA" -> "SW1A")
pub fn outward_code(postcode: &str) -> Option<String> {
    let upper = postcode.trim().to_uppercase();
    if upper.is_empty() {
        return None;
    }

    if let Some((outward, _)) = upper.split_once(char::is_whitespace) {
        return Some(outward.to_string());
    }

    // Without a space, a full postcode ends in a 3 character inward code
    let chars: Vec<char> = upper.chars().collect();
    if chars.len() >= 5 {
        Some(chars[..chars.len() - 3].iter().collect())
    } else {
        Some(upper)
    }
}

/// Postcode area: the leading letters of the outward code ("SW1A" -> "SW")
pub fn postcode_area(outward: &str) -> String {
    outward
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect()
}

pub fn areas_adjacent(a: &str, b: &str) -> bool {
    let listed = |from: &str, to: &str| {
        ADJACENT_POSTCODE_AREAS
            .iter()
            .any(|(area, neighbours)| *area == from && neighbours.contains(&to))
    };

    listed(a, b) || listed(b, a)
}

/// Score how well a listing's postcode matches the requested one (0-100)
///
/// Identical outward code scores 100, same area 70, a neighbouring area 50,
/// anything else 20. A listing without a postcode gets the neutral 50.
pub fn district_match_score(preferred: &str, listing: Option<&str>) -> f64 {
    let Some(listing) = listing else {
        return 50.0;
    };

    let (Some(wanted), Some(actual)) = (outward_code(preferred), outward_code(listing)) else {
        return 50.0;
    };

    if wanted == actual {
        return 100.0;
    }

    let wanted_area = postcode_area(&wanted);
    let actual_area = postcode_area(&actual);

    if !wanted_area.is_empty() && wanted_area == actual_area {
        70.0
    } else if areas_adjacent(&wanted_area, &actual_area) {
        50.0
    } else {
        20.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_distance() {
        // Distance from London to Paris (approximately 344 km)
        let distance = haversine_distance(51.5074, -0.1278, 48.8566, 2.3522);
        assert!((distance - 344.0).abs() < 10.0, "Distance should be ~344km, got {}", distance);
    }

    #[test]
    fn test_haversine_distance_zero() {
        assert!(haversine_distance(51.5, -0.1, 51.5, -0.1) < 0.001);
    }

    #[test]
    fn test_lookup_area_normalizes_name() {
        let area = lookup_area("Canary Wharf").expect("known area");
        assert_eq!(area.name, "canary_wharf");
        assert!(lookup_area("Atlantis").is_none());
    }

    #[test]
    fn test_distance_to_area() {
        let soho = lookup_area("soho").unwrap();
        let d = distance_to_area(soho.latitude, soho.longitude, "soho").unwrap();
        assert!(d < 0.01);

        let far = distance_to_area(soho.latitude, soho.longitude, "wimbledon").unwrap();
        assert!(far > 5.0 && far < 15.0, "Soho to Wimbledon ~11km, got {}", far);
    }

    #[test]
    fn test_proximity_buckets() {
        assert_eq!(proximity_score(0.5), 100.0);
        assert_eq!(proximity_score(1.0), 100.0);
        assert_eq!(proximity_score(2.5), 80.0);
        assert_eq!(proximity_score(4.9), 60.0);
        assert_eq!(proximity_score(9.0), 40.0);
        assert_eq!(proximity_score(25.0), 20.0);
    }

    #[test]
    fn test_outward_code() {
        assert_eq!(outward_code("sw1a 1aa").as_deref(), Some("SW1A"));
        assert_eq!(outward_code("E14 5AB").as_deref(), Some("E14"));
        assert_eq!(outward_code("E145AB").as_deref(), Some("E14"));
        assert_eq!(outward_code("N1").as_deref(), Some("N1"));
        assert_eq!(outward_code("  "), None);
    }

    #[test]
    fn test_district_match_score() {
        assert_eq!(district_match_score("E14", Some("E14 9GE")), 100.0);
        assert_eq!(district_match_score("E14", Some("E1 6AN")), 70.0);
        assert_eq!(district_match_score("E14", Some("SE10 9NN")), 50.0);
        assert_eq!(district_match_score("E14", Some("SW19 5AE")), 20.0);
        assert_eq!(district_match_score("E14", None), 50.0);
    }

    #[test]
    fn test_adjacency_is_symmetric() {
        assert!(areas_adjacent("IG", "E"));
        assert!(areas_adjacent("E", "IG"));
        assert!(!areas_adjacent("SW", "N"));
    }
}

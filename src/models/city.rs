use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CityMetadata {
    pub city_id: i64,

    #[validate(length(min = 1))]
    pub city_name: String,

    pub romanized_name: Option<String>,
    pub koatuu: Option<String>,
    pub katottg: Option<String>,
    pub region_name: Option<String>,
}

impl CityMetadata {
    pub fn new(city_id: i64, city_name: String, region_name: Option<String>) -> Self {
        Self {
            city_id,
            city_name,
            romanized_name: None,
            koatuu: None,
            katottg: None,
            region_name,
        }
    }

    pub fn with_codes(mut self, koatuu: Option<String>, katottg: Option<String>) -> Self {
        self.koatuu = koatuu;
        self.katottg = katottg;
        self
    }

    /// Oblast-level KOATUU code: the first two digits padded with zeros.
    ///
    /// ```
    /// use aq_processor::models::CityMetadata;
    ///
    /// let city = CityMetadata::new(1, "Київ".into(), None)
    ///     .with_codes(Some("8000000000".into()), None);
    /// assert_eq!(city.region_code().as_deref(), Some("8000000000"));
    /// ```
    pub fn region_code(&self) -> Option<String> {
        self.koatuu.as_deref().and_then(oblast_code)
    }

    /// Region name trimmed for joining
    pub fn region_key(&self) -> Option<String> {
        self.region_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

/// Normalize any KOATUU code to its oblast-level form
pub fn oblast_code(code: &str) -> Option<String> {
    let digits: String = code.trim().chars().filter(|c| c.is_ascii_digit()).collect();
    // leading zeros are often lost when codes round-trip through spreadsheets
    let digits = match digits.len() {
        9 => format!("0{}", digits),
        10 => digits,
        _ => return None,
    };
    Some(format!("{}00000000", &digits[..2]))
}

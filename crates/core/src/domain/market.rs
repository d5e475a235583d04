use crate::domain::localized::LocalizedString;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A stored daily market document.
///
/// Every field defaults so that partially populated legacy documents still
/// load; records written by the generator always carry all of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketRecord {
    #[serde(default)]
    pub location: LocalizedString,
    #[serde(default)]
    pub continent: LocalizedString,
    #[serde(default)]
    pub hero_image: String,
    #[serde(default)]
    pub ingredients: Vec<ProductEntry>,
    #[serde(default)]
    pub fun_fact: LocalizedString,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductEntry {
    #[serde(default)]
    pub title: LocalizedString,
    #[serde(default)]
    pub description: LocalizedString,
    #[serde(default)]
    pub image_src: String,
}

/// A record resolved for a single language, as served to the frontend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketView {
    pub date: NaiveDate,
    pub lang: String,
    pub location: String,
    pub continent: String,
    pub hero_image: String,
    pub ingredients: Vec<ProductView>,
    pub fun_fact: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductView {
    pub title: String,
    pub description: String,
    pub image_src: String,
}

impl MarketRecord {
    pub fn localize(&self, date: NaiveDate, lang: &str) -> MarketView {
        MarketView {
            date,
            lang: lang.to_string(),
            location: self.location.resolve(lang).to_string(),
            continent: self.continent.resolve(lang).to_string(),
            hero_image: self.hero_image.clone(),
            ingredients: self
                .ingredients
                .iter()
                .map(|p| ProductView {
                    title: p.title.resolve(lang).to_string(),
                    description: p.description.resolve(lang).to_string(),
                    image_src: p.image_src.clone(),
                })
                .collect(),
            fun_fact: self.fun_fact.resolve(lang).to_string(),
        }
    }

    /// Country id used for the anti-repetition marker.
    pub fn country(&self) -> String {
        country_from_location(self.location.english())
    }
}

/// "Marrakech, Morocco" -> "Morocco". Without a comma (or with nothing after
/// it) the whole trimmed location is used, minus any trailing comma.
pub fn country_from_location(location: &str) -> String {
    let trimmed = location.trim();
    match trimmed.split_once(',') {
        Some((_, rest)) if !rest.trim().is_empty() => rest.trim().to_string(),
        _ => trimmed.trim_end_matches(',').trim().to_string(),
    }
}

use crate::domain::localized::LocalizedString;
use anyhow::ensure;
use serde::{Deserialize, Serialize};

pub const PRODUCTS_PER_MARKET: usize = 3;

/// Market as returned by the text model, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmMarket {
    pub location: LocalizedString,
    pub continent: LocalizedString,
    pub hero_image_description: String,
    pub products: Vec<LlmProduct>,
    pub fun_fact: LocalizedString,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmProduct {
    pub title: LocalizedString,
    pub image_description: String,
    pub description: LocalizedString,
}

/// Validated market text that still needs its images.
#[derive(Debug, Clone)]
pub struct MarketDraft {
    pub location: LocalizedString,
    pub continent: LocalizedString,
    pub hero_image_description: String,
    pub products: Vec<ProductDraft>,
    pub fun_fact: LocalizedString,
}

#[derive(Debug, Clone)]
pub struct ProductDraft {
    pub title: LocalizedString,
    pub image_description: String,
    pub description: LocalizedString,
}

impl LlmMarket {
    pub fn validate_and_into_draft(self) -> anyhow::Result<MarketDraft> {
        ensure!(
            self.products.len() == PRODUCTS_PER_MARKET,
            "LLM output must contain exactly {PRODUCTS_PER_MARKET} products (got {})",
            self.products.len()
        );

        let location = require_text("location", self.location)?;
        let continent = require_text("continent", self.continent)?;
        let fun_fact = require_text("funFact", self.fun_fact)?;

        let hero_image_description = self.hero_image_description.trim().to_string();
        ensure!(
            !hero_image_description.is_empty(),
            "heroImageDescription must be non-empty"
        );

        let mut products = Vec::with_capacity(self.products.len());
        for (idx, product) in self.products.into_iter().enumerate() {
            products.push(product.validate_and_into_draft(idx)?);
        }

        Ok(MarketDraft {
            location,
            continent,
            hero_image_description,
            products,
            fun_fact,
        })
    }
}

impl LlmProduct {
    fn validate_and_into_draft(self, idx: usize) -> anyhow::Result<ProductDraft> {
        let title = require_text(&format!("products[{idx}].title"), self.title)?;
        let description = require_text(&format!("products[{idx}].description"), self.description)?;

        let image_description = self.image_description.trim().to_string();
        ensure!(
            !image_description.is_empty(),
            "products[{idx}].imageDescription must be non-empty"
        );

        Ok(ProductDraft {
            title,
            image_description,
            description,
        })
    }
}

fn require_text(field: &str, value: LocalizedString) -> anyhow::Result<LocalizedString> {
    let value = value.trimmed();
    ensure!(
        value.has_default_text(),
        "{field} must have non-empty English text"
    );
    Ok(value)
}

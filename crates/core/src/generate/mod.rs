//! Daily market generation pipeline.
//!
//! One run: read anti-repetition constraints, ask the text model for a
//! bilingual market, illustrate it (hero first, then each product with a
//! pacing delay), and persist the record plus its country marker. Nothing is
//! written unless every image was produced.

pub mod prompt;

use crate::config::Settings;
use crate::domain::contract::MarketDraft;
use crate::domain::market::{MarketRecord, ProductEntry};
use crate::gcp::auth::AccessTokenProvider;
use crate::imaging::imagen::ImagenClient;
use crate::imaging::publisher::{ImagePublisher, RetryPolicy};
use crate::imaging::{ImageClient, ImageJob};
use crate::llm::gemini::GeminiClient;
use crate::llm::{json, TextModel};
use crate::storage::objects::GcsObjectStore;
use crate::storage::{MarketStore, PriorMarketPolicy};
use crate::time::target_date::{date_key, resolve_target_date};
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

const DEFAULT_PRODUCT_PACING_SECS: u64 = 5;
const NO_PRIOR_CONTINENT: &str = "None";
const UNKNOWN_CONTINENT: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOptions {
    /// Wait before each product image request (provider rate limits).
    pub product_pacing: Duration,
    pub prior_market_policy: PriorMarketPolicy,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            product_pacing: Duration::from_secs(DEFAULT_PRODUCT_PACING_SECS),
            prior_market_policy: PriorMarketPolicy::default(),
        }
    }
}

impl GenerationOptions {
    pub fn from_env() -> anyhow::Result<Self> {
        let product_pacing = std::env::var("PRODUCT_IMAGE_PACING_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_PRODUCT_PACING_SECS));

        Ok(Self {
            product_pacing,
            prior_market_policy: PriorMarketPolicy::from_env()?,
        })
    }
}

/// Anti-repetition hints passed to the text model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraints {
    pub last_continent: String,
    pub past_countries: BTreeSet<String>,
}

impl Constraints {
    pub fn unconstrained() -> Self {
        Self {
            last_continent: NO_PRIOR_CONTINENT.to_string(),
            past_countries: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationReport {
    pub target_date: NaiveDate,
    pub location: String,
    pub continent: String,
    pub country: String,
    pub hero_image: String,
}

pub fn hero_image_path(target_date: NaiveDate) -> String {
    format!("markets/{}/hero.jpg", date_key(target_date))
}

pub fn product_image_path(target_date: NaiveDate, index: usize) -> String {
    format!("markets/{}/prod_{index}.jpg", date_key(target_date))
}

pub struct MarketGenerator {
    text_model: Arc<dyn TextModel>,
    images: Arc<dyn ImageClient>,
    store: Arc<dyn MarketStore>,
    options: GenerationOptions,
}

impl MarketGenerator {
    pub fn new(
        text_model: Arc<dyn TextModel>,
        images: Arc<dyn ImageClient>,
        store: Arc<dyn MarketStore>,
        options: GenerationOptions,
    ) -> Self {
        Self {
            text_model,
            images,
            store,
            options,
        }
    }

    /// Wires the production stack: Gemini for text, Imagen published to
    /// Cloud Storage for images, all sharing one access-token cache.
    pub fn from_settings(settings: &Settings, store: Arc<dyn MarketStore>) -> anyhow::Result<Self> {
        let tokens = Arc::new(AccessTokenProvider::from_settings(settings)?);
        let text_model = GeminiClient::from_settings(settings, tokens.clone())?;
        let image_model = ImagenClient::from_settings(settings, tokens.clone())?;
        let objects = GcsObjectStore::from_settings(settings, tokens)?;
        let images = ImagePublisher::new(Arc::new(image_model), Arc::new(objects))
            .with_retry_policy(RetryPolicy::from_env());

        Ok(Self::new(
            Arc::new(text_model),
            Arc::new(images),
            store,
            GenerationOptions::from_env()?,
        ))
    }

    pub fn store(&self) -> &Arc<dyn MarketStore> {
        &self.store
    }

    /// Runs the pipeline for `target_date`, or for tomorrow when `None`.
    pub async fn run(&self, target_date: Option<NaiveDate>) -> anyhow::Result<GenerationReport> {
        self.run_at(target_date, Utc::now()).await
    }

    pub async fn run_at(
        &self,
        target_date: Option<NaiveDate>,
        now_utc: DateTime<Utc>,
    ) -> anyhow::Result<GenerationReport> {
        let target_date = match target_date {
            Some(date) => date,
            None => resolve_target_date(None, now_utc)?,
        };
        let span = tracing::info_span!(
            "market_generation",
            run_id = %uuid::Uuid::new_v4(),
            %target_date
        );
        self.run_for_date(target_date).instrument(span).await
    }

    /// Reads the previous continent and used countries. Never fails: a store
    /// error degrades to unconstrained generation.
    pub async fn gather_constraints(&self, target_date: NaiveDate) -> Constraints {
        let policy = self.options.prior_market_policy;
        let last_continent = match self.store.prior_market(policy, target_date).await {
            Ok(Some(record)) => {
                let continent = record.continent.english().trim();
                if continent.is_empty() {
                    UNKNOWN_CONTINENT.to_string()
                } else {
                    continent.to_string()
                }
            }
            Ok(None) => NO_PRIOR_CONTINENT.to_string(),
            Err(err) => {
                tracing::warn!(%policy, error = %err, "could not fetch last continent");
                NO_PRIOR_CONTINENT.to_string()
            }
        };

        let past_countries = match self.store.used_countries().await {
            Ok(countries) => countries,
            Err(err) => {
                tracing::warn!(error = %err, "could not fetch generated countries");
                BTreeSet::new()
            }
        };

        Constraints {
            last_continent,
            past_countries,
        }
    }

    async fn run_for_date(&self, target_date: NaiveDate) -> anyhow::Result<GenerationReport> {
        tracing::info!("starting daily market generation");

        let constraints = self.gather_constraints(target_date).await;
        tracing::info!(
            last_continent = %constraints.last_continent,
            past_countries = constraints.past_countries.len(),
            "constraints gathered"
        );

        let prompt = prompt::market_prompt(target_date, &constraints);
        let text = self
            .text_model
            .complete(&prompt)
            .await
            .context("text model request failed")?;
        let draft = json::parse_market(self.text_model.provider(), &text)?;

        tracing::info!(
            location = %draft.location.english(),
            continent = %draft.continent.english(),
            "market selected; starting image generation"
        );

        let record = self.illustrate(target_date, draft).await?;

        self.store
            .save_market(target_date, &record)
            .await
            .with_context(|| format!("failed to save market for {target_date}"))?;

        let country = record.country();
        self.store
            .mark_country_used(&country)
            .await
            .with_context(|| format!("failed to mark country {country:?} as used"))?;

        tracing::info!(
            %country,
            ingredients = record.ingredients.len(),
            "market saved"
        );

        Ok(GenerationReport {
            target_date,
            location: record.location.english().to_string(),
            continent: record.continent.english().to_string(),
            country,
            hero_image: record.hero_image,
        })
    }

    /// Produces every image for the draft, hero first. Any missing image
    /// aborts the run.
    async fn illustrate(
        &self,
        target_date: NaiveDate,
        draft: MarketDraft,
    ) -> anyhow::Result<MarketRecord> {
        let hero_job = ImageJob {
            prompt: draft.hero_image_description,
            dest_path: hero_image_path(target_date),
            with_secondary: true,
        };
        let hero_image = self
            .images
            .generate(&hero_job)
            .await
            .filter(|url| !url.is_empty())
            .with_context(|| format!("Hero image generation failed for {target_date}"))?;

        let mut ingredients = Vec::with_capacity(draft.products.len());
        for (index, product) in draft.products.into_iter().enumerate() {
            tokio::time::sleep(self.options.product_pacing).await;

            let job = ImageJob {
                prompt: product.image_description,
                dest_path: product_image_path(target_date, index),
                with_secondary: false,
            };
            let image_src = self
                .images
                .generate(&job)
                .await
                .filter(|url| !url.is_empty())
                .with_context(|| {
                    format!(
                        "Failed to generate image for product: {}",
                        product.title.english()
                    )
                })?;

            ingredients.push(ProductEntry {
                title: product.title,
                description: product.description,
                image_src,
            });
        }

        Ok(MarketRecord {
            location: draft.location,
            continent: draft.continent,
            hero_image,
            ingredients,
            fun_fact: draft.fun_fact,
        })
    }
}

use axum::{
    extract::{Path, Query, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use marketaday_core::domain::localized::Language;
use marketaday_core::generate::MarketGenerator;
use marketaday_core::storage::MarketStore;
use marketaday_core::time::target_date::parse_date_key;
use marketaday_core::trigger::{self, ManualOutcome, UNAUTHORIZED_MESSAGE};

#[derive(Clone)]
pub struct AppState {
    pub store: Option<Arc<dyn MarketStore>>,
    pub generator: Option<Arc<MarketGenerator>>,
    pub manual_key: Option<String>,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET]);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/generate", get(trigger_generation))
        .route("/markets/today", get(get_today_market))
        .route("/markets/:date", get(get_market_by_date))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn healthz() -> &'static str {
    "Service active."
}

#[derive(Debug, Default, Deserialize)]
pub struct GenerateParams {
    pub key: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TriggerResponse {
    fn failed(error: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: false,
            message: None,
            error: Some(error.into()),
        })
    }
}

pub async fn trigger_generation(
    State(state): State<AppState>,
    Query(params): Query<GenerateParams>,
) -> (StatusCode, Json<TriggerResponse>) {
    let Some(generator) = &state.generator else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            TriggerResponse::failed("generator is not configured"),
        );
    };

    let outcome = trigger::run_manual(
        generator,
        params.key.as_deref(),
        state.manual_key.as_deref(),
        params.date.as_deref(),
        Utc::now(),
    )
    .await;

    match outcome {
        ManualOutcome::Unauthorized => (
            StatusCode::FORBIDDEN,
            TriggerResponse::failed(UNAUTHORIZED_MESSAGE),
        ),
        ManualOutcome::Generated(report) => (
            StatusCode::OK,
            Json(TriggerResponse {
                success: true,
                message: Some(ManualOutcome::confirmation(&report)),
                error: None,
            }),
        ),
        ManualOutcome::Failed(err) => {
            sentry_anyhow::capture_anyhow(&err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                TriggerResponse::failed(format!("{err:#}")),
            )
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct MarketParams {
    pub lang: Option<String>,
}

pub async fn get_today_market(
    State(state): State<AppState>,
    Query(params): Query<MarketParams>,
) -> Result<Response, StatusCode> {
    market_response(&state, Utc::now().date_naive(), params.lang.as_deref()).await
}

pub async fn get_market_by_date(
    State(state): State<AppState>,
    Path(date): Path<String>,
    Query(params): Query<MarketParams>,
) -> Result<Response, StatusCode> {
    let date = parse_date_key(&date).map_err(|_| StatusCode::BAD_REQUEST)?;
    market_response(&state, date, params.lang.as_deref()).await
}

async fn market_response(
    state: &AppState,
    date: NaiveDate,
    lang: Option<&str>,
) -> Result<Response, StatusCode> {
    let Some(store) = &state.store else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let record = store
        .market_for_date(date)
        .await
        .map_err(|e| {
            sentry_anyhow::capture_anyhow(&e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    let response = match lang.map(str::trim).filter(|s| !s.is_empty()) {
        // Unknown codes are passed through; resolution falls back to English.
        Some(lang) => {
            let lang = Language::parse(lang).map(Language::code).unwrap_or(lang);
            Json(record.localize(date, lang)).into_response()
        }
        None => Json(record).into_response(),
    };
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use marketaday_core::domain::localized::LocalizedString;
    use marketaday_core::domain::market::{MarketRecord, ProductEntry};
    use marketaday_core::generate::GenerationOptions;
    use marketaday_core::imaging::{ImageClient, ImageJob};
    use marketaday_core::llm::{Provider, TextModel};
    use marketaday_core::storage::memory::MemoryMarketStore;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingText {
        calls: AtomicUsize,
        response: String,
    }

    #[async_trait::async_trait]
    impl TextModel for CountingText {
        fn provider(&self) -> Provider {
            Provider::VertexGemini
        }

        async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.response.clone())
        }
    }

    struct FakeImages;

    #[async_trait::async_trait]
    impl ImageClient for FakeImages {
        async fn generate(&self, job: &ImageJob) -> Option<String> {
            Some(format!("https://storage.test/{}", job.dest_path))
        }
    }

    fn market_json() -> String {
        let product = |name: &str| {
            json!({
                "title": {"en": name, "es": name},
                "imageDescription": format!("{name} close-up"),
                "description": {"en": "Local favourite", "es": "Favorito local"},
            })
        };
        json!({
            "location": {"en": "Oaxaca, Mexico", "es": "Oaxaca, México"},
            "continent": {"en": "North America", "es": "Norteamérica"},
            "heroImageDescription": "Mercado Benito Juárez at dawn",
            "products": [product("Mole"), product("Chapulines"), product("Quesillo")],
            "funFact": {"en": "Oaxaca has seven moles.", "es": "Oaxaca tiene siete moles."},
        })
        .to_string()
    }

    fn state_with(store: Arc<MemoryMarketStore>, text: Arc<CountingText>) -> AppState {
        let generator = MarketGenerator::new(
            text,
            Arc::new(FakeImages),
            store.clone(),
            GenerationOptions {
                product_pacing: std::time::Duration::ZERO,
                ..GenerationOptions::default()
            },
        );
        AppState {
            store: Some(store),
            generator: Some(Arc::new(generator)),
            manual_key: Some("s3cret".to_string()),
        }
    }

    fn counting_text() -> Arc<CountingText> {
        Arc::new(CountingText {
            calls: AtomicUsize::new(0),
            response: market_json(),
        })
    }

    fn stored_record() -> MarketRecord {
        MarketRecord {
            location: LocalizedString::bilingual("Hanoi, Vietnam", "Hanói, Vietnam"),
            continent: LocalizedString::bilingual("Asia", "Asia"),
            hero_image: "https://storage.test/hero.jpg".into(),
            ingredients: vec![ProductEntry {
                title: LocalizedString::bilingual("Star fruit", "Carambola"),
                description: LocalizedString::from("legacy text"),
                image_src: "https://storage.test/prod_0.jpg".into(),
            }],
            fun_fact: LocalizedString::bilingual("Fact", "Dato"),
        }
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn healthz_reports_active() {
        assert_eq!(healthz().await, "Service active.");
    }

    #[tokio::test]
    async fn wrong_key_is_forbidden_without_generation() {
        let store = Arc::new(MemoryMarketStore::new());
        let text = counting_text();
        let state = state_with(store.clone(), text.clone());

        let (status, Json(body)) = trigger_generation(
            State(state),
            Query(GenerateParams {
                key: Some("nope".into()),
                date: None,
            }),
        )
        .await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(!body.success);
        assert_eq!(body.error.as_deref(), Some("Unauthorized: Invalid key"));
        assert_eq!(text.calls.load(Ordering::SeqCst), 0);
        assert!(store.markets().await.is_empty());
    }

    #[tokio::test]
    async fn valid_key_generates_requested_date() {
        let store = Arc::new(MemoryMarketStore::new());
        let state = state_with(store.clone(), counting_text());

        let (status, Json(body)) = trigger_generation(
            State(state),
            Query(GenerateParams {
                key: Some(" s3cret ".into()),
                date: Some("2025-03-04".into()),
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.success);
        assert_eq!(
            body.message.as_deref(),
            Some("Generated market for 2025-03-04: Oaxaca, Mexico")
        );
        let date = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();
        assert!(store.markets().await.contains_key(&date));
        assert!(store.country_markers().await.contains_key("Mexico"));
    }

    #[tokio::test]
    async fn bad_date_is_a_server_error() {
        let state = state_with(Arc::new(MemoryMarketStore::new()), counting_text());

        let (status, Json(body)) = trigger_generation(
            State(state),
            Query(GenerateParams {
                key: Some("s3cret".into()),
                date: Some("tomorrow".into()),
            }),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.error.unwrap().contains("tomorrow"));
    }

    #[tokio::test]
    async fn trigger_without_generator_is_unavailable() {
        let state = AppState {
            store: None,
            generator: None,
            manual_key: Some("s3cret".into()),
        };
        let (status, _) = trigger_generation(State(state), Query(GenerateParams::default())).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn market_by_date_localizes_when_lang_given() {
        let store = Arc::new(MemoryMarketStore::new());
        let date = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();
        store.save_market(date, &stored_record()).await.unwrap();
        let state = state_with(store, counting_text());

        let response = get_market_by_date(
            State(state),
            Path("2025-03-04".into()),
            Query(MarketParams {
                lang: Some("es-MX".into()),
            }),
        )
        .await
        .unwrap();
        let body = body_json(response).await;

        assert_eq!(body["lang"], "es");
        assert_eq!(body["location"], "Hanói, Vietnam");
        assert_eq!(body["ingredients"][0]["title"], "Carambola");
        assert_eq!(body["ingredients"][0]["description"], "legacy text");
    }

    #[tokio::test]
    async fn market_by_date_returns_raw_record_without_lang() {
        let store = Arc::new(MemoryMarketStore::new());
        let date = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();
        store.save_market(date, &stored_record()).await.unwrap();
        let state = state_with(store, counting_text());

        let response = get_market_by_date(
            State(state),
            Path("2025-03-04".into()),
            Query(MarketParams::default()),
        )
        .await
        .unwrap();
        let body = body_json(response).await;

        assert_eq!(body["location"]["es"], "Hanói, Vietnam");
        assert_eq!(body["heroImage"], "https://storage.test/hero.jpg");
    }

    #[tokio::test]
    async fn market_lookup_errors() {
        let state = state_with(Arc::new(MemoryMarketStore::new()), counting_text());

        let missing = get_market_by_date(
            State(state.clone()),
            Path("2025-03-04".into()),
            Query(MarketParams::default()),
        )
        .await;
        assert_eq!(missing.err(), Some(StatusCode::NOT_FOUND));

        let bad_date = get_market_by_date(
            State(state),
            Path("03-04-2025".into()),
            Query(MarketParams::default()),
        )
        .await;
        assert_eq!(bad_date.err(), Some(StatusCode::BAD_REQUEST));

        let degraded = AppState {
            store: None,
            generator: None,
            manual_key: None,
        };
        let today = get_today_market(State(degraded), Query(MarketParams::default())).await;
        assert_eq!(today.err(), Some(StatusCode::SERVICE_UNAVAILABLE));
    }
}

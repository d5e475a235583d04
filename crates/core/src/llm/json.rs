use crate::domain::contract::{LlmMarket, MarketDraft};
use crate::llm::error::LlmDiagnosticsError;
use crate::llm::Provider;

pub fn extract_json(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if let Some(after_fence) = trimmed.strip_prefix("```") {
        // Remove Markdown fences (```json ... ``` or ``` ... ```). Content may
        // start on the fence line itself.
        let mut inner = after_fence;
        if inner.get(..4).is_some_and(|tag| tag.eq_ignore_ascii_case("json")) {
            inner = &inner[4..];
        }
        if let Some(end) = inner.rfind("```") {
            inner = &inner[..end];
        }
        return Some(inner.trim().to_string());
    }

    // Best-effort extraction: first '{' to last '}'.
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(trimmed[start..=end].trim().to_string())
}

/// Parses raw model output into a validated draft.
pub fn parse_market(provider: Provider, text: &str) -> anyhow::Result<MarketDraft> {
    let json_str = extract_json(text).unwrap_or_else(|| text.trim().to_string());

    let parsed = serde_json::from_str::<LlmMarket>(&json_str).map_err(|err| LlmDiagnosticsError {
        provider,
        stage: "parse",
        detail: format!("output is not valid JSON for market schema: {err}"),
        raw_output: Some(text.to_string()),
        raw_response_json: None,
    })?;

    parsed.validate_and_into_draft().map_err(|err| {
        anyhow::Error::new(LlmDiagnosticsError {
            provider,
            stage: "validate",
            detail: format!("{err:#}"),
            raw_output: Some(text.to_string()),
            raw_response_json: serde_json::from_str(&json_str).ok(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_market_json() -> String {
        let products: Vec<_> = (0..3)
            .map(|i| {
                json!({
                    "title": {"en": format!("Item {i}"), "es": format!("Artículo {i}")},
                    "imageDescription": format!("Macro photo of item {i}, soft bokeh"),
                    "description": {"en": "Local staple", "es": "Básico local"},
                })
            })
            .collect();

        json!({
            "location": {"en": "Marrakech, Morocco", "es": "Marrakech, Marruecos"},
            "continent": {"en": "Africa", "es": "África"},
            "heroImageDescription": "Wide shot of Jemaa el-Fnaa souk at dusk",
            "products": products,
            "funFact": {"en": "Fact", "es": "Dato"},
        })
        .to_string()
    }

    #[test]
    fn extract_json_handles_fenced_blocks() {
        let body = "{\"a\":1}";
        let fenced = format!("```json\n{body}\n```\n");
        assert_eq!(extract_json(&fenced), Some(body.to_string()));
    }

    #[test]
    fn extract_json_handles_single_line_fence() {
        assert_eq!(
            extract_json("```json{\"a\":1}```"),
            Some("{\"a\":1}".to_string())
        );
    }

    #[test]
    fn extract_json_keeps_content_on_fence_line() {
        let out = extract_json("```json {\"a\": 1,\n\"b\": 2}\n```").unwrap();
        assert_eq!(out, "{\"a\": 1,\n\"b\": 2}");
        assert!(serde_json::from_str::<serde_json::Value>(&out).is_ok());

        let bare = extract_json("```\n{\"a\": 1}\n```").unwrap();
        assert_eq!(bare, "{\"a\": 1}");
    }

    #[test]
    fn extract_json_falls_back_to_braces() {
        let s = "prefix {\"a\":1} suffix";
        assert_eq!(extract_json(s), Some("{\"a\":1}".to_string()));
    }

    #[test]
    fn parse_market_accepts_fenced_valid_json() {
        let text = format!("```json\n{}\n```", valid_market_json());
        let draft = parse_market(Provider::VertexGemini, &text).unwrap();
        assert_eq!(draft.location.english(), "Marrakech, Morocco");
        assert_eq!(draft.products.len(), 3);
    }

    #[test]
    fn parse_market_rejects_non_json() {
        let err = parse_market(Provider::VertexGemini, "Sorry, I cannot help with that.")
            .unwrap_err();
        let diag = err.downcast_ref::<LlmDiagnosticsError>().unwrap();
        assert_eq!(diag.stage, "parse");
    }

    #[test]
    fn parse_market_reports_schema_violations() {
        let mut v: serde_json::Value = serde_json::from_str(&valid_market_json()).unwrap();
        v["products"].as_array_mut().unwrap().pop();
        let err = parse_market(Provider::VertexGemini, &v.to_string()).unwrap_err();
        let diag = err.downcast_ref::<LlmDiagnosticsError>().unwrap();
        assert_eq!(diag.stage, "validate");
        assert!(diag.raw_response_json.is_some());
    }
}

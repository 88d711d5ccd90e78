//! Image and structured data extractors

use crate::extract::pipeline::{ExtractError, Extractor, Page};
use crate::extract::value::DataValue;
use scraper::Selector;

/// Content images, excluding data URIs and explicit 1×1 tracking pixels
pub struct ImageCount;

fn dimension(value: Option<&str>) -> Option<u32> {
    value?.trim().trim_end_matches("px").trim().parse().ok()
}

impl Extractor for ImageCount {
    fn name(&self) -> &str {
        "image_count"
    }

    fn extract(&self, page: &Page<'_>) -> Result<Option<DataValue>, ExtractError> {
        let selector = Selector::parse("img")
            .map_err(|e| ExtractError::Failed(format!("image selector: {:?}", e)))?;

        let count = page
            .document
            .select(&selector)
            .filter(|img| {
                let element = img.value();
                let src = element.attr("src").map(str::trim).unwrap_or_default();
                if src.is_empty() || src.to_ascii_lowercase().starts_with("data:") {
                    return false;
                }
                let pixel = dimension(element.attr("width")) == Some(1)
                    && dimension(element.attr("height")) == Some(1);
                !pixel
            })
            .count();

        Ok(Some(DataValue::Count(count as u64)))
    }
}

/// Parsed JSON-LD blocks; malformed blocks are skipped
pub struct StructuredData;

impl Extractor for StructuredData {
    fn name(&self) -> &str {
        "structured_data"
    }

    fn extract(&self, page: &Page<'_>) -> Result<Option<DataValue>, ExtractError> {
        let selector = Selector::parse(r#"script[type="application/ld+json"]"#)
            .map_err(|e| ExtractError::Failed(format!("json-ld selector: {:?}", e)))?;

        let blocks: Vec<serde_json::Value> = page
            .document
            .select(&selector)
            .filter_map(|script| {
                let body = script.text().collect::<String>();
                let body = body.trim();
                if body.is_empty() {
                    return None;
                }
                match serde_json::from_str(body) {
                    Ok(value) => Some(value),
                    Err(e) => {
                        tracing::debug!("Skipping malformed JSON-LD on {}: {}", page.url, e);
                        None
                    }
                }
            })
            .collect();

        Ok((!blocks.is_empty()).then_some(DataValue::Json(blocks)))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::run;
    use super::*;

    const URL: &str = "https://example.com/";

    #[test]
    fn test_image_count() {
        let html = r#"<body>
            <img src="/hero.jpg">
            <img src="https://cdn.example.com/a.png" width="640" height="480">
            <img src="">
            <img>
            <img src="data:image/gif;base64,R0lGOD">
            <img src="/pixel.gif" width="1" height="1">
            <img src="/thin.gif" width="1px" height="40">
        </body>"#;
        assert_eq!(run(&ImageCount, html, URL), Some(DataValue::Count(3)));
        assert_eq!(run(&ImageCount, "", URL), Some(DataValue::Count(0)));
    }

    #[test]
    fn test_structured_data_skips_malformed_blocks() {
        let html = r#"<head>
            <script type="application/ld+json">{"@type": "Organization", "name": "Acme"}</script>
            <script type="application/ld+json">{ not json </script>
            <script type="application/ld+json">[{"@type": "BreadcrumbList"}]</script>
        </head>"#;

        let Some(DataValue::Json(blocks)) = run(&StructuredData, html, URL) else {
            panic!("expected JSON-LD blocks");
        };
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0]["name"], "Acme");
        assert!(blocks[1].is_array());
    }

    #[test]
    fn test_no_structured_data() {
        assert!(run(&StructuredData, "<head></head>", URL).is_none());
    }
}

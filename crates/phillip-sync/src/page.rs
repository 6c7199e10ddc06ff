//! Extraction of the JSON osu-web embeds in its pages.

use scraper::{Html, Selector};

use crate::SyncError;

/// Contents of `<script id="{tag}">` in `html`.
pub fn embedded_json(html: &str, tag: &str) -> Result<String, SyncError> {
    let selector = Selector::parse(&format!("script#{tag}"))
        .map_err(|e| SyncError::Malformed(format!("selector for {tag}: {e:?}")))?;
    let document = Html::parse_document(html);
    let script = document
        .select(&selector)
        .next()
        .ok_or_else(|| SyncError::MissingJsonTag(tag.to_string()))?;
    Ok(script.text().collect::<String>().trim().to_string())
}

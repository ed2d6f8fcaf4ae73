use std::path::Path;

use serde::Deserialize;

use super::json_file::read_document;

pub const DEFAULT_SEARCH_TERMS: [&str; 21] = [
    "prototype",
    "test",
    "early access",
    "limited",
    "pre-release",
    "sandbox",
    "starter",
    "minimal",
    "concept",
    "unreleased",
    "beta",
    "alpha",
    "lite",
    "demo",
    "trial",
    "preview",
    "experimental",
    "indie",
    "free",
    "vpn",
    "random",
];

#[derive(Debug, Default, Deserialize)]
struct AppNamesDocument {
    #[serde(default)]
    app_names: Vec<String>,
}

pub async fn load_search_terms(path: &Path) -> Vec<String> {
    let terms: Vec<String> = read_document::<AppNamesDocument>(path)
        .await
        .unwrap_or_default()
        .app_names
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    match terms.is_empty() {
        true => {
            log::warn!("No app names found in {}, using default search terms", path.display());
            DEFAULT_SEARCH_TERMS.iter().map(|t| t.to_string()).collect()
        }
        false => {
            log::info!("Loaded {} search terms from {}", terms.len(), path.display());
            terms
        }
    }
}

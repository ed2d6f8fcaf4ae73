use std::time::Duration;
#[cfg(test)]
use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::domain::app::{AppDetail, AppSummary, Locale};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("catalog has no listing {0}")]
    NotFound(String),
}

#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn search(
        &self,
        term: &str,
        locale: &Locale,
        limit: usize,
    ) -> Result<Vec<AppSummary>, CatalogError>;

    async fn detail(&self, app_id: &str, locale: &Locale) -> Result<AppDetail, CatalogError>;
}

pub struct CatalogClient {
    client: Client,
    base_url: String,
}

#[derive(Serialize)]
struct SearchQuery<'a> {
    term: &'a str,
    lang: &'a str,
    country: &'a str,
    num: usize,
}

#[derive(Serialize)]
struct LocaleQuery<'a> {
    lang: &'a str,
    country: &'a str,
}

impl CatalogClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CatalogError> {
        let client = reqwest::Client::builder()
            .user_agent(fake_user_agent::get_rua())
            .read_timeout(timeout)
            .build()?;

        Ok(CatalogClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl CatalogSource for CatalogClient {
    async fn search(
        &self,
        term: &str,
        locale: &Locale,
        limit: usize,
    ) -> Result<Vec<AppSummary>, CatalogError> {
        let apps = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&SearchQuery {
                term,
                lang: &locale.lang,
                country: &locale.country,
                num: limit,
            })
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<AppSummary>>()
            .await?;

        Ok(apps)
    }

    async fn detail(&self, app_id: &str, locale: &Locale) -> Result<AppDetail, CatalogError> {
        let res = self
            .client
            .get(format!("{}/apps/{}", self.base_url, app_id))
            .query(&LocaleQuery {
                lang: &locale.lang,
                country: &locale.country,
            })
            .send()
            .await?;

        if res.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(CatalogError::NotFound(app_id.to_string()));
        }

        Ok(res.error_for_status()?.json::<AppDetail>().await?)
    }
}

#[cfg(test)]
#[derive(Default)]
pub struct ScriptedCatalog {
    results: HashMap<String, Vec<String>>,
    details: HashMap<String, AppDetail>,
    search_calls: Mutex<usize>,
}

#[cfg(test)]
impl ScriptedCatalog {
    pub fn with_search(mut self, term: &str, app_ids: &[&str]) -> Self {
        self.results.insert(
            term.to_string(),
            app_ids.iter().map(|id| id.to_string()).collect(),
        );
        self
    }

    pub fn with_detail(mut self, app_id: &str, detail: AppDetail) -> Self {
        self.details.insert(app_id.to_string(), detail);
        self
    }

    pub fn search_calls(&self) -> usize {
        *self.search_calls.lock().unwrap()
    }
}

#[cfg(test)]
#[async_trait]
impl CatalogSource for ScriptedCatalog {
    async fn search(
        &self,
        term: &str,
        _locale: &Locale,
        limit: usize,
    ) -> Result<Vec<AppSummary>, CatalogError> {
        *self.search_calls.lock().unwrap() += 1;

        self.results
            .get(term)
            .map(|ids| {
                ids.iter()
                    .take(limit)
                    .map(|id| AppSummary {
                        app_id: Some(id.clone()),
                    })
                    .collect()
            })
            .ok_or_else(|| CatalogError::NotFound(term.to_string()))
    }

    async fn detail(&self, app_id: &str, _locale: &Locale) -> Result<AppDetail, CatalogError> {
        self.details
            .get(app_id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(app_id.to_string()))
    }
}

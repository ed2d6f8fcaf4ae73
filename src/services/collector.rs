use std::collections::HashSet;

use serde::Serialize;

use crate::{
    configuration::CollectionSettings,
    dal::{identity_db::IdentityRepository, StoreError},
    domain::{
        app::{assess, Locale},
        identity::{add_identity, normalize, Identity},
    },
};

use super::{CancelFlag, CatalogSource, Clock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CollectionOutcome {
    Completed,
    Cancelled,
    PassLimit,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionReport {
    #[serde(rename = "collected_emails")]
    pub collected: Vec<String>,
    pub total_collected: usize,
    pub outcome: CollectionOutcome,
}

enum PassEnd {
    Exhausted,
    TargetReached,
    Cancelled,
}

pub struct Collector<'a, S, R, C>
where
    S: CatalogSource,
    R: IdentityRepository,
    C: Clock,
{
    pub catalog: &'a S,
    pub store: &'a R,
    pub clock: &'a C,
    pub cancel: &'a CancelFlag,
    pub settings: &'a CollectionSettings,
    pub search_terms: &'a [String],
}

struct RunState {
    entries: Vec<Identity>,
    known: HashSet<String>,
    collected: Vec<String>,
}

impl<'a, S, R, C> Collector<'a, S, R, C>
where
    S: CatalogSource,
    R: IdentityRepository,
    C: Clock,
{
    pub async fn run(&self, entries: Vec<Identity>) -> Result<CollectionReport, StoreError> {
        log::info!("Starting email collection, target {}", self.settings.target_count);

        let mut state = RunState {
            known: entries.iter().map(|entry| entry.key()).collect(),
            entries,
            collected: vec![],
        };

        let mut passes = 0;
        let outcome = loop {
            if state.collected.len() >= self.settings.target_count {
                break CollectionOutcome::Completed;
            }

            match self.pass(&mut state).await? {
                PassEnd::TargetReached => break CollectionOutcome::Completed,
                PassEnd::Cancelled => break CollectionOutcome::Cancelled,
                PassEnd::Exhausted => {}
            }

            passes += 1;
            if self.settings.max_passes.is_some_and(|max| passes >= max) {
                log::warn!("Stopping after {} passes without reaching the target", passes);
                break CollectionOutcome::PassLimit;
            }
            if self.cancel.is_cancelled() {
                break CollectionOutcome::Cancelled;
            }

            log::info!(
                "Not enough emails found this cycle ({}/{}), retrying after a short break",
                state.collected.len(),
                self.settings.target_count
            );
            self.clock.sleep(self.settings.backoff()).await;
        };

        log::info!("Collected {} new emails", state.collected.len());

        Ok(CollectionReport {
            total_collected: state.collected.len(),
            collected: state.collected,
            outcome,
        })
    }

    async fn pass(&self, state: &mut RunState) -> Result<PassEnd, StoreError> {
        let locale = Locale {
            lang: self.settings.lang.clone(),
            country: self.settings.country.clone(),
        };

        for term in self.search_terms {
            if self.cancel.is_cancelled() {
                return Ok(PassEnd::Cancelled);
            }

            log::info!("Searching for apps with term '{}'", term);
            let apps = match self
                .catalog
                .search(term, &locale, self.settings.results_per_query)
                .await
            {
                Ok(apps) => apps,
                Err(e) => {
                    log::error!("Search error for term '{}': {:?}", term, e);
                    continue;
                }
            };

            for app_id in apps.into_iter().filter_map(|app| app.app_id) {
                if self.cancel.is_cancelled() {
                    return Ok(PassEnd::Cancelled);
                }

                let detail = match self.catalog.detail(&app_id, &locale).await {
                    Ok(detail) => detail,
                    Err(e) => {
                        log::error!("Error fetching details for app {}: {:?}", app_id, e);
                        continue;
                    }
                };

                let email = match assess(&detail, self.settings.install_threshold) {
                    Ok(email) => email,
                    Err(rejection) => {
                        log::debug!("Skipped app {}: {:?}", app_id, rejection);
                        continue;
                    }
                };

                if !state.known.insert(normalize(&email)) {
                    log::debug!("Duplicate email skipped: {}", email);
                    continue;
                }

                add_identity(&mut state.entries, &email, self.clock.now());
                self.store.persist(&state.entries).await?;
                log::info!("Collected: {} (app {})", email, app_id);
                state.collected.push(email);

                if state.collected.len() >= self.settings.target_count {
                    return Ok(PassEnd::TargetReached);
                }
            }
        }

        Ok(PassEnd::Exhausted)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::{CollectionOutcome, Collector};
    use crate::{
        configuration::CollectionSettings,
        dal::identity_db::MemoryIdentityStore,
        domain::{app::AppDetail, identity::Identity},
        services::{CancelFlag, ManualClock, ScriptedCatalog},
    };

    fn settings(target_count: usize, max_passes: Option<u32>) -> CollectionSettings {
        CollectionSettings {
            target_count,
            install_threshold: 1_000_000,
            retention_days: 30,
            results_per_query: 100,
            lang: "en".to_string(),
            country: "us".to_string(),
            backoff_secs: 5,
            max_passes,
        }
    }

    fn detail(installs: Option<serde_json::Value>, email: Option<&str>) -> AppDetail {
        AppDetail {
            real_installs: installs,
            developer_email: email.map(|e| e.to_string()),
        }
    }

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap())
    }

    #[tokio::test]
    async fn accepts_only_listings_under_threshold() {
        let catalog = ScriptedCatalog::default()
            .with_search("torch", &["small", "huge", "unknown"])
            .with_detail("small", detail(Some(json!(500000)), Some("small@dev.io")))
            .with_detail("huge", detail(Some(json!(1000001)), Some("huge@dev.io")))
            .with_detail("unknown", detail(None, Some("unknown@dev.io")));
        let store = MemoryIdentityStore::default();
        let clock = clock();
        let cancel = CancelFlag::new();
        let settings = settings(5, Some(1));
        let terms = vec!["torch".to_string()];

        let report = Collector {
            catalog: &catalog,
            store: &store,
            clock: &clock,
            cancel: &cancel,
            settings: &settings,
            search_terms: &terms,
        }
        .run(vec![])
        .await
        .unwrap();

        assert_eq!(report.collected, vec!["small@dev.io"]);
        assert_eq!(report.outcome, CollectionOutcome::PassLimit);
        assert_eq!(store.latest().len(), 1);
    }

    #[tokio::test]
    async fn skips_known_and_repeated_contacts() {
        let catalog = ScriptedCatalog::default()
            .with_search("notes", &["a", "b", "c", "d"])
            .with_detail("a", detail(Some(json!(10)), Some("Known@Dev.io")))
            .with_detail("b", detail(Some(json!(10)), Some("fresh@dev.io")))
            .with_detail("c", detail(Some(json!(10)), Some("FRESH@dev.io")))
            .with_detail("d", detail(Some(json!(10)), None));
        let store = MemoryIdentityStore::default();
        let clock = clock();
        let cancel = CancelFlag::new();
        let settings = settings(10, Some(1));
        let terms = vec!["notes".to_string()];
        let existing = vec![Identity::new("known@dev.io", clock_start())];

        let report = Collector {
            catalog: &catalog,
            store: &store,
            clock: &clock,
            cancel: &cancel,
            settings: &settings,
            search_terms: &terms,
        }
        .run(existing)
        .await
        .unwrap();

        assert_eq!(report.collected, vec!["fresh@dev.io"]);
        let persisted: Vec<String> = store.latest().into_iter().map(|e| e.email).collect();
        assert_eq!(persisted, vec!["known@dev.io", "fresh@dev.io"]);
    }

    #[tokio::test]
    async fn persists_after_every_accepted_identity() {
        let catalog = ScriptedCatalog::default()
            .with_search("vpn", &["a", "b", "c"])
            .with_detail("a", detail(Some(json!(1)), Some("a@dev.io")))
            .with_detail("b", detail(Some(json!(2)), Some("b@dev.io")))
            .with_detail("c", detail(Some(json!(3)), Some("c@dev.io")));
        let store = MemoryIdentityStore::default();
        let clock = clock();
        let cancel = CancelFlag::new();
        let settings = settings(2, None);
        let terms = vec!["vpn".to_string()];

        let report = Collector {
            catalog: &catalog,
            store: &store,
            clock: &clock,
            cancel: &cancel,
            settings: &settings,
            search_terms: &terms,
        }
        .run(vec![])
        .await
        .unwrap();

        assert_eq!(report.outcome, CollectionOutcome::Completed);
        assert_eq!(report.total_collected, 2);
        let sizes: Vec<usize> = store.snapshots().iter().map(|s| s.len()).collect();
        assert_eq!(sizes, vec![1, 2]);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn failed_lookups_are_skipped_and_backoff_repeats_passes() {
        // "broken" has no scripted search result and "ghost" no detail: both fail
        let catalog = ScriptedCatalog::default()
            .with_search("ok", &["ghost", "one"])
            .with_detail("one", detail(Some(json!(5)), Some("one@dev.io")));
        let store = MemoryIdentityStore::default();
        let clock = clock();
        let cancel = CancelFlag::new();
        let settings = settings(3, Some(4));
        let terms = vec!["broken".to_string(), "ok".to_string()];

        let report = Collector {
            catalog: &catalog,
            store: &store,
            clock: &clock,
            cancel: &cancel,
            settings: &settings,
            search_terms: &terms,
        }
        .run(vec![])
        .await
        .unwrap();

        assert_eq!(report.collected, vec!["one@dev.io"]);
        assert_eq!(report.outcome, CollectionOutcome::PassLimit);
        assert_eq!(catalog.search_calls(), 8);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(5); 3]);
    }

    #[tokio::test]
    async fn cancellation_stops_an_unproductive_loop() {
        let catalog = ScriptedCatalog::default();
        let store = MemoryIdentityStore::default();
        let clock = clock();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let settings = settings(3, None);
        let terms = vec!["nothing".to_string()];

        let report = Collector {
            catalog: &catalog,
            store: &store,
            clock: &clock,
            cancel: &cancel,
            settings: &settings,
            search_terms: &terms,
        }
        .run(vec![])
        .await
        .unwrap();

        assert_eq!(report.outcome, CollectionOutcome::Cancelled);
        assert_eq!(catalog.search_calls(), 0);
    }

    #[test]
    fn report_serializes_to_summary_shape() {
        let report = super::CollectionReport {
            collected: vec!["a@dev.io".to_string()],
            total_collected: 1,
            outcome: CollectionOutcome::Completed,
        };

        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(value["collected_emails"], json!(["a@dev.io"]));
        assert_eq!(value["total_collected"], json!(1));
    }

    fn clock_start() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
    }
}

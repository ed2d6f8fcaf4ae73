use std::{path::Path, time::Duration};

use anyhow::Context;

use crate::{
    configuration::Settings,
    dal::{
        account_db::JsonAccountStore,
        identity_db::{IdentityRepository, JsonIdentityStore},
        search_term_db::load_search_terms,
        sent_db::{JsonSentStore, SentLedger},
    },
    domain::identity::evict_expired,
    services::{
        build_queue, AccountPool, CancelFlag, CatalogClient, Clock, CollectionReport, Collector,
        DispatchOutcome, DispatchReport, Dispatcher, MailServerTransport, SystemClock,
    },
};

pub async fn run_collection(settings: &Settings, cancel: &CancelFlag) -> anyhow::Result<CollectionReport> {
    let clock = SystemClock;
    let store = JsonIdentityStore::new(&settings.storage.identities_path);

    let entries = evict_expired(
        store.load().await,
        clock.now(),
        settings.collection.retention_days,
    );
    store
        .persist(&entries)
        .await
        .context("Failed to save identities after cleanup")?;

    let search_terms = load_search_terms(&settings.storage.search_terms_path).await;
    let catalog = CatalogClient::new(
        &settings.catalog.base_url,
        Duration::from_secs(settings.catalog.timeout_secs),
    )
    .context("Failed to build catalog client")?;

    let report = Collector {
        catalog: &catalog,
        store: &store,
        clock: &clock,
        cancel,
        settings: &settings.collection,
        search_terms: &search_terms,
    }
    .run(entries)
    .await
    .context("Failed to save collected identity")?;

    Ok(report)
}

pub async fn run_dispatch(
    settings: &Settings,
    identity_path: &Path,
    cancel: &CancelFlag,
) -> anyhow::Result<DispatchReport> {
    let identities = JsonIdentityStore::new(identity_path).load().await;
    let mut ledger = SentLedger::load(JsonSentStore::new(&settings.storage.sent_path)).await;

    let queue = build_queue(&identities, &ledger);
    if queue.is_empty() {
        log::info!("No new emails to send from {}", identity_path.display());
        return Ok(DispatchReport {
            sent: 0,
            failed: 0,
            skipped: 0,
            probes: 0,
            remaining: 0,
            outcome: DispatchOutcome::Completed,
        });
    }

    let mut pool = AccountPool::load(
        JsonAccountStore::new(&settings.storage.accounts_path),
        settings.dispatch.default_quota,
    )
    .await;
    let transport =
        MailServerTransport::new(&settings.mail_server).context("Failed to build mail transport")?;

    let report = Dispatcher {
        pool: &mut pool,
        ledger: &mut ledger,
        transport: &transport,
        clock: &SystemClock,
        cancel,
        settings: &settings.dispatch,
    }
    .run(&queue)
    .await
    .context("Failed to save sent ledger, stopping to avoid duplicate sends")?;

    Ok(report)
}

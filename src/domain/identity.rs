use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub email: String,
    pub timestamp: DateTime<Utc>,
}

impl Identity {
    pub fn new(email: &str, timestamp: DateTime<Utc>) -> Self {
        Identity {
            email: email.trim().to_string(),
            timestamp,
        }
    }

    pub fn key(&self) -> String {
        normalize(&self.email)
    }
}

pub fn normalize(handle: &str) -> String {
    handle.trim().to_lowercase()
}

pub fn evict_expired(entries: Vec<Identity>, now: DateTime<Utc>, retention_days: i64) -> Vec<Identity> {
    let cutoff = now - Duration::days(retention_days);

    let before = entries.len();
    let retained: Vec<Identity> = entries
        .into_iter()
        .filter(|entry| entry.timestamp >= cutoff)
        .collect();

    log::info!(
        "Retained {} of {} identities after evicting entries older than {} days",
        retained.len(),
        before,
        retention_days
    );

    retained
}

pub fn contains_identity(entries: &[Identity], handle: &str) -> bool {
    let key = normalize(handle);
    entries.iter().any(|entry| entry.key() == key)
}

pub fn add_identity(entries: &mut Vec<Identity>, handle: &str, now: DateTime<Utc>) -> bool {
    if handle.trim().is_empty() || contains_identity(entries, handle) {
        return false;
    }

    entries.push(Identity::new(handle, now));
    true
}

use std::{path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;

pub const DEFAULT_CONFIGURATION_FILE: &str = "configuration.yaml";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub storage: StorageSettings,
    pub collection: CollectionSettings,
    pub dispatch: DispatchSettings,
    pub catalog: CatalogSettings,
    pub mail_server: MailServerSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    pub identities_path: PathBuf,
    pub sent_path: PathBuf,
    pub accounts_path: PathBuf,
    pub search_terms_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectionSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub target_count: usize,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub install_threshold: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub retention_days: i64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub results_per_query: usize,
    pub lang: String,
    pub country: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub backoff_secs: u64,
    #[serde(default)]
    pub max_passes: Option<u32>,
}

impl CollectionSettings {
    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub default_quota: u32,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub probe_interval: u32,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub probe_settle_secs: u64,
    pub unwanted_folder: String,
    pub pacing: PacingSettings,
    pub subject: String,
    pub body: String,
}

impl DispatchSettings {
    pub fn probe_settle(&self) -> Duration {
        Duration::from_secs(self.probe_settle_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PacingSettings {
    pub enabled: bool,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub min_secs: f64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_secs: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogSettings {
    pub base_url: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailServerSettings {
    pub smtp_host: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub smtp_port: u16,
    pub smtp_tls: bool,
    pub imap_host: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub imap_port: u16,
    pub imap_tls: bool,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub timeout_secs: u64,
}

impl MailServerSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

pub fn get_configuration(path: &str) -> Result<Settings, config::ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::new(path, config::FileFormat::Yaml))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::get_configuration;

    #[test]
    fn configuration_file_is_parsed() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        write!(
            file,
            r#"
storage:
  identities_path: "FEWDF.json"
  sent_path: "sent.json"
  accounts_path: "credentials.json"
  search_terms_path: "app_names.json"
collection:
  target_count: 900
  install_threshold: "1000000"
  retention_days: 30
  results_per_query: 100
  lang: "en"
  country: "us"
  backoff_secs: 5
dispatch:
  default_quota: 450
  probe_interval: 20
  probe_settle_secs: 10
  unwanted_folder: "[Gmail]/Spam"
  pacing:
    enabled: true
    min_secs: 1
    max_secs: 3
  subject: "Hello"
  body: "Body"
catalog:
  base_url: "http://localhost:3000"
  timeout_secs: 30
mail_server:
  smtp_host: "smtp.gmail.com"
  smtp_port: 465
  smtp_tls: true
  imap_host: "imap.gmail.com"
  imap_port: "993"
  imap_tls: true
  timeout_secs: 30
"#
        )
        .unwrap();

        let settings = get_configuration(file.path().to_str().unwrap()).unwrap();

        assert_eq!(settings.collection.install_threshold, 1_000_000);
        assert_eq!(settings.collection.max_passes, None);
        assert_eq!(settings.dispatch.probe_interval, 20);
        assert_eq!(settings.dispatch.pacing.max_secs, 3.0);
        assert_eq!(settings.mail_server.imap_port, 993);
        assert!(settings.mail_server.smtp_tls);
        assert_eq!(settings.mail_server.timeout(), std::time::Duration::from_secs(30));
    }
}

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AppSummary {
    #[serde(rename = "appId", default)]
    pub app_id: Option<String>,
}

/// Detail metadata for one catalog listing. `real_installs` is kept as raw
/// JSON so a string or float from the catalog can be told apart from a
/// genuine integer count.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct AppDetail {
    #[serde(rename = "realInstalls", default)]
    pub real_installs: Option<Value>,
    #[serde(rename = "developerEmail", default)]
    pub developer_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Locale {
    pub lang: String,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    MissingInstalls,
    NonNumericInstalls(Value),
    TooManyInstalls(u64),
    NoContact,
}

pub fn assess(detail: &AppDetail, threshold: u64) -> Result<String, Rejection> {
    let installs = match &detail.real_installs {
        None | Some(Value::Null) => return Err(Rejection::MissingInstalls),
        Some(value) => value
            .as_u64()
            .ok_or_else(|| Rejection::NonNumericInstalls(value.clone()))?,
    };

    if installs > threshold {
        return Err(Rejection::TooManyInstalls(installs));
    }

    match detail.developer_email.as_deref().map(str::trim) {
        Some(email) if !email.is_empty() => Ok(email.to_string()),
        _ => Err(Rejection::NoContact),
    }
}

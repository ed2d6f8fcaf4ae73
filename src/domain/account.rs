use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub sent: u32,
    #[serde(default)]
    pub is_test: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderMode {
    Normal,
    Probe,
}

impl Account {
    pub fn mode(&self) -> SenderMode {
        match self.is_test {
            true => SenderMode::Probe,
            false => SenderMode::Normal,
        }
    }

    pub fn effective_quota(&self, default_quota: u32) -> u32 {
        self.quota.unwrap_or(default_quota)
    }

    pub fn has_capacity(&self, default_quota: u32) -> bool {
        self.sent < self.effective_quota(default_quota)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccountHandle {
    pub index: usize,
    pub email: String,
    pub password: String,
}

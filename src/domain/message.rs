#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub subject: String,
    pub body: String,
}

const PROBE_SUBJECT: &str = "Test Email - Spam Check";

pub fn probe_message(marker: &str) -> Message {
    Message {
        subject: format!("{} [{}]", PROBE_SUBJECT, marker),
        body: "This is a test email to check if emails are being spammed.".to_string(),
    }
}

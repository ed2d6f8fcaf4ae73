use std::{future::Future, sync::Arc, time::Duration};

use async_smtp::{
    authentication::{Credentials, Mechanism},
    EmailAddress, Envelope, SendableEmail, SmtpClient, SmtpTransport,
};
use async_trait::async_trait;
use chrono::Utc;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufStream},
    net::TcpStream,
};
use tokio_rustls::{
    rustls::{crypto::ring, pki_types::ServerName, ClientConfig, RootCertStore},
    TlsConnector,
};
use uuid::Uuid;

use crate::{
    configuration::MailServerSettings,
    domain::{account::AccountHandle, message::Message},
};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(#[from] std::io::Error),
    #[error("tls error: {0}")]
    Tls(String),
    #[error("timed out during {0}")]
    Timeout(&'static str),
    #[error("smtp error: {0}")]
    Smtp(#[from] async_smtp::error::Error),
    #[error("invalid address: {0}")]
    Address(String),
    #[error("imap server answered: {0}")]
    Imap(String),
    #[error("{0}")]
    Rejected(String),
}

#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn send_message(
        &self,
        from: &AccountHandle,
        to: &str,
        message: &Message,
    ) -> Result<(), TransportError>;

    /// Whether `folder` of the account's mailbox holds a message whose
    /// subject contains `marker`.
    async fn check_folder(
        &self,
        account: &AccountHandle,
        folder: &str,
        marker: &str,
    ) -> Result<bool, TransportError>;
}

trait MailStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> MailStream for T {}

type Connection = BufStream<Box<dyn MailStream>>;

struct Endpoint {
    host: String,
    port: u16,
    tls: bool,
}

pub struct MailServerTransport {
    smtp: Endpoint,
    imap: Endpoint,
    timeout: Duration,
    connector: TlsConnector,
}

impl MailServerTransport {
    pub fn new(settings: &MailServerSettings) -> Result<Self, TransportError> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let config = ClientConfig::builder_with_provider(Arc::new(ring::default_provider()))
            .with_safe_default_protocol_versions()
            .map_err(|e| TransportError::Tls(e.to_string()))?
            .with_root_certificates(roots)
            .with_no_client_auth();

        Ok(MailServerTransport {
            smtp: Endpoint {
                host: settings.smtp_host.clone(),
                port: settings.smtp_port,
                tls: settings.smtp_tls,
            },
            imap: Endpoint {
                host: settings.imap_host.clone(),
                port: settings.imap_port,
                tls: settings.imap_tls,
            },
            timeout: settings.timeout(),
            connector: TlsConnector::from(Arc::new(config)),
        })
    }

    async fn connect(&self, endpoint: &Endpoint) -> Result<Connection, TransportError> {
        let tcp = within(
            self.timeout,
            "connect",
            TcpStream::connect((endpoint.host.as_str(), endpoint.port)),
        )
        .await?;

        if !endpoint.tls {
            return Ok(BufStream::new(Box::new(tcp) as Box<dyn MailStream>));
        }

        let domain = ServerName::try_from(endpoint.host.clone())
            .map_err(|e| TransportError::Tls(e.to_string()))?;
        let tls = within(self.timeout, "tls handshake", self.connector.connect(domain, tcp)).await?;

        Ok(BufStream::new(Box::new(tls) as Box<dyn MailStream>))
    }
}

async fn within<T, E>(
    limit: Duration,
    step: &'static str,
    future: impl Future<Output = Result<T, E>>,
) -> Result<T, TransportError>
where
    TransportError: From<E>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(TransportError::Timeout(step)),
    }
}

fn parse_address(raw: &str) -> Result<EmailAddress, TransportError> {
    raw.parse::<EmailAddress>()
        .map_err(|_| TransportError::Address(raw.to_string()))
}

fn render_message(from: &str, to: &str, message: &Message) -> String {
    format!(
        "From: {}\r\nTo: {}\r\nSubject: {}\r\nDate: {}\r\nMessage-ID: <{}@{}>\r\nMIME-Version: 1.0\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Transfer-Encoding: 8bit\r\n\r\n{}\r\n",
        from,
        to,
        message.subject,
        Utc::now().to_rfc2822(),
        Uuid::new_v4().simple(),
        from.rsplit('@').next().unwrap_or("localhost"),
        message.body.replace('\n', "\r\n"),
    )
}

fn imap_quote(raw: &str) -> String {
    format!("\"{}\"", raw.replace('\\', "\\\\").replace('"', "\\\""))
}

async fn imap_line(stream: &mut Connection, limit: Duration) -> Result<String, TransportError> {
    let mut line = String::new();
    if within(limit, "imap read", stream.read_line(&mut line)).await? == 0 {
        return Err(TransportError::Imap("connection closed".to_string()));
    }
    Ok(line.trim_end().to_string())
}

async fn imap_command(
    stream: &mut Connection,
    limit: Duration,
    tag: &str,
    command: &str,
) -> Result<Vec<String>, TransportError> {
    within(limit, "imap write", async {
        stream
            .write_all(format!("{} {}\r\n", tag, command).as_bytes())
            .await?;
        stream.flush().await?;
        Ok::<_, std::io::Error>(())
    })
    .await?;

    let mut untagged = vec![];
    loop {
        let line = imap_line(stream, limit).await?;

        match line.strip_prefix(tag) {
            Some(status) => {
                return match status.trim_start().starts_with("OK") {
                    true => Ok(untagged),
                    false => Err(TransportError::Imap(line)),
                };
            }
            None => untagged.push(line),
        }
    }
}

#[async_trait]
impl MessageTransport for MailServerTransport {
    async fn send_message(
        &self,
        from: &AccountHandle,
        to: &str,
        message: &Message,
    ) -> Result<(), TransportError> {
        let envelope = Envelope::new(Some(parse_address(&from.email)?), vec![parse_address(to)?])
            .map_err(|e| TransportError::Address(e.to_string()))?;
        let email = SendableEmail::new(envelope, render_message(&from.email, to, message));

        let stream = self.connect(&self.smtp).await?;
        let client = SmtpClient::new();
        let mut transport = within(self.timeout, "smtp greeting", SmtpTransport::new(client, stream)).await?;

        within(
            self.timeout,
            "smtp login",
            transport.try_login(
                &Credentials::new(from.email.clone(), from.password.clone()),
                &[Mechanism::Plain, Mechanism::Login],
            ),
        )
        .await?;

        let response = within(self.timeout, "smtp send", transport.send(email)).await?;
        _ = tokio::time::timeout(self.timeout, transport.quit()).await;

        match response.is_positive() {
            true => Ok(()),
            false => Err(TransportError::Rejected(format!("{:?}", response))),
        }
    }

    async fn check_folder(
        &self,
        account: &AccountHandle,
        folder: &str,
        marker: &str,
    ) -> Result<bool, TransportError> {
        let mut stream = self.connect(&self.imap).await?;

        let greeting = imap_line(&mut stream, self.timeout).await?;
        if !greeting.starts_with("* OK") {
            return Err(TransportError::Imap(greeting));
        }

        imap_command(
            &mut stream,
            self.timeout,
            "a1",
            &format!("LOGIN {} {}", imap_quote(&account.email), imap_quote(&account.password)),
        )
        .await?;
        imap_command(&mut stream, self.timeout, "a2", &format!("SELECT {}", imap_quote(folder))).await?;
        let lines = imap_command(
            &mut stream,
            self.timeout,
            "a3",
            &format!("SEARCH SUBJECT {}", imap_quote(marker)),
        )
        .await?;
        _ = imap_command(&mut stream, self.timeout, "a4", "LOGOUT").await;

        let found = lines
            .iter()
            .filter_map(|line| line.strip_prefix("* SEARCH"))
            .any(|ids| !ids.trim().is_empty());

        Ok(found)
    }
}

#[cfg(test)]
pub use scripted::{FolderCheck, ScriptedTransport, SentMessage};

// src/services/mailer.rs

//! Templated email delivery.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{MailBackend, MailConfig};

/// Outbound envelope handed to the mail service.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<'a> {
    pub template: &'a str,
    pub to: &'a str,
    pub subject: &'a str,
    pub data: &'a Value,
}

/// Sends templated emails, returning a delivery receipt.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_template(
        &self,
        template: &str,
        to: &str,
        subject: &str,
        data: &Value,
    ) -> Result<String>;
}

/// Build the mailer selected in the configuration.
pub fn create_mailer(config: &MailConfig, client: Client) -> Result<Box<dyn Mailer>> {
    match config.backend {
        MailBackend::Outbox => Ok(Box::new(OutboxMailer::new(config.outbox_dir.clone()))),
        MailBackend::Http => {
            let endpoint = config
                .endpoint
                .clone()
                .ok_or_else(|| AppError::config("mail.endpoint is not set"))?;
            Ok(Box::new(HttpMailer::new(
                client,
                endpoint,
                config.api_key.clone(),
            )))
        }
    }
}

/// Writes each envelope as a JSON file into a local outbox directory.
pub struct OutboxMailer {
    dir: PathBuf,
}

impl OutboxMailer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl Mailer for OutboxMailer {
    async fn send_template(
        &self,
        template: &str,
        to: &str,
        subject: &str,
        data: &Value,
    ) -> Result<String> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let receipt = format!(
            "{}-{}",
            Utc::now().format("%Y%m%dT%H%M%S"),
            uuid::Uuid::new_v4().simple()
        );
        let envelope = Envelope {
            template,
            to,
            subject,
            data,
        };
        let bytes = serde_json::to_vec_pretty(&envelope)?;

        let path = self.dir.join(format!("{receipt}.json"));
        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        drop(file);
        tokio::fs::rename(&tmp, &path).await?;

        Ok(receipt)
    }
}

/// POSTs each envelope to a templated-email HTTP API.
pub struct HttpMailer {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpMailer {
    pub fn new(client: Client, endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send_template(
        &self,
        template: &str,
        to: &str,
        subject: &str,
        data: &Value,
    ) -> Result<String> {
        let envelope = Envelope {
            template,
            to,
            subject,
            data,
        };

        let mut request = self.client.post(&self.endpoint).json(&envelope);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(AppError::mail(format!("{} rejected {}: {}", status, to, body.trim())));
        }
        Ok(body.trim().to_string())
    }
}

//! Email service for loan notifications

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, Message, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    SmtpTransport, Transport,
};
use std::str::FromStr;

use crate::{
    config::EmailConfig,
    error::{AppError, AppResult},
};

/// Outbound e-mail transport
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> AppResult<()>;
}

#[derive(Clone)]
pub struct EmailService {
    from: Mailbox,
    transport: SmtpTransport,
}

impl EmailService {
    pub fn new(config: &EmailConfig) -> AppResult<Self> {
        let from_name = config.smtp_from_name.as_deref().unwrap_or("Libris");
        let from = Mailbox::from_str(&format!("{} <{}>", from_name, config.smtp_from))
            .map_err(|e| AppError::Internal(format!("Invalid from address: {}", e)))?;

        let transport_builder = if config.smtp_use_tls {
            // Use STARTTLS for secure connection
            SmtpTransport::starttls_relay(&config.smtp_host)
                .map_err(|e| AppError::Internal(format!("Failed to create SMTP transport: {}", e)))?
        } else {
            SmtpTransport::builder_dangerous(&config.smtp_host)
        }
        .port(config.smtp_port);

        let transport_builder = if let (Some(username), Some(password)) =
            (&config.smtp_username, &config.smtp_password)
        {
            transport_builder.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            transport_builder
        };

        Ok(Self {
            from,
            transport: transport_builder.build(),
        })
    }

    fn build_message(&self, to: &str, subject: &str, body: &str) -> AppResult<Message> {
        let to_mailbox = Mailbox::from_str(to)
            .map_err(|e| AppError::Internal(format!("Invalid to address: {}", e)))?;

        Message::builder()
            .from(self.from.clone())
            .to(to_mailbox)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(format!(
                                r#"<html><body><p>{}</p></body></html>"#,
                                escape_html(body).replace('\n', "<br>")
                            )),
                    ),
            )
            .map_err(|e| AppError::Internal(format!("Failed to build email: {}", e)))
    }
}

#[async_trait]
impl Mailer for EmailService {
    async fn send(&self, to: &str, subject: &str, body: &str) -> AppResult<()> {
        let email = self.build_message(to, subject, body)?;
        let transport = self.transport.clone();

        // SmtpTransport is blocking
        tokio::task::spawn_blocking(move || transport.send(&email))
            .await
            .map_err(|e| AppError::Internal(format!("Email task failed: {}", e)))?
            .map_err(|e| AppError::Internal(format!("Failed to send email: {}", e)))?;

        Ok(())
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

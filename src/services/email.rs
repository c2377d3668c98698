use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, Message,
    SmtpTransport, Transport,
};

use crate::config::MailerConfig;
use crate::error::ServiceError;

/// Outbound mail port. The OTP and magic-link strategies deliver their
/// out-of-band secrets through this.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), ServiceError>;
}

#[derive(Clone)]
pub struct SmtpMailer {
    transport: SmtpTransport,
    from: String,
}

impl SmtpMailer {
    pub fn new(config: &MailerConfig) -> Result<Self, ServiceError> {
        let mut builder = SmtpTransport::relay(&config.smtp_host)
            .map_err(ServiceError::backend)?
            .port(config.smtp_port);
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }

        tracing::info!(host = %config.smtp_host, "mailer initialized");

        Ok(Self {
            transport: builder.build(),
            from: config.from_address.clone(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), ServiceError> {
        let message = Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e: lettre::address::AddressError| ServiceError::backend(e))?,
            )
            .to(to
                .parse()
                .map_err(|e: lettre::address::AddressError| {
                    ServiceError::InvalidArgument(format!("invalid recipient address: {}", e))
                })?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(ServiceError::backend)?;

        // the smtp transport is blocking; keep it off the runtime threads
        let transport = self.transport.clone();
        tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!(e)))?
            .map_err(ServiceError::backend)?;

        Ok(())
    }
}

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::core::config::EmailConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> anyhow::Result<()>;
}

/// Mailer used when no SMTP relay is configured. Messages are logged and
/// kept in an outbox.
#[derive(Default, Clone)]
pub struct LogMailer {
    outbox: Arc<Mutex<Vec<OutgoingEmail>>>,
}

impl LogMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<OutgoingEmail> {
        self.outbox.lock().await.clone()
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: OutgoingEmail) -> anyhow::Result<()> {
        log::info!("Mail to {} (not delivered): {}", email.to, email.subject);
        self.outbox.lock().await.push(email);
        Ok(())
    }
}

#[cfg(feature = "mail")]
pub struct SmtpMailer {
    transport: lettre::AsyncSmtpTransport<lettre::Tokio1Executor>,
    from: lettre::message::Mailbox,
}

#[cfg(feature = "mail")]
impl SmtpMailer {
    pub fn new(config: &EmailConfig, host: &str) -> anyhow::Result<Self> {
        use lettre::transport::smtp::authentication::Credentials;
        use lettre::{AsyncSmtpTransport, Tokio1Executor};

        let builder = if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?
                .credentials(Credentials::new(user.clone(), pass.clone()))
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
        };

        Ok(Self {
            transport: builder.port(config.smtp_port).build(),
            from: config
                .from
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid from address: {}", e))?,
        })
    }
}

#[cfg(feature = "mail")]
#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> anyhow::Result<()> {
        use lettre::message::{header::ContentType, Message};
        use lettre::AsyncTransport;

        let message = Message::builder()
            .from(self.from.clone())
            .to(email
                .to
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid to address: {}", e))?)
            .subject(email.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(email.body)?;

        self.transport.send(message).await?;
        log::info!("Mail sent to {}", email.to);
        Ok(())
    }
}

pub fn build_mailer(config: &EmailConfig) -> anyhow::Result<Arc<dyn Mailer>> {
    match config.smtp_host.as_deref() {
        #[cfg(feature = "mail")]
        Some(host) => Ok(Arc::new(SmtpMailer::new(config, host)?)),
        #[cfg(not(feature = "mail"))]
        Some(host) => {
            log::warn!("SMTP host {} configured but mail support is disabled", host);
            Ok(Arc::new(LogMailer::new()))
        }
        None => Ok(Arc::new(LogMailer::new())),
    }
}

pub fn invitation_email(
    to: &str,
    workspace_name: &str,
    role: &str,
    accept_url: &str,
) -> OutgoingEmail {
    OutgoingEmail {
        to: to.to_string(),
        subject: format!("You've been invited to join {workspace_name}"),
        body: format!(
            "You have been invited to join {workspace_name} as {role}.\n\n\
             Accept the invitation here:\n{accept_url}\n\n\
             This invitation will expire in 7 days.\n\n\
             If you did not expect this invitation, you can safely ignore this email."
        ),
    }
}

pub fn otp_email(to: &str, code: &str, minutes: i64) -> OutgoingEmail {
    OutgoingEmail {
        to: to.to_string(),
        subject: "Your sign-in code".to_string(),
        body: format!(
            "Your sign-in code is {code}.\n\nIt expires in {minutes} minutes. \
             If you did not request it, ignore this email."
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_mailer_keeps_outbox() {
        let mailer = LogMailer::new();
        mailer
            .send(otp_email("bob@x.com", "123456", 10))
            .await
            .unwrap();
        let sent = mailer.sent().await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].body.contains("123456"));
    }

    #[test]
    fn test_build_without_smtp_host() {
        assert!(build_mailer(&EmailConfig::default()).is_ok());
    }
}

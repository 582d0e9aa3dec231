//! Email Service
//!
//! SMTP delivery of contact-form messages to the site owner.

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::Config;

/// A validated message from the contact form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactMessage {
    pub name: String,
    pub email: String,
    pub message: String,
}

/// Delivers contact messages.
///
/// The contact handler only depends on this trait so tests can swap SMTP out.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_contact(&self, message: &ContactMessage) -> Result<()>;
}

/// Email service for sending contact messages via SMTP.
#[derive(Clone)]
pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: Mailbox,
    to_address: Mailbox,
}

impl EmailService {
    /// Create a new email service from server configuration.
    ///
    /// Requires SMTP to be fully configured (`config.has_smtp()` must be true).
    pub fn new(config: &Config) -> Result<Self> {
        let host = config.smtp_host.as_ref().context("SMTP_HOST is required")?;
        let username = config
            .smtp_username
            .as_ref()
            .context("SMTP_USERNAME is required")?;
        let password = config
            .smtp_password
            .as_ref()
            .context("SMTP_PASSWORD is required")?;
        let from = config.smtp_from.as_ref().context("SMTP_FROM is required")?;

        let from_address: Mailbox = from
            .parse()
            .context("SMTP_FROM is not a valid email address")?;
        let to_address: Mailbox = match config.contact_to.as_ref() {
            Some(to) => to
                .parse()
                .context("CONTACT_TO is not a valid email address")?,
            None => from_address.clone(),
        };

        let creds = Credentials::new(username.clone(), password.clone());

        let mailer = match config.smtp_tls.as_str() {
            "tls" => AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .context("Failed to create SMTP TLS transport")?
                .port(config.smtp_port)
                .credentials(creds)
                .build(),
            "none" => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
                .port(config.smtp_port)
                .credentials(creds)
                .build(),
            // Default: STARTTLS
            _ => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .context("Failed to create SMTP STARTTLS transport")?
                .port(config.smtp_port)
                .credentials(creds)
                .build(),
        };

        Ok(Self {
            mailer,
            from_address,
            to_address,
        })
    }

    /// Test the SMTP connection by sending a NOOP command.
    pub async fn test_connection(&self) -> Result<()> {
        let ok = self
            .mailer
            .test_connection()
            .await
            .context("SMTP connection test failed")?;
        if !ok {
            anyhow::bail!("SMTP server did not respond positively to connection test");
        }
        Ok(())
    }

    /// Builds the notification sent to the site owner.
    ///
    /// Replies go straight to the visitor through `Reply-To`.
    fn build_message(&self, contact: &ContactMessage) -> Result<Message> {
        let address: Address = contact
            .email
            .parse()
            .context("Invalid sender email address")?;
        let reply_to = Mailbox::new(Some(contact.name.clone()), address);

        Message::builder()
            .from(self.from_address.clone())
            .to(self.to_address.clone())
            .reply_to(reply_to)
            .subject(format!("📩 New Message from {}", contact.name))
            .multipart(MultiPart::alternative_plain_html(
                plain_body(contact),
                html_body(contact),
            ))
            .context("Failed to build email message")
    }
}

#[async_trait]
impl Mailer for EmailService {
    async fn send_contact(&self, message: &ContactMessage) -> Result<()> {
        let email = self.build_message(message)?;

        self.mailer
            .send(email)
            .await
            .context("Failed to send email via SMTP")?;

        Ok(())
    }
}

fn plain_body(contact: &ContactMessage) -> String {
    format!(
        "Name: {}\nEmail: {}\nMessage: {}",
        contact.name, contact.email, contact.message
    )
}

fn html_body(contact: &ContactMessage) -> String {
    let name = escape_html(&contact.name);
    let email = escape_html(&contact.email);
    let message = escape_html(&contact.message);
    format!(
        r#"<div style="font-family: Arial, sans-serif; padding: 20px; color: #333; line-height: 1.6;">
  <h2 style="color: #00cfff; margin-bottom: 10px;">New Portfolio Message</h2>
  <p><strong>Name:</strong> {name}</p>
  <p><strong>Email:</strong> <a href="mailto:{email}">{email}</a></p>
  <div style="margin-top: 20px; padding: 15px; background: #f4f4f4; border-left: 4px solid #00cfff; border-radius: 5px;">
    <p style="margin: 0; white-space: pre-line;">{message}</p>
  </div>
  <p style="margin-top: 20px; font-size: 12px; color: #777;">This message was sent from your portfolio website.</p>
</div>"#
    )
}

/// Escapes visitor input before it is embedded in the HTML body.
fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

//! Invitation mailer
//!
//! The HTTP layer only sees the [`Mailer`] trait. [`SmtpMailer`] delivers
//! through an authenticated STARTTLS relay.

use async_trait::async_trait;
use chrono::{DateTime, Local};
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use tracing::info;

use meetline_core::{MailConfig, MailCredentials, RoomId};

/// Display name on the From header
pub const SENDER_NAME: &str = "Video Meeting Invitation";

/// Subject line of every invitation
pub const INVITATION_SUBJECT: &str = "Invitation to Join a Video Meeting";

/// Mail delivery errors
#[derive(Error, Debug)]
pub enum MailError {
    #[error("invalid address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("smtp transport error: {0}")]
    Transport(String),
}

/// What the transport said when it accepted a message
#[derive(Debug, Clone)]
pub struct MailReceipt {
    pub response: String,
}

/// Delivers meeting invitations
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send an invitation to `recipient` for `room`
    async fn send_invitation(&self, recipient: &str, room: &RoomId) -> Result<MailReceipt, MailError>;
}

/// Rendered invitation content
#[derive(Debug, Clone)]
pub struct InvitationEmail {
    pub subject: String,
    pub text: String,
    pub html: String,
}

impl InvitationEmail {
    /// Render the invitation for a meeting link, stamped with `now`
    pub fn render(meeting_link: &str, now: DateTime<Local>) -> Self {
        let date = now.format("%a %b %d %Y");
        let time = now.format("%-I:%M:%S %p");
        let link = escape_html(meeting_link);

        let text = format!(
            "You have been invited to a video meeting.\n\n\
             Date: {date}\n\
             Time: {time}\n\
             Join using this link: {meeting_link}\n\n\
             If you have any issues joining the meeting, please contact the meeting organizer.\n"
        );

        let html = format!(
            r#"<div style="font-family: Arial, sans-serif; padding: 20px; border: 1px solid #ddd; border-radius: 10px; max-width: 600px;">
    <h2 style="color: #2E86C1; text-align: center;">You're Invited to a Video Meeting!</h2>
    <p>Hello,</p>
    <p>You have been invited to join a video meeting. Please find the details below:</p>
    <div style="background: #f4f4f4; padding: 10px; border-radius: 8px;">
        <p><strong>Date:</strong> {date}</p>
        <p><strong>Time:</strong> {time}</p>
        <p><strong>Meeting Link:</strong> <a href="{link}" style="color: #2980b9; text-decoration: none;">Click here to join</a></p>
    </div>
    <p style="text-align: center;">
        <a href="{link}" style="background: #2980b9; color: #ffffff; padding: 10px 20px; text-decoration: none; font-size: 16px; border-radius: 5px; display: inline-block;">Join Meeting Now</a>
    </p>
    <p>If you have any issues joining the meeting, please contact the meeting organizer.</p>
    <p>Best regards,</p>
    <p><strong>Video Meeting Team</strong></p>
</div>
"#
        );

        Self {
            subject: INVITATION_SUBJECT.to_string(),
            text,
            html,
        }
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
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

/// SMTP-backed mailer
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    config: MailConfig,
}

impl SmtpMailer {
    /// Build the transport; no connection is made until the first send
    pub fn new(config: &MailConfig, credentials: MailCredentials) -> Result<Self, MailError> {
        let address: Address = credentials
            .sender
            .parse()
            .map_err(|e: lettre::address::AddressError| MailError::InvalidAddress {
                address: credentials.sender.clone(),
                reason: e.to_string(),
            })?;
        let from = Mailbox::new(Some(SENDER_NAME.to_string()), address);

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| MailError::Transport(e.to_string()))?
            .port(config.smtp_port)
            .credentials(Credentials::new(credentials.sender, credentials.password))
            .build();

        info!(
            "SMTP mailer ready ({}:{} as {})",
            config.smtp_host, config.smtp_port, from
        );

        Ok(Self {
            transport,
            from,
            config: config.clone(),
        })
    }

    fn build_message(&self, recipient: &str, room: &RoomId) -> Result<Message, MailError> {
        let to: Mailbox = recipient.trim().parse().map_err(
            |e: lettre::address::AddressError| MailError::InvalidAddress {
                address: recipient.to_string(),
                reason: e.to_string(),
            },
        )?;

        let email = InvitationEmail::render(&self.config.meeting_link(room.as_str()), Local::now());

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject)
            .multipart(MultiPart::alternative_plain_html(email.text, email.html))
            .map_err(|e| MailError::Build(e.to_string()))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_invitation(&self, recipient: &str, room: &RoomId) -> Result<MailReceipt, MailError> {
        let message = self.build_message(recipient, room)?;

        let response = self
            .transport
            .send(message)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        let response = format!(
            "{} {}",
            response.code(),
            response.message().collect::<Vec<_>>().join(" ")
        );
        info!(recipient = %recipient, room = %room, response = %response, "invitation email sent");

        Ok(MailReceipt { response })
    }
}

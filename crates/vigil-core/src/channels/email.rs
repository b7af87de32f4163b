use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;

use super::{AlertEvent, ChannelError, NotificationChannel};
use crate::profile::IdentityProfile;

/// Sends the incident email with the snapshot attached, over implicit-TLS
/// SMTP to the configured relay.
///
/// A missing app password degrades the channel: every delivery fails with
/// `Unavailable` and gets logged, nothing else happens.
pub struct EmailChannel {
    smtp_host: String,
    smtp_port: u16,
    sender: String,
    recipient: String,
    password: Option<String>,
    subject: String,
}

impl EmailChannel {
    pub fn new(
        smtp_host: impl Into<String>,
        smtp_port: u16,
        sender: impl Into<String>,
        recipient: impl Into<String>,
        password: Option<String>,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            smtp_host: smtp_host.into(),
            smtp_port,
            sender: sender.into(),
            recipient: recipient.into(),
            password,
            subject: subject.into(),
        }
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn deliver(&self, event: &AlertEvent) -> Result<(), ChannelError> {
        let Some(password) = self.password.as_ref() else {
            return Err(ChannelError::Unavailable("email password"));
        };
        if self.sender.is_empty() {
            return Err(ChannelError::Unavailable("email sender address"));
        }
        if self.recipient.is_empty() {
            return Err(ChannelError::Unavailable("email recipient address"));
        }

        let from: Mailbox = self
            .sender
            .parse()
            .map_err(|err| ChannelError::Delivery(format!("invalid sender address: {err}")))?;
        let to: Mailbox = self
            .recipient
            .parse()
            .map_err(|err| ChannelError::Delivery(format!("invalid recipient address: {err}")))?;

        let image = tokio::fs::read(&event.image_path).await.map_err(|err| {
            ChannelError::Delivery(format!(
                "failed to read snapshot {}: {err}",
                event.image_path.display()
            ))
        })?;
        let jpeg = ContentType::parse("image/jpeg")
            .map_err(|err| ChannelError::Delivery(err.to_string()))?;

        let body = render_body(&event.profile, event.similarity, &event.timestamp_text());
        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(self.subject.clone())
            .multipart(
                MultiPart::mixed()
                    .singlepart(
                        SinglePart::builder().header(ContentType::TEXT_HTML).body(body),
                    )
                    .singlepart(Attachment::new(event.image_name.clone()).body(image, jpeg)),
            )
            .map_err(|err| ChannelError::Delivery(format!("failed to build message: {err}")))?;

        let transport: AsyncSmtpTransport<Tokio1Executor> =
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.smtp_host)
                .map_err(|err| ChannelError::Delivery(format!("smtp setup failed: {err}")))?
                .port(self.smtp_port)
                .credentials(Credentials::new(self.sender.clone(), password.clone()))
                .build();

        transport
            .send(message)
            .await
            .map_err(|err| ChannelError::Delivery(format!("smtp send failed: {err}")))?;
        debug!(recipient = %self.recipient, alert = %event.alert_id, "alert email sent");
        Ok(())
    }
}

/// Incident report shown in the email body.
fn render_body(profile: &IdentityProfile, similarity: i32, detected_at: &str) -> String {
    let mut details = String::new();
    details.push_str(&format!("<li><b>Name:</b> {}</li>", profile.name));
    details.push_str(&format!("<li><b>Category:</b> {}</li>", profile.category));
    for attr in &profile.attributes {
        details.push_str(&format!("<li><b>{}:</b> {}</li>", attr.label, attr.value));
    }
    details.push_str(&format!("<li><b>Match Confidence:</b> {similarity}%</li>"));
    details.push_str(&format!("<li><b>Detected At:</b> {detected_at}</li>"));
    format!(
        "<html><body><h2>Security Alert: {} detected</h2><ul>{details}</ul>\
         <p>The camera snapshot is attached.</p></body></html>",
        profile.name
    )
}

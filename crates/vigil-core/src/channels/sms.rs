use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{AlertEvent, ChannelError, NotificationChannel};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Sends the short alert text through the messaging provider's HTTP API
/// (Twilio-compatible: form POST with basic auth).
///
/// This is the rate-limited channel; the dispatcher consults
/// [`cooldown`](NotificationChannel::cooldown) before spawning a delivery.
pub struct SmsChannel {
    api_base: String,
    account_sid: Option<String>,
    auth_token: Option<String>,
    from_number: Option<String>,
    to_number: String,
    cooldown: Duration,
    client: reqwest::Client,
}

impl SmsChannel {
    pub fn new(
        api_base: impl Into<String>,
        account_sid: Option<String>,
        auth_token: Option<String>,
        from_number: Option<String>,
        to_number: impl Into<String>,
        cooldown: Duration,
    ) -> Self {
        Self {
            api_base: api_base.into(),
            account_sid,
            auth_token,
            from_number,
            to_number: to_number.into(),
            cooldown,
            client: reqwest::Client::new(),
        }
    }

    fn credential<'a>(
        value: &'a Option<String>,
        what: &'static str,
    ) -> Result<&'a str, ChannelError> {
        value
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or(ChannelError::Unavailable(what))
    }
}

#[async_trait]
impl NotificationChannel for SmsChannel {
    fn name(&self) -> &'static str {
        "sms"
    }

    fn cooldown(&self) -> Option<Duration> {
        Some(self.cooldown)
    }

    async fn deliver(&self, event: &AlertEvent) -> Result<(), ChannelError> {
        let sid = Self::credential(&self.account_sid, "sms account sid")?;
        let token = Self::credential(&self.auth_token, "sms auth token")?;
        let from = Self::credential(&self.from_number, "sms sender number")?;
        if self.to_number.is_empty() {
            return Err(ChannelError::Unavailable("sms recipient number"));
        }

        let url = format!(
            "{}/Accounts/{}/Messages.json",
            self.api_base.trim_end_matches('/'),
            sid
        );
        let body = message_text(event);
        let response = self
            .client
            .post(&url)
            .timeout(REQUEST_TIMEOUT)
            .basic_auth(sid, Some(token))
            .form(&[
                ("To", self.to_number.as_str()),
                ("From", from),
                ("Body", body.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?;
        debug!(status = %response.status(), alert = %event.alert_id, "sms accepted by provider");
        Ok(())
    }
}

fn message_text(event: &AlertEvent) -> String {
    let mut text = format!(
        "ALERT: {} ({}) detected at {}.",
        event.profile.name,
        event.profile.category,
        event.timestamp_text()
    );
    if let Some(last_seen) = event.profile.attribute("Last Seen") {
        text.push_str(&format!(" Last seen: {last_seen}."));
    }
    text
}

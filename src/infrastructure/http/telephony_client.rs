/// Outbound calls through the Twilio REST API
use crate::config::TelephonyConfig;
use crate::domain::telephony::{CallPlacement, PlacedCall, TelephonyError, TelephonyGateway};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

pub struct TwilioGateway {
    client: Client,
    api_base: String,
    account_sid: String,
    auth_token: String,
}

#[derive(Deserialize)]
struct CallResource {
    sid: String,
}

impl TwilioGateway {
    pub fn new(config: &TelephonyConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(std::time::Duration::from_millis(config.timeout_ms)).build()?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
        })
    }

    fn calls_url(&self) -> String {
        format!("{}/Accounts/{}/Calls.json", self.api_base, self.account_sid)
    }
}

/// Form fields for a call whose TwiML and status events both go to the callback.
///
/// The TwiML fetch on pickup is tagged `event=answered`; status callbacks are
/// told apart by their `CallStatus`.
fn placement_form(placement: &CallPlacement) -> Vec<(&'static str, String)> {
    let mut form = vec![
        ("To", placement.to.to_string()),
        ("From", placement.from.to_string()),
        ("Url", format!("{}?event=answered", placement.callback_url)),
        ("Method", "POST".to_string()),
        ("StatusCallback", placement.callback_url.clone()),
        ("StatusCallbackMethod", "POST".to_string()),
    ];
    for event in ["initiated", "ringing", "answered", "completed"] {
        form.push(("StatusCallbackEvent", event.to_string()));
    }
    form
}

#[async_trait]
impl TelephonyGateway for TwilioGateway {
    async fn place_call(&self, placement: &CallPlacement) -> Result<PlacedCall, TelephonyError> {
        let response = self
            .client
            .post(self.calls_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&placement_form(placement))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TelephonyError::Timeout
                } else {
                    TelephonyError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(if status.is_client_error() {
                TelephonyError::Rejected(format!("HTTP {}: {}", status, detail))
            } else {
                TelephonyError::Unavailable(format!("HTTP {}: {}", status, detail))
            });
        }

        let call: CallResource = response
            .json()
            .await
            .map_err(|e| TelephonyError::Unavailable(format!("unexpected response: {}", e)))?;
        debug!("Twilio accepted call to {}: {}", placement.to, call.sid);

        Ok(PlacedCall { provider_ref: call.sid })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::shared::value_objects::PhoneNumber;

    #[test]
    fn test_placement_form() {
        let placement = CallPlacement {
            to: PhoneNumber::parse("+14155550100").unwrap(),
            from: PhoneNumber::parse("+14155550199").unwrap(),
            callback_url: "https://calls.example.com/webhooks/voice/abc".to_string(),
            greeting_audio_url: None,
        };

        let form = placement_form(&placement);

        assert!(form.contains(&("To", "+14155550100".to_string())));
        assert!(form.contains(&("Url", "https://calls.example.com/webhooks/voice/abc?event=answered".to_string())));
        assert!(form.contains(&("StatusCallback", "https://calls.example.com/webhooks/voice/abc".to_string())));
        assert_eq!(form.iter().filter(|(k, _)| *k == "StatusCallbackEvent").count(), 4);
    }

    #[test]
    fn test_calls_url() {
        let gateway = TwilioGateway::new(&TelephonyConfig {
            account_sid: "AC123".to_string(),
            ..TelephonyConfig::default()
        })
        .unwrap();

        assert_eq!(gateway.calls_url(), "https://api.twilio.com/2010-04-01/Accounts/AC123/Calls.json");
    }
}

use replies_core::types::Channel;

use crate::error::{ChannelError, Result};
use crate::types::InboundFragment;

/// Parses a provider's native webhook body into an `InboundFragment`.
///
/// Each channel's form-field names differ (Twilio-style `MessageSid`/`Body`
/// for WhatsApp and SMS, a JSON envelope for email); this trait is the only
/// place that distinction is allowed to leak past ingest.
pub trait PayloadAdapter: Send + Sync {
    fn channel(&self) -> Channel;
    fn parse(&self, body: &str) -> Result<InboundFragment>;
}

/// Decode an `application/x-www-form-urlencoded` body into key/value pairs.
/// Shared with signature verification, which needs the same pairs sorted
/// into the provider's canonical string.
pub fn parse_form_urlencoded(body: &str) -> Vec<(String, String)> {
    body.split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next()?;
            let value = parts.next().unwrap_or("");
            Some((
                urlencoding::decode(key).ok()?.into_owned(),
                urlencoding::decode(value).ok()?.into_owned().replace('+', " "),
            ))
        })
        .collect()
}

fn field<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// Twilio-style WhatsApp webhook: `application/x-www-form-urlencoded` with
/// `MessageSid`, `From` (`whatsapp:+1555…`), `To`, `Body`.
pub struct WhatsAppAdapter;

impl PayloadAdapter for WhatsAppAdapter {
    fn channel(&self) -> Channel {
        Channel::WhatsApp
    }

    fn parse(&self, body: &str) -> Result<InboundFragment> {
        let params = parse_form_urlencoded(body);
        let message_sid = field(&params, "MessageSid")
            .ok_or_else(|| ChannelError::MalformedPayload("missing MessageSid".to_string()))?;
        let from = field(&params, "From")
            .ok_or_else(|| ChannelError::MalformedPayload("missing From".to_string()))?;
        let to = field(&params, "To")
            .ok_or_else(|| ChannelError::MalformedPayload("missing To".to_string()))?;
        let text = field(&params, "Body").unwrap_or_default();

        Ok(InboundFragment {
            channel: Channel::WhatsApp,
            message_sid: message_sid.to_string(),
            from_identifier: strip_whatsapp_prefix(from).to_string(),
            to_identifier: strip_whatsapp_prefix(to).to_string(),
            body: text.to_string(),
        })
    }
}

fn strip_whatsapp_prefix(s: &str) -> &str {
    s.strip_prefix("whatsapp:").unwrap_or(s)
}

/// Twilio-style SMS webhook: same shape as WhatsApp minus the `whatsapp:`
/// URI prefix on `From`/`To`.
pub struct SmsAdapter;

impl PayloadAdapter for SmsAdapter {
    fn channel(&self) -> Channel {
        Channel::Sms
    }

    fn parse(&self, body: &str) -> Result<InboundFragment> {
        let params = parse_form_urlencoded(body);
        let message_sid = field(&params, "MessageSid")
            .ok_or_else(|| ChannelError::MalformedPayload("missing MessageSid".to_string()))?;
        let from = field(&params, "From")
            .ok_or_else(|| ChannelError::MalformedPayload("missing From".to_string()))?;
        let to = field(&params, "To")
            .ok_or_else(|| ChannelError::MalformedPayload("missing To".to_string()))?;
        let text = field(&params, "Body").unwrap_or_default();

        Ok(InboundFragment {
            channel: Channel::Sms,
            message_sid: message_sid.to_string(),
            from_identifier: from.to_string(),
            to_identifier: to.to_string(),
            body: text.to_string(),
        })
    }
}

#[derive(Debug, serde::Deserialize)]
struct EmailWebhookPayload {
    message_id: String,
    from: String,
    to: String,
    #[serde(default)]
    text: String,
}

/// Inbound email webhook: JSON body (the common shape for providers like
/// SendGrid/Postmark's parse-webhook integrations).
pub struct EmailAdapter;

impl PayloadAdapter for EmailAdapter {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    fn parse(&self, body: &str) -> Result<InboundFragment> {
        let payload: EmailWebhookPayload = serde_json::from_str(body)
            .map_err(|e| ChannelError::MalformedPayload(e.to_string()))?;

        Ok(InboundFragment {
            channel: Channel::Email,
            message_sid: payload.message_id,
            from_identifier: payload.from,
            to_identifier: payload.to,
            body: payload.text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whatsapp_strips_uri_prefix() {
        let adapter = WhatsAppAdapter;
        let fragment = adapter
            .parse("MessageSid=SM123&From=whatsapp%3A%2B15551234567&To=whatsapp%3A%2B1800&Body=hi+there")
            .unwrap();
        assert_eq!(fragment.from_identifier, "+15551234567");
        assert_eq!(fragment.to_identifier, "+1800");
        assert_eq!(fragment.body, "hi there");
    }

    #[test]
    fn sms_keeps_raw_numbers() {
        let adapter = SmsAdapter;
        let fragment = adapter
            .parse("MessageSid=SM456&From=%2B15551234567&To=%2B1800&Body=yo")
            .unwrap();
        assert_eq!(fragment.from_identifier, "+15551234567");
        assert_eq!(fragment.body, "yo");
    }

    #[test]
    fn missing_required_field_is_malformed() {
        let adapter = WhatsAppAdapter;
        let err = adapter.parse("Body=hi").unwrap_err();
        assert!(matches!(err, ChannelError::MalformedPayload(_)));
    }

    #[test]
    fn email_parses_json_body() {
        let adapter = EmailAdapter;
        let fragment = adapter
            .parse(r#"{"message_id":"m-1","from":"a@example.com","to":"support@acme.co","text":"need help"}"#)
            .unwrap();
        assert_eq!(fragment.message_sid, "m-1");
        assert_eq!(fragment.body, "need help");
    }
}

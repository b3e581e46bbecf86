use async_trait::async_trait;
use aws_sdk_sesv2::error::ProvideErrorMetadata;
use aws_sdk_sesv2::types::{Body, Content, Destination, EmailContent, Message};
use aws_sdk_sesv2::Client as SesClient;

use crate::types::Location;

pub const ALERT_SUBJECT: &str = "🚨 RAKSHAK ALERT — Distress Detected";

#[derive(Debug, Clone, PartialEq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Result of a single send attempt. Failures are values, never errors.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Delivered { message_id: String },
    Failed { error_code: String },
}

impl SendOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, SendOutcome::Delivered { .. })
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> SendOutcome;
}

/// Sends through SES v2 from a verified sender identity.
pub struct SesMailer {
    client: SesClient,
    sender: String,
}

impl SesMailer {
    pub fn new(client: SesClient, sender: impl Into<String>) -> Self {
        Self {
            client,
            sender: sender.into(),
        }
    }
}

fn utf8(data: &str) -> Result<Content, String> {
    Content::builder()
        .data(data)
        .charset("UTF-8")
        .build()
        .map_err(|e| format!("{:?}", e))
}

#[async_trait]
impl Mailer for SesMailer {
    async fn send(&self, message: &EmailMessage) -> SendOutcome {
        let content = (|| {
            let body = Body::builder()
                .html(utf8(&message.html)?)
                .text(utf8(&message.text)?)
                .build();
            let simple = Message::builder()
                .subject(utf8(&message.subject)?)
                .body(body)
                .build();
            Ok::<_, String>(EmailContent::builder().simple(simple).build())
        })();

        let content = match content {
            Ok(content) => content,
            Err(e) => {
                tracing::error!(to = %message.to, error = %e, "Failed to build email content");
                return SendOutcome::Failed {
                    error_code: "InvalidContent".to_string(),
                };
            }
        };

        let result = self
            .client
            .send_email()
            .from_email_address(&self.sender)
            .destination(Destination::builder().to_addresses(&message.to).build())
            .content(content)
            .send()
            .await;

        match result {
            Ok(output) => {
                let message_id = output.message_id().unwrap_or_default().to_string();
                tracing::info!(to = %message.to, message_id = %message_id, "SES email sent");
                SendOutcome::Delivered { message_id }
            }
            Err(e) => {
                let error_code = e
                    .as_service_error()
                    .and_then(|se| se.code())
                    .unwrap_or("Unknown")
                    .to_string();
                tracing::error!(to = %message.to, error_code = %error_code, error = ?e, "SES send failed");
                SendOutcome::Failed { error_code }
            }
        }
    }
}

/// `voice_distress` -> `Voice Distress`
pub fn humanize_detection(detection_type: &str) -> String {
    detection_type
        .split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

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

/// Build the distress alert email for one guardian.
pub fn alert_email(
    to_email: &str,
    guardian_name: &str,
    detection_type: &str,
    location: &Location,
    timestamp: &str,
) -> EmailMessage {
    let guardian_name = match guardian_name.trim() {
        "" => "Guardian",
        name => name,
    };
    let detection = humanize_detection(detection_type);
    let coordinates = format!("{}, {}", location.lat, location.lng);

    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
</head>
<body style="font-family: Inter, Arial, sans-serif; background: #0b1120; color: #e2e5ea; padding: 32px;">
    <div style="max-width: 500px; margin: 0 auto; background: #131b2e; border-radius: 12px; padding: 32px; border: 1px solid rgba(255,255,255,0.06);">
        <h1 style="color: #c06070; font-size: 18px; margin-bottom: 4px;">🚨 DISTRESS ALERT</h1>
        <p style="color: #8b92a0; font-size: 14px; margin-bottom: 24px;">RAKSHAK has detected a potential distress event.</p>

        <table style="width: 100%; font-size: 14px;">
            <tr>
                <td style="color: #8b92a0; padding: 8px 0;">Detection Type</td>
                <td style="color: #e2e5ea; font-weight: 600; text-align: right;">{detection}</td>
            </tr>
            <tr>
                <td style="color: #8b92a0; padding: 8px 0;">Location</td>
                <td style="color: #e2e5ea; font-weight: 600; text-align: right;">{coordinates}</td>
            </tr>
            <tr>
                <td style="color: #8b92a0; padding: 8px 0;">Time</td>
                <td style="color: #e2e5ea; font-weight: 600; text-align: right;">{timestamp}</td>
            </tr>
        </table>

        <hr style="border: none; border-top: 1px solid rgba(255,255,255,0.06); margin: 20px 0;" />

        <p style="color: #8b92a0; font-size: 13px;">
            Dear {name}, you are receiving this because you are listed as an emergency guardian.
            Please check on the individual's safety and contact local authorities if needed.
        </p>

        <p style="color: #5a6070; font-size: 11px; margin-top: 24px;">
            This is an automated alert from RAKSHAK, the AI-powered silent guardian system.
        </p>
    </div>
</body>
</html>"#,
        detection = escape_html(&detection),
        coordinates = coordinates,
        timestamp = escape_html(timestamp),
        name = escape_html(guardian_name),
    );

    let text = format!(
        "RAKSHAK DISTRESS ALERT\n\nDetection: {}\nLocation: {}\nTime: {}\n\nDear {}, please check on the individual's safety.",
        detection, coordinates, timestamp, guardian_name
    );

    EmailMessage {
        to: to_email.to_string(),
        subject: ALERT_SUBJECT.to_string(),
        html,
        text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_humanize_detection() {
        assert_eq!(humanize_detection("voice_distress"), "Voice Distress");
        assert_eq!(humanize_detection("SCREAM_distress"), "Scream Distress");
        assert_eq!(humanize_detection("fall"), "Fall");
        assert_eq!(humanize_detection(""), "");
    }

    #[test]
    fn test_alert_email_contents() {
        let location = Location { lat: 12.9716, lng: 77.5946 };
        let email = alert_email(
            "mom@example.com",
            "Mom <3",
            "voice_distress",
            &location,
            "2026-10-19T08:00:00+00:00",
        );

        assert_eq!(email.to, "mom@example.com");
        assert_eq!(email.subject, ALERT_SUBJECT);
        assert!(email.text.contains("Detection: Voice Distress"));
        assert!(email.text.contains("Location: 12.9716, 77.5946"));
        assert!(email.text.contains("Time: 2026-10-19T08:00:00+00:00"));
        assert!(email.text.contains("Dear Mom <3,"));
        assert!(email.html.contains("Dear Mom &lt;3,"));
        assert!(!email.html.contains("Mom <3"));
    }

    #[test]
    fn test_blank_guardian_name_falls_back() {
        let email = alert_email("g@example.com", "  ", "fall", &Location::default(), "t");
        assert!(email.text.contains("Dear Guardian,"));
    }
}

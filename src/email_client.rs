use crate::error::{AppError, EmailError};
use crate::validators::is_valid_email;
use serde::Serialize;

/// HTTP client for the outbound mail relay.
#[derive(Clone)]
pub struct EmailClient {
    http_client: reqwest::Client,
    base_url: String,
    sender: SenderAddress,
}

/// A sender address that has passed validation.
#[derive(Clone)]
pub struct SenderAddress(String);

impl SenderAddress {
    pub fn parse(s: String) -> Result<Self, AppError> {
        let email = is_valid_email(&s)?;
        Ok(Self(email))
    }

    pub fn inner(&self) -> &str {
        &self.0
    }
}

#[derive(Serialize)]
struct SendEmailRequest {
    from: String,
    to: String,
    #[serde(rename = "Subject")]
    subject: String,
    #[serde(rename = "Html")]
    html: String,
}

impl EmailClient {
    pub fn new(base_url: String, sender: SenderAddress, http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            base_url,
            sender,
        }
    }

    pub async fn send_email(
        &self,
        recipient: &str,
        subject: &str,
        html_content: &str,
    ) -> Result<(), AppError> {
        let url = format!("{}/email", self.base_url);
        let request = SendEmailRequest {
            from: self.sender.inner().to_string(),
            to: recipient.to_string(),
            subject: subject.to_string(),
            html: html_content.to_string(),
        };

        self.http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send email: {}", e);
                AppError::Email(EmailError::SendFailed(e.to_string()))
            })?
            .error_for_status()
            .map_err(|e| {
                tracing::error!("Email service returned error: {}", e);
                AppError::Email(EmailError::ServiceUnavailable(e.to_string()))
            })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_address_parse_valid_email() {
        let sender = SenderAddress::parse("no-reply@example.com".to_string());
        assert!(sender.is_ok());
        assert_eq!(sender.unwrap().inner(), "no-reply@example.com");
    }

    #[test]
    fn test_sender_address_parse_invalid_email() {
        let sender = SenderAddress::parse("invalid-email".to_string());
        assert!(sender.is_err());
    }
}

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};

use super::{DeliveryStatus, MailError, MailGateway, OutboundEmail};

/// Posts each message as JSON to an HTTP mail relay.
#[derive(Clone)]
pub struct HttpMailGateway {
    http: Client,
    endpoint: String,
    api_token: Option<SecretString>,
}

impl std::fmt::Debug for HttpMailGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpMailGateway")
            .field("endpoint", &self.endpoint)
            .field("api_token", &self.api_token.as_ref().map(|_| "<secret>"))
            .finish()
    }
}

impl HttpMailGateway {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

    pub fn new(endpoint: &str, api_token: Option<SecretString>) -> Result<Self, MailError> {
        let http = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .user_agent(concat!("taskboard-mailer/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MailError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
            api_token,
        })
    }
}

#[async_trait]
impl MailGateway for HttpMailGateway {
    async fn send(&self, email: &OutboundEmail) -> Result<DeliveryStatus, MailError> {
        if !email.to.contains('@') {
            return Err(MailError::InvalidRecipient(email.to.clone()));
        }

        let mut request = self.http.post(&self.endpoint).json(email);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!(to = %email.to, subject = %email.subject, "Email sent");
        Ok(DeliveryStatus::Sent)
    }
}

#[cfg(test)]
mod tests {
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_partial_json, header, method, path},
    };

    use super::*;

    fn email(to: &str) -> OutboundEmail {
        OutboundEmail {
            from: "noreply@openflow.world".to_string(),
            to: to.to_string(),
            subject: "[OpenFlow] Task Updated".to_string(),
            text: "Title changed".to_string(),
            html: "<p>Title changed</p>".to_string(),
        }
    }

    #[tokio::test]
    async fn test_posts_json_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .and(header("authorization", "Bearer relay-token"))
            .and(body_partial_json(serde_json::json!({
                "to": "bob@example.com",
                "subject": "[OpenFlow] Task Updated",
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let gateway = HttpMailGateway::new(
            &format!("{}/send", server.uri()),
            Some(SecretString::from("relay-token".to_string())),
        )
        .unwrap();

        let status = gateway.send(&email("bob@example.com")).await.unwrap();
        assert_eq!(status, DeliveryStatus::Sent);
    }

    #[tokio::test]
    async fn test_error_status_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("relay down"))
            .mount(&server)
            .await;

        let gateway = HttpMailGateway::new(&server.uri(), None).unwrap();
        let err = gateway.send(&email("bob@example.com")).await.unwrap_err();
        match err {
            MailError::Rejected { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "relay down");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_recipient_is_not_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let gateway = HttpMailGateway::new(&server.uri(), None).unwrap();
        let err = gateway.send(&email("not-an-address")).await.unwrap_err();
        assert!(matches!(err, MailError::InvalidRecipient(_)));
    }
}

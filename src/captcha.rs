//! Captcha verifier (C9): posts the opaque captcha response to a verification
//! endpoint and treats only `success=true` as passing. Fail-closed — any
//! transport error, non-2xx, or `success=false` surfaces as `CAPTCHA_FAILED`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

const VERIFY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct CaptchaVerifier {
    client: reqwest::Client,
    verify_url: String,
    secret_key: String,
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    secret: &'a str,
    response: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    remoteip: Option<&'a str>,
}

#[derive(Deserialize)]
struct VerifyResponse {
    success: bool,
}

impl CaptchaVerifier {
    /// `verify_url` is the captcha provider's verification endpoint; the
    /// caller reads it from configuration (none is shipped here since it's
    /// deployment-specific, unlike the `secret_key` the provider issues).
    pub fn new(verify_url: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(VERIFY_TIMEOUT)
                .build()
                .expect("captcha http client config is always valid"),
            verify_url: verify_url.into(),
            secret_key: secret_key.into(),
        }
    }

    pub async fn verify(&self, captcha_token: &str, client_ip: Option<&str>) -> Result<(), AppError> {
        let body = VerifyRequest {
            secret: &self.secret_key,
            response: captcha_token,
            remoteip: client_ip,
        };

        let response = self
            .client
            .post(&self.verify_url)
            .form(&body)
            .send()
            .await
            .map_err(|_| AppError::captcha_failed("captcha verifier unreachable"))?;

        if !response.status().is_success() {
            return Err(AppError::captcha_failed("captcha verifier rejected the request"));
        }

        let parsed: VerifyResponse = response
            .json()
            .await
            .map_err(|_| AppError::captcha_failed("captcha verifier returned a malformed response"))?;

        if parsed.success {
            Ok(())
        } else {
            Err(AppError::captcha_failed("captcha challenge was not solved"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn accepted_token_passes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"success": true})))
            .mount(&server)
            .await;

        let verifier = CaptchaVerifier::new(format!("{}/verify", server.uri()), "secret");
        assert!(verifier.verify("good-token", None).await.is_ok());
    }

    #[tokio::test]
    async fn rejected_token_surfaces_captcha_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"success": false})))
            .mount(&server)
            .await;

        let verifier = CaptchaVerifier::new(format!("{}/verify", server.uri()), "secret");
        let err = verifier.verify("bad-token", None).await.unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::CaptchaFailed);
    }

    #[tokio::test]
    async fn verifier_outage_is_fail_closed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let verifier = CaptchaVerifier::new(format!("{}/verify", server.uri()), "secret");
        let err = verifier.verify("any-token", None).await.unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::CaptchaFailed);
    }
}

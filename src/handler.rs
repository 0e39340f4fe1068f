// Request pipeline: headers -> verified token -> tenant id -> scoped session
// -> data query -> structured response. Every failure is absorbed into a 500
// with a constant message; exception text never reaches the response body.
use std::collections::HashMap;

use log::{error, info};
use nanoid::nanoid;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::data::TenantDataSource;
use crate::error::AuthError;
use crate::jwks::JwksCache;
use crate::session::StsService;
use crate::verifier::process_token;

static MSG_MISSING_HEADERS: &str = "Missing headers";
static MSG_INVALID_TOKEN: &str = "Invalid token";
static MSG_MISSING_TENANT: &str = "No tenant_id attribute found in claims";
static MSG_DATA_ERROR: &str = "Unable to retrieve tenant data";
static MSG_SUCCESS: &str = "Success";

/// HTTP-proxy style inbound event. `headers` stays optional so an event with
/// no headers section at all is distinguishable from empty headers.
#[derive(Serialize, Deserialize, Debug)]
pub struct TenantDataRequest {
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default)]
    pub body: Option<String>,
}

/// The `{statusCode, body}` contract API Gateway proxy integration expects.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TenantDataResponse {
    pub status_code: u16,
    pub body: String,
}

pub struct HandlerConfig {
    pub access_role_arn: String,
    pub session_duration_sec: i32,
}

fn respond(status_code: u16, message: &str) -> TenantDataResponse {
    TenantDataResponse {
        status_code,
        body: json!({ "message": message }).to_string(),
    }
}

pub async fn handle_request(
    config: &HandlerConfig,
    jwks: &JwksCache,
    sts_service: &dyn StsService,
    data_source: &dyn TenantDataSource,
    event: TenantDataRequest,
) -> TenantDataResponse {
    let headers = match event.headers {
        Some(headers) => headers,
        None => {
            error!("{}", AuthError::MissingHeaders);
            return respond(500, MSG_MISSING_HEADERS);
        }
    };

    let (_token, claims) = match process_token(&headers, jwks).await {
        Ok(verified) => verified,
        Err(e) => {
            error!("Token validation failed: {}", e);
            return respond(500, MSG_INVALID_TOKEN);
        }
    };

    let tenant_id = match claims.tenant_id.as_deref().filter(|t| !t.is_empty()) {
        Some(tenant_id) => tenant_id.to_string(),
        None => {
            error!("{}", AuthError::MissingTenantClaim);
            return respond(500, MSG_MISSING_TENANT);
        }
    };
    info!("Fetching data for tenant {}", tenant_id);

    let session_name = format!("tenant-session-{}", nanoid!(10));
    let session = match sts_service
        .create_temp_tenant_session(
            &config.access_role_arn,
            &session_name,
            &tenant_id,
            config.session_duration_sec,
        )
        .await
    {
        Ok(session) => session,
        Err(e) => {
            error!("Error assuming tenant session: {}", e);
            return respond(500, MSG_DATA_ERROR);
        }
    };

    if let Err(e) = data_source.query_tenant_data(&session, &tenant_id).await {
        error!("Tenant data query failed: {}", e);
        return respond(500, MSG_DATA_ERROR);
    }

    respond(200, MSG_SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::TestDataSource;
    use crate::session::TestStsClient;
    use crate::test_support::{now_epoch, sign_token, test_cache, TEST_ISSUER, TEST_KID};
    use spectral::prelude::*;

    fn test_config() -> HandlerConfig {
        HandlerConfig {
            access_role_arn: "arn:aws:iam::123456789012:role/tenant-data-access".to_string(),
            session_duration_sec: 900,
        }
    }

    fn event_with_authorization(value: &str) -> TenantDataRequest {
        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), value.to_string());
        TenantDataRequest {
            headers: Some(headers),
            body: Some("{}".to_string()),
        }
    }

    fn body_message(response: &TenantDataResponse) -> String {
        let body: serde_json::Value = serde_json::from_str(&response.body).unwrap();
        body["message"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_handle_request_where_token_is_valid_returns_success() {
        let token = sign_token(
            &serde_json::json!({
                "iss": TEST_ISSUER,
                "exp": now_epoch() + 3600,
                "custom:tenant_id": "tenant-a",
            }),
            TEST_KID,
        );
        let cache = test_cache();
        let sts = TestStsClient::default();
        let data = TestDataSource::default();

        let response = handle_request(
            &test_config(),
            &cache,
            &sts,
            &data,
            event_with_authorization(&format!("Bearer {}", token)),
        )
        .await;

        assert_that!(response.status_code).is_equal_to(200);
        assert_that!(body_message(&response)).is_equal_to(MSG_SUCCESS.to_string());
    }

    #[tokio::test]
    async fn test_handle_request_where_headers_are_absent_returns_missing_headers() {
        let cache = test_cache();
        let sts = TestStsClient::default();
        let data = TestDataSource::default();
        let event = TenantDataRequest {
            headers: None,
            body: None,
        };

        let response = handle_request(&test_config(), &cache, &sts, &data, event).await;

        assert_that!(response.status_code).is_equal_to(500);
        assert_that!(body_message(&response)).is_equal_to(MSG_MISSING_HEADERS.to_string());
    }

    #[tokio::test]
    async fn test_handle_request_where_token_is_expired_returns_invalid_token() {
        let token = sign_token(
            &serde_json::json!({
                "iss": TEST_ISSUER,
                "exp": now_epoch() - 60,
                "custom:tenant_id": "tenant-a",
            }),
            TEST_KID,
        );
        let cache = test_cache();
        let sts = TestStsClient::default();
        let data = TestDataSource::default();
        // Lowercase header key must be honored too.
        let mut headers = HashMap::new();
        headers.insert("authorization".to_string(), format!("Bearer {}", token));
        let event = TenantDataRequest {
            headers: Some(headers),
            body: None,
        };

        let response = handle_request(&test_config(), &cache, &sts, &data, event).await;

        assert_that!(response.status_code).is_equal_to(500);
        assert_that!(body_message(&response)).is_equal_to(MSG_INVALID_TOKEN.to_string());
        assert_that!(sts.brokered_tenant_tags.lock().len()).is_equal_to(0);
    }

    #[tokio::test]
    async fn test_handle_request_where_tenant_claim_is_missing_returns_distinct_message() {
        let token = sign_token(
            &serde_json::json!({ "iss": TEST_ISSUER, "exp": now_epoch() + 3600 }),
            TEST_KID,
        );
        let cache = test_cache();
        let sts = TestStsClient::default();
        let data = TestDataSource::default();

        let response = handle_request(
            &test_config(),
            &cache,
            &sts,
            &data,
            event_with_authorization(&format!("Bearer {}", token)),
        )
        .await;

        assert_that!(response.status_code).is_equal_to(500);
        assert_that!(body_message(&response)).is_equal_to(MSG_MISSING_TENANT.to_string());
        assert_that!(sts.brokered_tenant_tags.lock().len()).is_equal_to(0);
    }

    #[tokio::test]
    async fn test_handle_request_where_tenant_claim_is_empty_returns_distinct_message() {
        let token = sign_token(
            &serde_json::json!({
                "iss": TEST_ISSUER,
                "exp": now_epoch() + 3600,
                "custom:tenant_id": "",
            }),
            TEST_KID,
        );
        let cache = test_cache();
        let sts = TestStsClient::default();
        let data = TestDataSource::default();

        let response = handle_request(
            &test_config(),
            &cache,
            &sts,
            &data,
            event_with_authorization(&format!("Bearer {}", token)),
        )
        .await;

        assert_that!(response.status_code).is_equal_to(500);
        assert_that!(body_message(&response)).is_equal_to(MSG_MISSING_TENANT.to_string());
    }

    #[tokio::test]
    async fn test_handle_request_where_token_is_valid_tags_session_with_claim_value() {
        let token = sign_token(
            &serde_json::json!({
                "iss": TEST_ISSUER,
                "exp": now_epoch() + 3600,
                "custom:tenant_id": "tenant-b",
            }),
            TEST_KID,
        );
        let cache = test_cache();
        let sts = TestStsClient::default();
        let data = TestDataSource::default();

        let response = handle_request(
            &test_config(),
            &cache,
            &sts,
            &data,
            event_with_authorization(&format!("Bearer {}", token)),
        )
        .await;

        assert_that!(response.status_code).is_equal_to(200);
        let tags = sts.brokered_tenant_tags.lock();
        assert_that!(tags.clone()).is_equal_to(vec!["tenant-b".to_string()]);
        // The data source must have been handed the brokered session.
        let sessions = data.queried_sessions.lock();
        assert_that!(sessions.len()).is_equal_to(1);
        assert_that!(sessions[0].access_key_id.clone()).is_equal_to("testkeyid".to_string());
    }

    #[tokio::test]
    async fn test_handle_request_where_assume_role_fails_returns_data_error() {
        struct FailingStsClient;

        #[async_trait::async_trait]
        impl crate::session::StsService for FailingStsClient {
            async fn create_temp_tenant_session(
                &self,
                _access_role_arn: &str,
                _session_name: &str,
                _tenant_id: &str,
                _duration_sec: i32,
            ) -> Result<crate::session::TenantSession, crate::error::AuthError> {
                Err(crate::error::AuthError::AssumeRole(
                    "trust policy rejected".to_string(),
                ))
            }
        }

        let token = sign_token(
            &serde_json::json!({
                "iss": TEST_ISSUER,
                "exp": now_epoch() + 3600,
                "custom:tenant_id": "tenant-a",
            }),
            TEST_KID,
        );
        let cache = test_cache();
        let data = TestDataSource::default();

        let response = handle_request(
            &test_config(),
            &cache,
            &FailingStsClient,
            &data,
            event_with_authorization(&format!("Bearer {}", token)),
        )
        .await;

        assert_that!(response.status_code).is_equal_to(500);
        assert_that!(body_message(&response)).is_equal_to(MSG_DATA_ERROR.to_string());
        assert_that!(data.queried_sessions.lock().len()).is_equal_to(0);
    }
}

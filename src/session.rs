// Wrapper service around the AWS STS Client to allow for unit testing.
//
// Every data-plane call made on behalf of a tenant must run under a session
// brokered here: the TenantID session tag on the assumed role is what IAM and
// Lake Formation key their isolation conditions on.
use async_trait::async_trait;
use aws_sdk_sts::types::Tag;
use aws_sdk_sts::Client;
use parking_lot::Mutex;

use crate::error::AuthError;

/// Session tag key the downstream IAM/Lake Formation policies condition on.
pub static TENANT_TAG_KEY: &str = "TenantID";

/// Temporary credentials scoped to one tenant. Created per request and
/// discarded after use, never persisted or shared across requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantSession {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
}

#[async_trait]
pub trait StsService: Send + Sync {
    async fn create_temp_tenant_session(
        &self,
        access_role_arn: &str,
        session_name: &str,
        tenant_id: &str,
        duration_sec: i32,
    ) -> Result<TenantSession, AuthError>;
}

pub struct StsClient {
    client: Client,
}

impl StsClient {
    pub fn new(client: Client) -> StsClient {
        StsClient { client }
    }
}

#[async_trait]
impl StsService for StsClient {
    async fn create_temp_tenant_session(
        &self,
        access_role_arn: &str,
        session_name: &str,
        tenant_id: &str,
        duration_sec: i32,
    ) -> Result<TenantSession, AuthError> {
        let tenant_tag = Tag::builder()
            .key(TENANT_TAG_KEY)
            .value(tenant_id)
            .build()
            .map_err(|e| AuthError::AssumeRole(format!("{:?}", e)))?;

        let assumed_role = self
            .client
            .assume_role()
            .role_arn(access_role_arn)
            .role_session_name(session_name)
            .duration_seconds(duration_sec)
            .tags(tenant_tag)
            .send()
            .await
            .map_err(|e| AuthError::AssumeRole(format!("{:?}", e)))?;

        let credentials = assumed_role.credentials.ok_or_else(|| {
            AuthError::AssumeRole("AssumeRole response contained no credentials".to_string())
        })?;

        Ok(TenantSession {
            access_key_id: credentials.access_key_id,
            secret_access_key: credentials.secret_access_key,
            session_token: credentials.session_token,
        })
    }
}

/// Test double returning fixed credentials; records the tenant tag value of
/// every brokered session so tests can assert it matches the verified claim.
#[derive(Default)]
pub struct TestStsClient {
    pub brokered_tenant_tags: Mutex<Vec<String>>,
}

#[async_trait]
impl StsService for TestStsClient {
    async fn create_temp_tenant_session(
        &self,
        _access_role_arn: &str,
        _session_name: &str,
        tenant_id: &str,
        _duration_sec: i32,
    ) -> Result<TenantSession, AuthError> {
        self.brokered_tenant_tags.lock().push(tenant_id.to_string());

        Ok(TenantSession {
            access_key_id: "testkeyid".to_string(),
            secret_access_key: "testaccesskey".to_string(),
            session_token: "testtoken".to_string(),
        })
    }
}

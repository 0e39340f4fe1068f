// Tenant-scoped data retrieval against Athena.
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_credential_types::Credentials;
use aws_sdk_athena::types::{QueryExecutionContext, ResultConfiguration};
use log::info;

use crate::error::AuthError;
use crate::session::TenantSession;

#[async_trait]
pub trait TenantDataSource: Send + Sync {
    /// Start the tenant's data query under the given session and return the
    /// query execution id.
    async fn query_tenant_data(
        &self,
        session: &TenantSession,
        tenant_id: &str,
    ) -> Result<String, AuthError>;
}

pub struct AthenaDataSource {
    shared_config: SdkConfig,
    database: String,
    table: String,
    output_location: String,
}

impl AthenaDataSource {
    pub fn new(
        shared_config: &SdkConfig,
        database: String,
        table: String,
        output_location: String,
    ) -> AthenaDataSource {
        AthenaDataSource {
            shared_config: shared_config.clone(),
            database,
            table,
            output_location,
        }
    }
}

#[async_trait]
impl TenantDataSource for AthenaDataSource {
    async fn query_tenant_data(
        &self,
        session: &TenantSession,
        tenant_id: &str,
    ) -> Result<String, AuthError> {
        // The Athena client is built from the tenant session's credentials
        // only, never the ambient Lambda role. Row access is scoped by the
        // TenantID session tag carried on these credentials.
        let credentials = Credentials::new(
            session.access_key_id.clone(),
            session.secret_access_key.clone(),
            Some(session.session_token.clone()),
            None,
            "tenant-session",
        );
        let config = aws_sdk_athena::config::Builder::from(&self.shared_config)
            .credentials_provider(credentials)
            .build();
        let client = aws_sdk_athena::Client::from_conf(config);

        let query = format!("SELECT * FROM \"{}\".\"{}\"", self.database, self.table);
        let started = client
            .start_query_execution()
            .query_string(query)
            .query_execution_context(
                QueryExecutionContext::builder()
                    .database(self.database.as_str())
                    .build(),
            )
            .result_configuration(
                ResultConfiguration::builder()
                    .output_location(self.output_location.as_str())
                    .build(),
            )
            .send()
            .await
            .map_err(|e| AuthError::DataQuery(format!("{:?}", e)))?;

        let query_execution_id = started.query_execution_id.unwrap_or_default();
        info!(
            "Started Athena query {} for tenant {}",
            query_execution_id, tenant_id
        );
        Ok(query_execution_id)
    }
}

/// Test double recording which sessions it was queried with.
#[derive(Default)]
pub struct TestDataSource {
    pub queried_sessions: parking_lot::Mutex<Vec<TenantSession>>,
}

#[async_trait]
impl TenantDataSource for TestDataSource {
    async fn query_tenant_data(
        &self,
        session: &TenantSession,
        _tenant_id: &str,
    ) -> Result<String, AuthError> {
        self.queried_sessions.lock().push(session.clone());
        Ok("test-query-execution-id".to_string())
    }
}

use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use log::{debug, info};
use serde_json::json;
use tenant_data_api::data::AthenaDataSource;
use tenant_data_api::handler::{
    handle_request, HandlerConfig, TenantDataRequest, TenantDataResponse,
};
use tenant_data_api::jwks;
use tenant_data_api::session::StsClient;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        // this needs to be set to false, otherwise ANSI color codes will
        // show up in a confusing manner in CloudWatch logs.
        .with_ansi(false)
        // disabling time is handy because CloudWatch will add the ingestion time.
        .without_time()
        .json()
        .init();

    info!("Init stuff should only happen once");

    let access_role_arn = std::env::var("TENANT_ACCESS_ROLE_ARN")
        .expect("A TENANT_ACCESS_ROLE_ARN must be set in this app's Lambda environment variables.");

    let athena_database = std::env::var("ATHENA_DATABASE")
        .expect("An ATHENA_DATABASE must be set in this app's Lambda environment variables.");

    let athena_table = std::env::var("ATHENA_TABLE")
        .expect("An ATHENA_TABLE must be set in this app's Lambda environment variables.");

    let athena_output_location = std::env::var("ATHENA_OUTPUT_LOCATION")
        .expect("An ATHENA_OUTPUT_LOCATION must be set in this app's Lambda environment variables.");

    let session_duration_sec = std::env::var("SESSION_DURATION_SEC")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(900);

    // Get AWS config
    let shared_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

    // STS Client Init
    let sts_client = aws_sdk_sts::Client::new(&shared_config);
    let sts_service = StsClient::new(sts_client);

    let data_source = AthenaDataSource::new(
        &shared_config,
        athena_database,
        athena_table,
        athena_output_location,
    );

    let config = HandlerConfig {
        access_role_arn,
        session_duration_sec,
    };

    run(service_fn(|event: LambdaEvent<TenantDataRequest>| {
        function_handler(&config, &sts_service, &data_source, event)
    }))
    .await?;
    Ok(())
}

async fn function_handler(
    config: &HandlerConfig,
    sts_service: &StsClient,
    data_source: &AthenaDataSource,
    event: LambdaEvent<TenantDataRequest>,
) -> Result<TenantDataResponse, Error> {
    debug!("Event: {}", json!(event.payload));
    Ok(handle_request(config, jwks::global(), sts_service, data_source, event.payload).await)
}

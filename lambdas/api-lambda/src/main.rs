use aws_sdk_dynamodb::Client as DynamoClient;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_sesv2::Client as SesClient;
use lambda_http::{run, service_fn, tracing, Error, Request};
use rakshak_shared::auth::{HttpKeySource, TokenVerifier};
use rakshak_shared::config::{Config, StoreBackend};
use rakshak_shared::email::SesMailer;
use rakshak_shared::s3::S3EvidenceStore;
use rakshak_shared::store::{DocumentStore, DynamoStore, MemoryStore};
use rakshak_shared::AppState;
use std::sync::Arc;

mod http_handler;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing::init_default_subscriber();

    let config = Config::from_env()?;

    // Initialize AWS clients once at startup
    let aws_config = aws_config::load_from_env().await;

    let store: Arc<dyn DocumentStore> = match config.store_backend {
        StoreBackend::DynamoDb => Arc::new(DynamoStore::new(
            DynamoClient::new(&aws_config),
            config.table_name.clone(),
        )),
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory document store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };
    let mailer = Arc::new(SesMailer::new(
        SesClient::new(&aws_config),
        config.ses_sender_email.clone(),
    ));
    let evidence = Arc::new(S3EvidenceStore::new(
        S3Client::new(&aws_config),
        config.evidence_bucket.clone(),
    ));
    let verifier = TokenVerifier::from_config(
        &config,
        Arc::new(HttpKeySource::new(config.jwks_url())?),
    );

    tracing::info!(
        issuer = %config.issuer(),
        table = %config.table_name,
        backend = ?config.store_backend,
        "RAKSHAK API starting"
    );

    let state = AppState::new(config, store, mailer, evidence, verifier);

    run(service_fn(move |event: Request| {
        let state = Arc::clone(&state);
        async move { http_handler::function_handler(event, state).await }
    }))
    .await
}

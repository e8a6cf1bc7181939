//! Email Processor - Lambda entry point
//!
//! Invoked by a WorkMail inbound flow rule. Archives every attachment of
//! the message to `ATTACHMENT_BUCKET` and lets delivery continue.

use anyhow::Context;
use form_autofill::aws::default_sdk_config;
use form_autofill::email::{
    EmailEvent, EmailProcessor, FlowResponse, S3AttachmentStore, WorkMailMessageSource,
};
use lambda_runtime::{run, service_fn, LambdaEvent};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

async fn handler(
    processor: &EmailProcessor,
    event: LambdaEvent<EmailEvent>,
) -> Result<FlowResponse, lambda_runtime::Error> {
    let email = event.payload;
    tracing::info!(
        message_id = %email.message_id,
        flow_direction = email.flow_direction.as_deref().unwrap_or("unknown"),
        "Received mail flow event"
    );

    let today = chrono::Utc::now().date_naive();
    Ok(processor.handle(&email, today).await)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Lambda forwards stderr to CloudWatch; no ANSI colors there
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "form_autofill=info,email_processor=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .init();

    let bucket = std::env::var("ATTACHMENT_BUCKET").context("ATTACHMENT_BUCKET must be set")?;

    let sdk_config = default_sdk_config().await;
    let processor = EmailProcessor::new(
        Box::new(WorkMailMessageSource::new(&sdk_config)),
        Box::new(S3AttachmentStore::new(&sdk_config, bucket)),
    );
    let processor = &processor;

    run(service_fn(move |event: LambdaEvent<EmailEvent>| async move {
        handler(processor, event).await
    }))
    .await
    .map_err(|e| anyhow::anyhow!(e))
}

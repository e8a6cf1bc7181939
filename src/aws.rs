//! Shared AWS SDK configuration

use crate::config::AwsCredentials;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_rekognition::config::Credentials;

/// SDK config from explicit credentials, shared by every AWS client the
/// orchestrator builds.
pub async fn sdk_config(credentials: &AwsCredentials) -> SdkConfig {
    let provider = Credentials::new(
        credentials.access_key_id.clone(),
        credentials.secret_access_key.clone(),
        None,
        None,
        "form-autofill",
    );

    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(credentials.region.clone()))
        .credentials_provider(provider)
        .load()
        .await
}

/// SDK config from the default provider chain (Lambda execution role)
pub async fn default_sdk_config() -> SdkConfig {
    aws_config::load_defaults(BehaviorVersion::latest()).await
}

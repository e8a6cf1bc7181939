//! WorkMail message flow and S3 adapters

use super::{AttachmentStore, RawMessageSource};
use crate::error::{Error, Result};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use std::collections::BTreeMap;

/// Reads raw MIME content of in-flight WorkMail messages
pub struct WorkMailMessageSource {
    client: aws_sdk_workmailmessageflow::Client,
}

impl WorkMailMessageSource {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            client: aws_sdk_workmailmessageflow::Client::new(sdk_config),
        }
    }
}

#[async_trait]
impl RawMessageSource for WorkMailMessageSource {
    async fn fetch_raw(&self, message_id: &str) -> Result<Vec<u8>> {
        let output = self
            .client
            .get_raw_message_content()
            .message_id(message_id)
            .send()
            .await
            .map_err(|e| Error::Storage {
                reason: format!(
                    "Failed to fetch message {}: {}",
                    message_id,
                    aws_sdk_workmailmessageflow::error::DisplayErrorContext(&e)
                ),
            })?;

        let content = output
            .message_content
            .collect()
            .await
            .map_err(|e| Error::Storage {
                reason: format!("Failed to read message {}: {}", message_id, e),
            })?;

        Ok(content.into_bytes().to_vec())
    }
}

/// Writes attachments to an S3 bucket
pub struct S3AttachmentStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3AttachmentStore {
    pub fn new(sdk_config: &SdkConfig, bucket: impl Into<String>) -> Self {
        Self {
            client: aws_sdk_s3::Client::new(sdk_config),
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl AttachmentStore for S3AttachmentStore {
    async fn put(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<()> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data));
        for (name, value) in metadata {
            request = request.metadata(name, value);
        }

        request.send().await.map_err(|e| Error::Storage {
            reason: format!(
                "Failed to upload s3://{}/{}: {}",
                self.bucket,
                key,
                DisplayErrorContext(&e)
            ),
        })?;

        Ok(())
    }
}

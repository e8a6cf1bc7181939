//! Environment-driven configuration
//!
//! Every setting has a default except credentials. Values are read once at
//! startup through [`AppConfig::from_env`]; tests use [`AppConfig::from_lookup`].

use crate::error::{Error, Result};
use crate::llm::JsonExtraction;
use std::collections::HashMap;
use std::path::PathBuf;

pub const DEFAULT_FORM_PATH: &str = "docs/alta_autonomos.pdf";
pub const DEFAULT_PIC_PATH: &str = "docs/dni.jpg";
pub const DEFAULT_OUTPUT_PATH: &str = "docs/filled_form.pdf";
pub const DEFAULT_OCR_THRESHOLD: f32 = 0.5;
pub const DEFAULT_BEDROCK_MODEL_ID: &str = "anthropic.claude-3-5-sonnet-20240620-v1:0";
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_LLM_MODEL: &str = "llama-3.3-70b-versatile";
pub const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Which OCR variant to construct
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrBackendKind {
    /// AWS Rekognition text detection
    Rekognition,
    /// Local `tesseract` binary
    Tesseract,
    /// Local ONNX text detection + recognition models
    Onnx,
}

impl std::str::FromStr for OcrBackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "rekognition" | "aws" => Ok(Self::Rekognition),
            "tesseract" => Ok(Self::Tesseract),
            "onnx" | "local" => Ok(Self::Onnx),
            other => Err(Error::InvalidConfig {
                reason: format!("unknown OCR_BACKEND '{}'", other),
            }),
        }
    }
}

/// Which model backend to construct
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackendKind {
    /// AWS Bedrock, Anthropic messages envelope
    Bedrock,
    /// Any OpenAI-compatible chat completions endpoint (Groq by default)
    OpenAi,
}

impl std::str::FromStr for LlmBackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "bedrock" => Ok(Self::Bedrock),
            "openai" | "groq" => Ok(Self::OpenAi),
            other => Err(Error::InvalidConfig {
                reason: format!("unknown LLM_BACKEND '{}'", other),
            }),
        }
    }
}

/// AWS access key pair and region
#[derive(Debug, Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
}

/// Model files for the ONNX OCR backend
#[derive(Debug, Clone, Default)]
pub struct OnnxModelPaths {
    pub detection_model: Option<PathBuf>,
    pub recognition_model: Option<PathBuf>,
    pub char_dict: Option<PathBuf>,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Input PDF form
    pub form_path: PathBuf,
    /// Photographed ID document
    pub image_path: PathBuf,
    /// Where the filled form is written
    pub output_path: PathBuf,
    /// Password for encrypted forms
    pub pdf_password: Option<String>,
    pub ocr_backend: OcrBackendKind,
    /// Detections at or below this confidence (0-1) are dropped
    pub ocr_threshold: f32,
    /// Tesseract language code
    pub ocr_language: String,
    pub onnx_models: OnnxModelPaths,
    pub llm_backend: LlmBackendKind,
    pub bedrock_model_id: String,
    pub llm_max_tokens: u32,
    /// Bearer token for the OpenAI-compatible backend
    pub api_key: Option<String>,
    pub llm_base_url: String,
    pub llm_model: String,
    /// Send the ID image inline with the prompt
    pub attach_image: bool,
    pub json_extraction: JsonExtraction,
    /// Static facts appended to the prompt, in declaration order
    pub context: Vec<(String, String)>,
    /// Append today's date to the prompt context
    pub context_date: bool,
    /// S3 bucket for archived email attachments
    pub attachment_bucket: Option<String>,
    aws_access_key_id: Option<String>,
    aws_secret_access_key: Option<String>,
    aws_region: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            form_path: PathBuf::from(DEFAULT_FORM_PATH),
            image_path: PathBuf::from(DEFAULT_PIC_PATH),
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            pdf_password: None,
            ocr_backend: OcrBackendKind::Rekognition,
            ocr_threshold: DEFAULT_OCR_THRESHOLD,
            ocr_language: "eng".to_string(),
            onnx_models: OnnxModelPaths::default(),
            llm_backend: LlmBackendKind::Bedrock,
            bedrock_model_id: DEFAULT_BEDROCK_MODEL_ID.to_string(),
            llm_max_tokens: DEFAULT_MAX_TOKENS,
            api_key: None,
            llm_base_url: DEFAULT_LLM_BASE_URL.to_string(),
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            attach_image: false,
            json_extraction: JsonExtraction::default(),
            context: Vec::new(),
            context_date: false,
            attachment_bucket: None,
            aws_access_key_id: None,
            aws_secret_access_key: None,
            aws_region: None,
        }
    }
}

impl AppConfig {
    /// Build configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&std::env::vars().collect())
    }

    /// Build configuration from a provided map (useful for testing).
    pub fn from_lookup(env: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| {
            env.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::default();

        if let Some(v) = get("FORM_PATH") {
            config.form_path = PathBuf::from(v);
        }
        if let Some(v) = get("PIC_PATH") {
            config.image_path = PathBuf::from(v);
        }
        if let Some(v) = get("OUTPUT_PATH") {
            config.output_path = PathBuf::from(v);
        }
        config.pdf_password = get("PDF_PASSWORD");

        if let Some(v) = get("OCR_BACKEND") {
            config.ocr_backend = v.parse()?;
        }
        if let Some(v) = get("OCR_THRESHOLD") {
            config.ocr_threshold = parse_threshold(&v)?;
        }
        if let Some(v) = get("OCR_LANGUAGE") {
            config.ocr_language = v;
        }
        config.onnx_models = OnnxModelPaths {
            detection_model: get("ONNX_DET_MODEL").map(PathBuf::from),
            recognition_model: get("ONNX_REC_MODEL").map(PathBuf::from),
            char_dict: get("ONNX_CHAR_DICT").map(PathBuf::from),
        };

        if let Some(v) = get("LLM_BACKEND") {
            config.llm_backend = v.parse()?;
        }
        if let Some(v) = get("BEDROCK_MODEL_ID") {
            config.bedrock_model_id = v;
        }
        if let Some(v) = get("LLM_MAX_TOKENS") {
            config.llm_max_tokens = v.parse().map_err(|_| Error::InvalidConfig {
                reason: format!("LLM_MAX_TOKENS must be a positive integer, got '{}'", v),
            })?;
        }
        config.api_key = get("API_KEY");
        if let Some(v) = get("LLM_BASE_URL") {
            config.llm_base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = get("LLM_MODEL") {
            config.llm_model = v;
        }
        if let Some(v) = get("LLM_ATTACH_IMAGE") {
            config.attach_image = parse_bool("LLM_ATTACH_IMAGE", &v)?;
        }
        if let Some(v) = get("JSON_EXTRACTION") {
            config.json_extraction = v.parse()?;
        }
        if let Some(v) = get("FORM_CONTEXT") {
            config.context = parse_context(&v)?;
        }
        if let Some(v) = get("FORM_CONTEXT_DATE") {
            config.context_date = parse_bool("FORM_CONTEXT_DATE", &v)?;
        }

        config.attachment_bucket = get("ATTACHMENT_BUCKET");
        config.aws_access_key_id = get("AWS_ACCESS_KEY_ID");
        config.aws_secret_access_key = get("AWS_SECRET_ACCESS_KEY");
        config.aws_region = get("AWS_REGION");

        Ok(config)
    }

    /// Whether any configured backend talks to AWS.
    pub fn needs_aws(&self) -> bool {
        self.ocr_backend == OcrBackendKind::Rekognition
            || self.llm_backend == LlmBackendKind::Bedrock
    }

    /// AWS credentials, or `MissingCredentials` naming every absent variable.
    pub fn aws_credentials(&self) -> Result<AwsCredentials> {
        let mut missing = Vec::new();
        if self.aws_access_key_id.is_none() {
            missing.push("AWS_ACCESS_KEY_ID".to_string());
        }
        if self.aws_secret_access_key.is_none() {
            missing.push("AWS_SECRET_ACCESS_KEY".to_string());
        }
        if self.aws_region.is_none() {
            missing.push("AWS_REGION".to_string());
        }

        match (
            &self.aws_access_key_id,
            &self.aws_secret_access_key,
            &self.aws_region,
        ) {
            (Some(key), Some(secret), Some(region)) => Ok(AwsCredentials {
                access_key_id: key.clone(),
                secret_access_key: secret.clone(),
                region: region.clone(),
            }),
            _ => Err(Error::MissingCredentials { missing }),
        }
    }

    /// The API key for the OpenAI-compatible backend.
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| Error::MissingCredentials {
                missing: vec!["API_KEY".to_string()],
            })
    }

    /// Check that every credential the selected backends need is present.
    pub fn validate_credentials(&self) -> Result<()> {
        if self.needs_aws() {
            self.aws_credentials()?;
        }
        if self.llm_backend == LlmBackendKind::OpenAi {
            self.require_api_key()?;
        }
        Ok(())
    }
}

fn parse_threshold(value: &str) -> Result<f32> {
    let threshold: f32 = value.parse().map_err(|_| Error::InvalidConfig {
        reason: format!("OCR_THRESHOLD must be a number, got '{}'", value),
    })?;
    if !(0.0..=1.0).contains(&threshold) {
        return Err(Error::InvalidConfig {
            reason: format!("OCR_THRESHOLD must be within 0-1, got {}", threshold),
        });
    }
    Ok(threshold)
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::InvalidConfig {
            reason: format!("{} must be a boolean, got '{}'", name, value),
        }),
    }
}

/// Parse `key=value;key=value` into ordered pairs.
fn parse_context(value: &str) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    for entry in value.split(';') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (key, val) = entry.split_once('=').ok_or_else(|| Error::InvalidConfig {
            reason: format!("FORM_CONTEXT entry '{}' is not key=value", entry),
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::InvalidConfig {
                reason: format!("FORM_CONTEXT entry '{}' has an empty key", entry),
            });
        }
        pairs.push((key.to_string(), val.trim().to_string()));
    }
    Ok(pairs)
}

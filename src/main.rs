//! Form Autofill - Entry point
//!
//! Reads a PDF form and an ID photo, asks a language model to fill the
//! form fields from the OCR text and writes the filled form.

use anyhow::Context;
use form_autofill::config::{AppConfig, LlmBackendKind, OcrBackendKind};
use form_autofill::llm::{BedrockBackend, LanguageModel, OpenAiCompatibleBackend};
use form_autofill::ocr::{RekognitionRecognizer, TesseractRecognizer, TextRecognizer};
use form_autofill::pipeline::today_context;
use form_autofill::{FormDocument, FormFillPipeline, ImageTextExtractor, LanguageModelClient};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

async fn build_recognizer(config: &AppConfig) -> form_autofill::Result<Box<dyn TextRecognizer>> {
    match config.ocr_backend {
        OcrBackendKind::Rekognition => {
            let credentials = config.aws_credentials()?;
            Ok(Box::new(
                RekognitionRecognizer::from_credentials(&credentials, config.ocr_threshold).await,
            ))
        }
        OcrBackendKind::Tesseract => {
            let recognizer = TesseractRecognizer::new(config.ocr_language.clone());
            if !recognizer.is_available() {
                tracing::warn!("tesseract binary not found on PATH");
            }
            Ok(Box::new(recognizer))
        }
        #[cfg(feature = "onnx-ocr")]
        OcrBackendKind::Onnx => Ok(Box::new(form_autofill::ocr::OnnxRecognizer::new(
            &config.onnx_models,
            config.ocr_threshold,
        )?)),
        #[cfg(not(feature = "onnx-ocr"))]
        OcrBackendKind::Onnx => Err(form_autofill::Error::InvalidConfig {
            reason: "the onnx OCR backend requires building with --features onnx-ocr".to_string(),
        }),
    }
}

async fn build_model(config: &AppConfig) -> form_autofill::Result<Box<dyn LanguageModel>> {
    match config.llm_backend {
        LlmBackendKind::Bedrock => {
            let credentials = config.aws_credentials()?;
            Ok(Box::new(
                BedrockBackend::from_credentials(
                    &credentials,
                    config.bedrock_model_id.clone(),
                    config.llm_max_tokens,
                )
                .await,
            ))
        }
        LlmBackendKind::OpenAi => Ok(Box::new(
            OpenAiCompatibleBackend::new(
                config.require_api_key()?,
                config.llm_model.clone(),
                config.llm_max_tokens,
            )
            .with_base_url(config.llm_base_url.clone()),
        )),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "form_autofill=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = AppConfig::from_env().context("Invalid configuration")?;
    config.validate_credentials()?;
    if !form_autofill::pdf::is_pdfium_available() {
        anyhow::bail!("PDFium library not found next to the binary or in /opt/pdfium/lib");
    }

    tracing::info!(
        form = %config.form_path.display(),
        image = %config.image_path.display(),
        ocr = ?config.ocr_backend,
        llm = ?config.llm_backend,
        "Starting form autofill"
    );

    let mut form = FormDocument::open(&config.form_path, config.pdf_password.as_deref())
        .with_context(|| format!("Failed to open form {}", config.form_path.display()))?;
    let mut extractor = ImageTextExtractor::new(build_recognizer(&config).await?);
    let client = LanguageModelClient::new(build_model(&config).await?)
        .with_extraction(config.json_extraction);

    let mut context = config.context.clone();
    if config.context_date {
        context.push(today_context());
    }

    let result = FormFillPipeline::new(&mut form, &mut extractor, &client)
        .with_context(context)
        .with_attached_image(config.attach_image)
        .run(&config.image_path, &config.output_path)
        .await;

    let report = match result {
        Ok(report) => report,
        Err(e) if e.is_response_error() => {
            tracing::error!(
                extraction = ?client.extraction(),
                "The model reply could not be turned into field values"
            );
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    let output = std::fs::canonicalize(&report.output_path)
        .unwrap_or_else(|_| report.output_path.clone());
    println!("Successfully saved filled form to:\n{}", output.display());

    Ok(())
}

//! End-to-end form fill: fields -> OCR -> prompt -> model -> write -> save

use crate::error::Result;
use crate::llm::{ImageAttachment, LanguageModelClient, ModelRequest};
use crate::ocr::ImageTextExtractor;
use crate::pdf::{FillReport, FormFields};
use crate::prompt::PromptBuilder;
use std::path::{Path, PathBuf};

/// Context key used for the processing date
pub const DATE_CONTEXT_KEY: &str = "date";

/// Today's date in DD/MM/YYYY
pub fn today_context() -> (String, String) {
    (
        DATE_CONTEXT_KEY.to_string(),
        chrono::Local::now().format("%d/%m/%Y").to_string(),
    )
}

/// Summary of a completed run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Field names offered to the model
    pub fields: Vec<String>,
    /// Length of the OCR text
    pub extracted_chars: usize,
    pub fill: FillReport,
    pub output_path: PathBuf,
}

/// Sequences one form fill over injected collaborators
pub struct FormFillPipeline<'a> {
    form: &'a mut dyn FormFields,
    extractor: &'a mut ImageTextExtractor,
    model: &'a LanguageModelClient,
    context: Vec<(String, String)>,
    attach_image: bool,
}

impl<'a> FormFillPipeline<'a> {
    pub fn new(
        form: &'a mut dyn FormFields,
        extractor: &'a mut ImageTextExtractor,
        model: &'a LanguageModelClient,
    ) -> Self {
        Self {
            form,
            extractor,
            model,
            context: Vec::new(),
            attach_image: false,
        }
    }

    /// Static facts appended to the prompt
    pub fn with_context(mut self, context: Vec<(String, String)>) -> Self {
        self.context = context;
        self
    }

    /// Send the ID image along with the prompt
    pub fn with_attached_image(mut self, attach: bool) -> Self {
        self.attach_image = attach;
        self
    }

    pub async fn run(&mut self, image_path: &Path, output_path: &Path) -> Result<RunReport> {
        let fields = self.form.get_fields_to_fill()?;
        tracing::info!(count = fields.len(), "Form fields loaded");

        let extracted_text = self.extractor.process_image(image_path).await?;
        tracing::info!(
            backend = self.extractor.recognizer_name(),
            chars = extracted_text.len(),
            "Text extracted from image"
        );

        let prompt = PromptBuilder::new(&fields, extracted_text.as_str())
            .with_contexts(self.context.iter().cloned())
            .build();

        let mut request = ModelRequest::text(prompt);
        if self.attach_image {
            if let Some(image) = self.extractor.image() {
                request = request.with_image(ImageAttachment::from_image(image)?);
            }
        }

        let values = self.model.send_request(&request).await?;
        tracing::info!(count = values.len(), "Field values received");

        let fill = self.form.set_fields_to_fill(&values)?;
        for failure in fill.failures() {
            tracing::warn!(field = %failure.name, status = ?failure.status, "Field not written");
        }
        if !fill.unmatched.is_empty() {
            tracing::warn!(keys = ?fill.unmatched, "Model returned keys with no matching field");
        }

        self.form.save(output_path)?;
        tracing::info!(path = %output_path.display(), filled = fill.filled_count(), "Form saved");

        Ok(RunReport {
            fields,
            extracted_chars: extracted_text.len(),
            fill,
            output_path: output_path.to_path_buf(),
        })
    }
}

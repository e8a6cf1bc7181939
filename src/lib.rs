//! Form Autofill Library
//!
//! Fills PDF government forms from a photographed ID document:
//! - `pdf`: list and write interactive form fields
//! - `ocr`: extract text from the ID image (Rekognition, tesseract, ONNX)
//! - `llm`: ask a language model to map the text onto the field names
//! - `pipeline`: run the whole flow end to end
//! - `email`: archive inbound email attachments to object storage

pub mod aws;
pub mod config;
pub mod email;
pub mod error;
pub mod fields;
pub mod llm;
pub mod ocr;
pub mod pdf;
pub mod pipeline;
pub mod prompt;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use fields::FieldValueMap;
pub use llm::{JsonExtraction, LanguageModel, LanguageModelClient};
pub use ocr::{ImageTextExtractor, TextRecognizer};
pub use pdf::{FormDocument, FormFields};
pub use pipeline::{FormFillPipeline, RunReport};
pub use prompt::PromptBuilder;

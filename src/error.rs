//! Error types for form autofill

use thiserror::Error;

/// Result type alias for form autofill
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for form autofill
#[derive(Error, Debug)]
pub enum Error {
    /// PDF file not found
    #[error("PDF not found: {path}")]
    PdfNotFound { path: String },

    /// Invalid PDF file
    #[error("Invalid PDF file: {reason}")]
    InvalidPdf { reason: String },

    /// PDF is password protected and no password was provided
    #[error("PDF is password protected")]
    PasswordRequired,

    /// PDFium error
    #[error("PDFium error: {reason}")]
    Pdfium { reason: String },

    /// Required credentials are not configured
    #[error("Missing credentials: please provide {}", missing.join(", "))]
    MissingCredentials { missing: Vec<String> },

    /// A configuration value could not be used
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Recognition was requested before any image was loaded
    #[error("Image not loaded. Call load_image() first.")]
    ImageNotLoaded,

    /// Image decoding or encoding error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// OCR backend failure
    #[error("OCR failed: {reason}")]
    Ocr { reason: String },

    /// The model backend returned nothing
    #[error("Empty response from LLM")]
    EmptyModelResponse,

    /// No brace-delimited span in the model output
    #[error("Could not extract JSON from the response")]
    JsonNotFound,

    /// The extracted span is not a JSON object
    #[error("JSON decoding failed: {reason}")]
    MalformedJson { reason: String },

    /// The extracted object has no entries
    #[error("Empty JSON content after parsing")]
    EmptyJson,

    /// Model backend failure
    #[error("LLM call failed: {reason}")]
    Llm { reason: String },

    /// Email parsing failure
    #[error("Email processing failed: {reason}")]
    Email { reason: String },

    /// Object storage or mail store failure
    #[error("Storage error: {reason}")]
    Storage { reason: String },

    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether the error comes from cleaning up or parsing model output,
    /// as opposed to reaching the model at all.
    pub fn is_response_error(&self) -> bool {
        matches!(
            self,
            Error::EmptyModelResponse
                | Error::JsonNotFound
                | Error::MalformedJson { .. }
                | Error::EmptyJson
        )
    }
}

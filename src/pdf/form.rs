//! Interactive form reading and writing via PDFium

use crate::error::{Error, Result};
use crate::fields::FieldValueMap;
use pdfium_render::prelude::*;
use std::collections::HashSet;
use std::io::Write;
use std::path::Path;

/// Bind PDFium (creates a new instance each time - PDFium is not thread-safe)
fn create_pdfium() -> Result<Pdfium> {
    // Try a library next to the binary, then the conventional install dir, then the system
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
                "/opt/pdfium/lib",
            ))
        })
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| Error::Pdfium {
            reason: format!("Failed to initialize PDFium: {}", e),
        })?;

    Ok(Pdfium::new(bindings))
}

/// Whether a PDFium library can be bound in this environment.
pub fn is_pdfium_available() -> bool {
    create_pdfium().is_ok()
}

fn map_pdfium_error(err: PdfiumError) -> Error {
    match err {
        PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError) => {
            Error::PasswordRequired
        }
        _ => Error::Pdfium {
            reason: format!("{}", err),
        },
    }
}

fn check_pdf_header(data: &[u8]) -> Result<()> {
    if data.len() < 4 || &data[0..4] != b"%PDF" {
        return Err(Error::InvalidPdf {
            reason: "Not a valid PDF file".to_string(),
        });
    }
    Ok(())
}

/// Kind of interactive form element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Checkbox,
    RadioButton,
    ComboBox,
    ListBox,
    PushButton,
    Signature,
    Unknown,
}

impl FieldKind {
    fn of(field: &PdfFormField) -> Self {
        if field.as_text_field().is_some() {
            Self::Text
        } else if field.as_checkbox_field().is_some() {
            Self::Checkbox
        } else if field.as_radio_button_field().is_some() {
            Self::RadioButton
        } else if field.as_combo_box_field().is_some() {
            Self::ComboBox
        } else if field.as_list_box_field().is_some() {
            Self::ListBox
        } else if field.as_push_button_field().is_some() {
            Self::PushButton
        } else if field.as_signature_field().is_some() {
            Self::Signature
        } else {
            Self::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Checkbox => "checkbox",
            Self::RadioButton => "radio_button",
            Self::ComboBox => "combo_box",
            Self::ListBox => "list_box",
            Self::PushButton => "push_button",
            Self::Signature => "signature",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One interactive form element as found on a page
#[derive(Debug, Clone)]
pub struct FormFieldInfo {
    /// Page number (1-indexed)
    pub page: u32,
    /// Field name
    pub name: Option<String>,
    pub kind: FieldKind,
    /// Current value (text fields only)
    pub value: Option<String>,
}

/// Outcome of writing one field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldStatus {
    Filled,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldOutcome {
    pub name: String,
    pub status: FieldStatus,
}

/// Per-field results of a fill operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FillReport {
    /// One entry per written field name, in document order
    pub outcomes: Vec<FieldOutcome>,
    /// Keys of the value map that matched no text field
    pub unmatched: Vec<String>,
}

impl FillReport {
    /// Record a write attempt. A field spread over several widgets is
    /// reported once; any failing widget marks the whole field failed.
    pub fn record(&mut self, name: &str, status: FieldStatus) {
        match self.outcomes.iter_mut().find(|o| o.name == name) {
            Some(existing) => {
                if existing.status == FieldStatus::Filled {
                    existing.status = status;
                }
            }
            None => self.outcomes.push(FieldOutcome {
                name: name.to_string(),
                status,
            }),
        }
    }

    /// Collect the keys that never produced an outcome.
    pub fn finish(&mut self, values: &FieldValueMap) {
        self.unmatched = values
            .keys()
            .filter(|key| !self.outcomes.iter().any(|o| &o.name == *key))
            .cloned()
            .collect();
    }

    pub fn filled_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == FieldStatus::Filled)
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &FieldOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, FieldStatus::Failed { .. }))
    }
}

/// Deduplicate names keeping the first occurrence.
pub fn unique_in_order<I>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    names
        .into_iter()
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

/// The three document operations the orchestrator needs
pub trait FormFields {
    /// Text-entry field names, unique, in first-seen order
    fn get_fields_to_fill(&mut self) -> Result<Vec<String>>;

    /// Write values into matching text fields
    fn set_fields_to_fill(&mut self, values: &FieldValueMap) -> Result<FillReport>;

    /// Persist the document
    fn save(&self, path: &Path) -> Result<()>;
}

/// A fillable PDF held in memory
pub struct FormDocument {
    data: Vec<u8>,
    password: Option<String>,
}

impl FormDocument {
    /// Open a PDF form from a file path
    pub fn open<P: AsRef<Path>>(path: P, password: Option<&str>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(Error::PdfNotFound {
                path: path.display().to_string(),
            });
        }

        let data = std::fs::read(path)?;
        Self::open_bytes(data, password)
    }

    /// Open a PDF form from bytes
    pub fn open_bytes(data: Vec<u8>, password: Option<&str>) -> Result<Self> {
        check_pdf_header(&data)?;

        Ok(Self {
            data,
            password: password.map(str::to_string),
        })
    }

    /// Every interactive form element on every page
    pub fn list_fields(&self) -> Result<Vec<FormFieldInfo>> {
        let pdfium = create_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(&self.data, self.password.as_deref())
            .map_err(map_pdfium_error)?;

        let mut fields = Vec::new();
        let pages = document.pages();

        for page_index in 0..pages.len() {
            let page = pages.get(page_index).map_err(|e| Error::Pdfium {
                reason: format!("Failed to get page {}: {}", page_index + 1, e),
            })?;

            for annotation in page.annotations().iter() {
                if let Some(field) = annotation.as_form_field() {
                    let kind = FieldKind::of(field);
                    let value = field.as_text_field().and_then(|t| t.value());
                    fields.push(FormFieldInfo {
                        page: page_index as u32 + 1,
                        name: field.name(),
                        kind,
                        value,
                    });
                }
            }
        }

        Ok(fields)
    }

    /// Current value of every text field (first widget wins)
    pub fn field_values(&self) -> Result<FieldValueMap> {
        let mut values = FieldValueMap::new();
        for field in self.list_fields()? {
            if field.kind != FieldKind::Text {
                continue;
            }
            if let Some(name) = field.name {
                values
                    .entry(name)
                    .or_insert_with(|| field.value.unwrap_or_default());
            }
        }
        Ok(values)
    }
}

impl FormFields for FormDocument {
    fn get_fields_to_fill(&mut self) -> Result<Vec<String>> {
        let names = self
            .list_fields()?
            .into_iter()
            .filter(|f| f.kind == FieldKind::Text)
            .filter_map(|f| f.name);

        let fields = unique_in_order(names);
        tracing::debug!(count = fields.len(), "Found text fields to fill");
        Ok(fields)
    }

    fn set_fields_to_fill(&mut self, values: &FieldValueMap) -> Result<FillReport> {
        let (output, report) = fill_text_fields(&self.data, self.password.as_deref(), values)?;
        self.data = output;
        Ok(report)
    }

    fn save(&self, path: &Path) -> Result<()> {
        write_atomically(path, &self.data)
    }
}

/// Fill text fields in PDF bytes and return the modified bytes
pub fn fill_text_fields(
    data: &[u8],
    password: Option<&str>,
    values: &FieldValueMap,
) -> Result<(Vec<u8>, FillReport)> {
    check_pdf_header(data)?;

    let pdfium = create_pdfium()?;
    let document = pdfium
        .load_pdf_from_byte_slice(data, password)
        .map_err(map_pdfium_error)?;

    let mut report = FillReport::default();
    let pages = document.pages();

    for page_index in 0..pages.len() {
        let page = pages.get(page_index).map_err(|e| Error::Pdfium {
            reason: format!("Failed to get page {}: {}", page_index + 1, e),
        })?;

        for mut annotation in page.annotations().iter() {
            let Some(field) = annotation.as_form_field_mut() else {
                continue;
            };
            let Some(field_name) = field.name() else {
                continue;
            };
            let Some(value) = values.get(&field_name) else {
                continue;
            };
            let Some(text_field) = field.as_text_field_mut() else {
                continue;
            };

            record_write(&mut report, &field_name, text_field.set_value(value));
        }
    }

    report.finish(values);

    let output = document.save_to_bytes().map_err(|e| Error::Pdfium {
        reason: format!("Failed to save modified PDF: {}", e),
    })?;

    // PDFium updates /V only; viewers must rebuild the widget appearances
    let output = match mark_need_appearances(&output) {
        Ok(marked) => marked,
        Err(e) => {
            tracing::warn!(error = %e, "Could not set NeedAppearances");
            output
        }
    };

    Ok((output, report))
}

/// Record the result of writing one widget; a failure is logged and the fill goes on.
fn record_write(
    report: &mut FillReport,
    field_name: &str,
    result: std::result::Result<(), PdfiumError>,
) {
    match result {
        Ok(()) => report.record(field_name, FieldStatus::Filled),
        Err(e) => {
            tracing::warn!(field = %field_name, error = %e, "Error updating field");
            report.record(
                field_name,
                FieldStatus::Failed {
                    reason: format!("Failed to set value: {}", e),
                },
            );
        }
    }
}

fn lopdf_error(err: lopdf::Error) -> Error {
    Error::InvalidPdf {
        reason: err.to_string(),
    }
}

/// Set `/NeedAppearances true` in the AcroForm dictionary so viewers
/// regenerate field appearances from the stored values. Documents without
/// an AcroForm are returned unchanged.
pub fn mark_need_appearances(data: &[u8]) -> Result<Vec<u8>> {
    let mut doc = lopdf::Document::load_mem(data).map_err(lopdf_error)?;
    let root_id = doc
        .trailer
        .get(b"Root")
        .and_then(lopdf::Object::as_reference)
        .map_err(lopdf_error)?;

    let root = doc.get_dictionary(root_id).map_err(lopdf_error)?;
    let acroform_ref = match root.get(b"AcroForm") {
        Ok(lopdf::Object::Reference(id)) => Some(*id),
        Ok(_) => None,
        Err(_) => return Ok(data.to_vec()),
    };

    let acroform = match acroform_ref {
        Some(id) => doc.get_object_mut(id).and_then(lopdf::Object::as_dict_mut),
        None => doc
            .get_object_mut(root_id)
            .and_then(lopdf::Object::as_dict_mut)
            .and_then(|root| root.get_mut(b"AcroForm"))
            .and_then(lopdf::Object::as_dict_mut),
    }
    .map_err(lopdf_error)?;
    acroform.set("NeedAppearances", true);

    let mut output = Vec::with_capacity(data.len());
    doc.save_to(&mut output).map_err(|e| Error::InvalidPdf {
        reason: format!("Failed to write PDF: {}", e),
    })?;
    Ok(output)
}

/// Write through a temp file in the destination directory, then rename.
pub fn write_atomically(path: &Path, data: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    if !parent.exists() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = tempfile::NamedTempFile::new_in(parent)?;
    file.write_all(data)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

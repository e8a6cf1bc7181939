//! Integration tests for Form Autofill

use async_trait::async_trait;
use form_autofill::fields::FieldValueMap;
use form_autofill::llm::{LanguageModel, LanguageModelClient, ModelRequest};
use form_autofill::ocr::{ImageTextExtractor, TextRecognizer};
use form_autofill::pdf::{FieldKind, FieldStatus, FormDocument, FormFields};
use form_autofill::pipeline::FormFillPipeline;
use form_autofill::{Error, Result};
use image::{GrayImage, Luma, RgbImage};
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};

/// Serialize numbered objects into a PDF with a valid xref table.
fn build_pdf(objects: &[&str]) -> Vec<u8> {
    let mut out = b"%PDF-1.7\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());

    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }

    let xref_offset = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_offset
        )
        .as_bytes(),
    );
    out
}

/// Two pages: `nombre` has a widget on each page, `dni` and the `acepto`
/// checkbox sit on page 1, `domicilio` on page 2.
fn form_pdf() -> Vec<u8> {
    build_pdf(&[
        "<< /Type /Catalog /Pages 2 0 R /AcroForm << /Fields [5 0 R 8 0 R 9 0 R 10 0 R] \
         /DA (/Helv 0 Tf 0 g) /DR << /Font << /Helv 11 0 R >> >> >> >>",
        "<< /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 >>",
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Resources << >> \
         /Annots [6 0 R 8 0 R 9 0 R] >>",
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Resources << >> \
         /Annots [7 0 R 10 0 R] >>",
        "<< /FT /Tx /T (nombre) /V () /DA (/Helv 12 Tf 0 g) /Kids [6 0 R 7 0 R] >>",
        "<< /Type /Annot /Subtype /Widget /Parent 5 0 R /P 3 0 R /Rect [50 700 300 720] /F 4 >>",
        "<< /Type /Annot /Subtype /Widget /Parent 5 0 R /P 4 0 R /Rect [50 700 300 720] /F 4 >>",
        "<< /Type /Annot /Subtype /Widget /FT /Tx /T (dni) /V () /DA (/Helv 12 Tf 0 g) \
         /P 3 0 R /Rect [50 650 300 670] /F 4 >>",
        "<< /Type /Annot /Subtype /Widget /FT /Btn /T (acepto) /V /Off /AS /Off \
         /P 3 0 R /Rect [50 600 70 620] /F 4 >>",
        "<< /Type /Annot /Subtype /Widget /FT /Tx /T (domicilio) /V () /DA (/Helv 12 Tf 0 g) \
         /P 4 0 R /Rect [50 650 300 670] /F 4 >>",
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>",
    ])
}

fn write_form(dir: &Path) -> PathBuf {
    let path = dir.join("alta.pdf");
    std::fs::write(&path, form_pdf()).unwrap();
    path
}

fn values(pairs: &[(&str, &str)]) -> FieldValueMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

// ============================================================================
// Form reading and writing
// ============================================================================

#[test]
fn test_fields_to_fill_unique_and_ordered() {
    let mut form = FormDocument::open_bytes(form_pdf(), None).unwrap();
    let fields = form.get_fields_to_fill().unwrap();
    assert_eq!(fields, vec!["nombre", "dni", "domicilio"]);
}

#[test]
fn test_list_fields_reports_kinds_and_pages() {
    let form = FormDocument::open_bytes(form_pdf(), None).unwrap();
    let fields = form.list_fields().unwrap();
    assert_eq!(fields.len(), 5);

    let checkbox = fields
        .iter()
        .find(|f| f.name.as_deref() == Some("acepto"))
        .unwrap();
    assert_eq!(checkbox.kind, FieldKind::Checkbox);
    assert_eq!(checkbox.page, 1);

    let domicilio = fields
        .iter()
        .find(|f| f.name.as_deref() == Some("domicilio"))
        .unwrap();
    assert_eq!(domicilio.kind, FieldKind::Text);
    assert_eq!(domicilio.page, 2);
}

#[test]
fn test_set_one_field_leaves_others_unchanged() {
    let mut form = FormDocument::open_bytes(form_pdf(), None).unwrap();
    let report = form
        .set_fields_to_fill(&values(&[("dni", "12345678Z")]))
        .unwrap();
    assert_eq!(report.filled_count(), 1);
    assert!(report.unmatched.is_empty());

    let current = form.field_values().unwrap();
    assert_eq!(current["dni"], "12345678Z");
    assert_eq!(current["domicilio"], "");
}

#[test]
fn test_unknown_and_non_text_keys_are_unmatched() {
    let mut form = FormDocument::open_bytes(form_pdf(), None).unwrap();
    let report = form
        .set_fields_to_fill(&values(&[("acepto", "Yes"), ("telefono", "600000000")]))
        .unwrap();
    assert_eq!(report.filled_count(), 0);
    assert_eq!(report.unmatched, vec!["acepto", "telefono"]);
}

#[test]
fn test_field_with_two_widgets_reported_once() {
    let mut form = FormDocument::open_bytes(form_pdf(), None).unwrap();
    let report = form
        .set_fields_to_fill(&values(&[("nombre", "ANA")]))
        .unwrap();
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].name, "nombre");
    assert_eq!(report.outcomes[0].status, FieldStatus::Filled);
}

#[test]
fn test_save_and_reopen_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_form(dir.path());
    let output = dir.path().join("out").join("filled.pdf");

    let mut form = FormDocument::open(&input, None).unwrap();
    form.set_fields_to_fill(&values(&[("dni", "12345678Z"), ("domicilio", "Calle Mayor 3")]))
        .unwrap();
    form.save(&output).unwrap();

    let reopened = FormDocument::open(&output, None).unwrap();
    let current = reopened.field_values().unwrap();
    assert_eq!(current["dni"], "12345678Z");
    assert_eq!(current["domicilio"], "Calle Mayor 3");

    // Viewers are asked to rebuild field appearances
    let doc = lopdf::Document::load(&output).unwrap();
    let root_id = doc.trailer.get(b"Root").unwrap().as_reference().unwrap();
    let acroform = match doc.get_dictionary(root_id).unwrap().get(b"AcroForm").unwrap() {
        lopdf::Object::Reference(id) => doc.get_dictionary(*id).unwrap(),
        inline => inline.as_dict().unwrap(),
    };
    assert!(acroform.get(b"NeedAppearances").unwrap().as_bool().unwrap());

    // The input file is untouched
    let original = FormDocument::open(&input, None).unwrap();
    assert_eq!(original.field_values().unwrap()["dni"], "");
}

// ============================================================================
// Input validation (no PDFium needed)
// ============================================================================

#[test]
fn test_open_nonexistent_form() {
    let result = FormDocument::open("/nonexistent/alta.pdf", None);
    assert!(matches!(result, Err(Error::PdfNotFound { .. })));
}

#[test]
fn test_open_invalid_form_bytes() {
    let result = FormDocument::open_bytes(b"GIF89a".to_vec(), None);
    assert!(matches!(result, Err(Error::InvalidPdf { .. })));
}

// ============================================================================
// End-to-end run with a real form and fake OCR/model backends
// ============================================================================

struct FixedText(&'static str);

#[async_trait]
impl TextRecognizer for FixedText {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn recognize_text(&self, _image: &RgbImage) -> Result<String> {
        Ok(self.0.to_string())
    }
}

struct FixedReply(&'static str);

#[async_trait]
impl LanguageModel for FixedReply {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn query(&self, _request: &ModelRequest) -> Result<String> {
        Ok(self.0.to_string())
    }
}

fn id_photo(dir: &Path) -> PathBuf {
    let path = dir.join("dni.png");
    GrayImage::from_pixel(16, 10, Luma([200u8]))
        .save(&path)
        .unwrap();
    path
}

#[tokio::test]
async fn test_pipeline_fills_real_form() {
    let dir = tempfile::tempdir().unwrap();
    let image = id_photo(dir.path());
    let output = dir.path().join("filled.pdf");

    let mut form = FormDocument::open(write_form(dir.path()), None).unwrap();
    let mut extractor = ImageTextExtractor::new(Box::new(FixedText("ESPAÑA\nDNI 12345678Z")));
    let client = LanguageModelClient::new(Box::new(FixedReply(
        "Here it is:\n{'dni': '12345678Z', 'domicilio': 'Calle Mayor 3', 'extra': 'x'}",
    )));

    let report = FormFillPipeline::new(&mut form, &mut extractor, &client)
        .run(&image, &output)
        .await
        .unwrap();

    assert_eq!(report.fields, vec!["nombre", "dni", "domicilio"]);
    assert_eq!(report.fill.filled_count(), 2);
    assert_eq!(report.fill.unmatched, vec!["extra"]);

    let saved = FormDocument::open(&output, None).unwrap();
    assert_eq!(saved.field_values().unwrap()["domicilio"], "Calle Mayor 3");
}

#[tokio::test]
async fn test_pipeline_unparseable_reply_saves_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let image = id_photo(dir.path());
    let output = dir.path().join("filled.pdf");

    let mut form = FormDocument::open(write_form(dir.path()), None).unwrap();
    let mut extractor = ImageTextExtractor::new(Box::new(FixedText("DNI")));
    let client = LanguageModelClient::new(Box::new(FixedReply("I could not read the document.")));

    let result = FormFillPipeline::new(&mut form, &mut extractor, &client)
        .run(&image, &output)
        .await;

    let err = result.unwrap_err();
    assert!(err.is_response_error());
    assert!(matches!(err, Error::JsonNotFound));
    assert!(!output.exists());
}

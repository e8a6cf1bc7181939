//! PDF form layer
//!
//! This module reads and fills AcroForm fields using PDFium.

mod form;

pub use form::{
    fill_text_fields, is_pdfium_available, mark_need_appearances, unique_in_order,
    write_atomically, FieldKind, FieldOutcome, FieldStatus, FillReport, FormDocument,
    FormFieldInfo, FormFields,
};

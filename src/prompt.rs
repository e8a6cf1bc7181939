//! Prompt composition for the field mapping request

/// Builds the instruction sent to the model: the field list, the expected
/// JSON-only answer shape, the OCR text and any static context facts.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    fields: Vec<String>,
    extracted_text: String,
    context: Vec<(String, String)>,
}

impl PromptBuilder {
    pub fn new(fields: &[String], extracted_text: impl Into<String>) -> Self {
        Self {
            fields: fields.to_vec(),
            extracted_text: extracted_text.into(),
            context: Vec::new(),
        }
    }

    /// Add a static fact (phone, email, date...) the model may use.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.push((key.into(), value.into()));
        self
    }

    pub fn with_contexts<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.context
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn build(&self) -> String {
        let field_list = self
            .fields
            .iter()
            .map(|f| format!("'{}'", f))
            .collect::<Vec<_>>()
            .join(", ");
        let example_key = self.fields.first().map(String::as_str).unwrap_or("nombre");

        let mut prompt = format!(
            "Given the text obtained below, fill in the following fields [{field_list}].\n\
             \n\
             Format: the result must be a JSON object like the example, with the fields filled in and nothing else. \
             Do not answer with anything other than the JSON with the filled fields.\n\
             \n\
             Example:\n\
             {{\n    \"{example_key}\": \"\"\n}}\n\
             \n\
             Text:\n\
             {}\n",
            self.extracted_text
        );

        if !self.context.is_empty() {
            prompt.push_str("\nAdditional data:\n");
            for (key, value) in &self.context {
                prompt.push_str(&format!("{}: {}\n", key, value));
            }
        }

        prompt
    }
}

//! Instruction prompt sent with every form image pair.
//!
//! The prompt is derived from the [`FieldSchema`] alone, so the vocabulary the
//! model is asked to use and the vocabulary [`crate::pipeline::parse`]
//! recognises can never drift apart. Building it is pure: the same schema
//! always yields the same string.

use crate::schema::FieldSchema;

/// Opening instruction: read faithfully, infer where needed, `N/A` last.
pub const PROMPT_PREAMBLE: &str = "Please provide the following information from these handwritten forms in a key-value format. \
For each item, write the key (column header), followed by a colon, and then the value. \
TRY VERY HARD TO READ EVERYTHING AS IS, INFER WHERE NECESSARY! \
If any information is obviously missing or utterly unreadable, as a last resort, write 'N/A'.";

/// Closing instruction: keys must be reproduced exactly.
pub const PROMPT_KEY_DIRECTIVE: &str = "IT IS CRITICAL TO USE THE EXACT SAME HEADERS AS ARE IN THE LIST ABOVE AS KEYS IN YOUR OUTPUT. \
Do not paraphrase, shorten or renumber them. Start each key on a new line.";

/// Build the extraction prompt for `schema`.
///
/// Layout: preamble, blank line, one `- <field>:` line per field in schema
/// order, blank line, key directive.
pub fn build_prompt(schema: &FieldSchema) -> String {
    let list_len: usize = schema.iter().map(|f| f.len() + 4).sum();
    let mut prompt =
        String::with_capacity(PROMPT_PREAMBLE.len() + PROMPT_KEY_DIRECTIVE.len() + list_len + 4);

    prompt.push_str(PROMPT_PREAMBLE);
    prompt.push_str("\n\n");
    for field in schema {
        prompt.push_str("- ");
        prompt.push_str(field);
        prompt.push_str(":\n");
    }
    prompt.push('\n');
    prompt.push_str(PROMPT_KEY_DIRECTIVE);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_lines(prompt: &str) -> Vec<&str> {
        prompt
            .lines()
            .filter_map(|l| l.strip_prefix("- "))
            .collect()
    }

    #[test]
    fn lists_every_field_in_order_with_colon() {
        let schema = FieldSchema::retreat_feedback();
        let prompt = build_prompt(&schema);
        let lines = field_lines(&prompt);
        assert_eq!(lines.len(), schema.len());
        for (line, field) in lines.iter().zip(schema.iter()) {
            assert_eq!(*line, format!("{field}:"));
        }
    }

    #[test]
    fn each_field_appears_exactly_once() {
        let schema =
            FieldSchema::new(["First Name", "Last Name", "NPS [AVG=10] [RATING]"]).unwrap();
        let prompt = build_prompt(&schema);
        for field in &schema {
            assert_eq!(prompt.matches(field.as_str()).count(), 1, "field {field:?}");
        }
    }

    #[test]
    fn deterministic() {
        let schema = FieldSchema::retreat_feedback();
        assert_eq!(build_prompt(&schema), build_prompt(&schema.clone()));
    }

    #[test]
    fn contains_preamble_and_directive() {
        let prompt = build_prompt(&FieldSchema::new(["A"]).unwrap());
        assert!(prompt.starts_with(PROMPT_PREAMBLE));
        assert!(prompt.ends_with(PROMPT_KEY_DIRECTIVE));
        assert!(prompt.contains("'N/A'"));
    }
}

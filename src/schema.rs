//! The ordered set of field names a run extracts.
//!
//! A [`FieldSchema`] is the single source of truth shared by the prompt
//! builder, the reply parser and the CSV assembler: the prompt lists exactly
//! these names, the parser recognises exactly these names, and the CSV has
//! exactly these columns in this order. It is validated once on construction
//! and immutable afterwards.

use crate::error::FormExtractError;
use serde::Serialize;
use std::collections::HashSet;

/// Ordered, unique field names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSchema {
    fields: Vec<String>,
}

impl FieldSchema {
    /// Build a schema from an ordered list of names.
    ///
    /// Rejects an empty list, empty names, names containing a line break
    /// (the parser splits values on `\n<name>:`) and duplicates.
    pub fn new<I, S>(fields: I) -> Result<Self, FormExtractError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        if fields.is_empty() {
            return Err(FormExtractError::InvalidSchema(
                "schema must contain at least one field".into(),
            ));
        }

        let mut seen = HashSet::with_capacity(fields.len());
        for (i, name) in fields.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(FormExtractError::InvalidSchema(format!(
                    "field {} is empty",
                    i + 1
                )));
            }
            if name.contains('\n') || name.contains('\r') {
                return Err(FormExtractError::InvalidSchema(format!(
                    "field {} contains a line break: {:?}",
                    i + 1,
                    name
                )));
            }
            if !seen.insert(name.as_str()) {
                return Err(FormExtractError::InvalidSchema(format!(
                    "duplicate field name: {:?}",
                    name
                )));
            }
        }

        Ok(Self { fields })
    }

    /// Parse a schema from text with one field name per line.
    ///
    /// Blank lines and lines starting with `#` are skipped; surrounding
    /// whitespace is trimmed.
    pub fn from_lines(text: &str) -> Result<Self, FormExtractError> {
        Self::new(
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#')),
        )
    }

    /// The retreat feedback questionnaire: two handwritten pages per guest.
    pub fn retreat_feedback() -> Self {
        Self {
            fields: RETREAT_FEEDBACK_FIELDS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Field names in column order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.fields.iter()
    }
}

impl<'a> IntoIterator for &'a FieldSchema {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

/// Column headers of the retreat feedback form, in form order.
pub const RETREAT_FEEDBACK_FIELDS: &[&str] = &[
    "First Name",
    "Last Name",
    "NPS [AVG=10] [RATING]",
    "The retreat application & registration process was clear and easy.",
    "Retreat logistics communications, emails, checklists and travel support were clear, timely, and helpful.",
    "Please recommend ways we can improve our application, registration, logistics, and travel support:",
    "The 4-week Preparation Program adequately prepared me for my retreat experience.",
    "The 1:1 pre session was valuable and informative.",
    "The Beckley Retreats app was valuable and informative.",
    "The virtual group prep sessions were valuable and informative.",
    "Please provide any other feedback on the preparation experience, positive or constructive:",
    "Beckley Retreats aims to balance and blend modern science with spiritual mysticism. In your personal experience during the retreat, was the program too scientific? Too mystical/spiritual? Or just right?",
    "The retreat activities and facilitators met me where I am in my spiritual/personal discovery journey.",
    "I am satisfied with my stay, the cuisine, and the accommodations at the retreat center.",
    "I felt physically, emotionally and psychologically comfortable and safe during the retreat.",
    "Program facilitators were skilled, professional, and supportive.",
    "I felt included, a sense of belonging, and attention to diversity and cultural sensitivity during the retreat.",
    "Please recommend ways we can improve the retreat experience and facilitation.",
    "I perceive my physical wellbeing to have improved since before the retreat.",
    "I perceive my mental-emotional wellbeing to have improved since before the retreat",
    "I perceive my spiritual connection to have improved since before the retreat.",
    "I perceive my connection to others to have improved since before the retreat.",
    "I perceive my connection to nature to have improved since before the retreat.",
    "Additional Feedback",
];

//! The document shapes the pipeline asks the model for.

use super::{FieldSpec, Schema, SchemaValidator};

pub const NO_SUMMARY: &str = "No summary provided.";
pub const UNTITLED: &str = "Untitled";
pub const UNTITLED_SECTION: &str = "Untitled Section";
pub const NO_FEEDBACK: &str = "No specific feedback provided.";

impl SchemaValidator {
    /// `{summary, key_entities, trends_identified}` for one source item.
    pub fn extraction_schema(&self) -> Schema {
        Schema::new(
            "extraction",
            vec![
                FieldSpec::text("summary", NO_SUMMARY),
                FieldSpec::list("key_entities"),
                FieldSpec::list("trends_identified"),
            ],
        )
    }

    /// `{relevance_score, category}` for one summarized item.
    pub fn scoring_schema(&self) -> Schema {
        Schema::new(
            "scoring",
            vec![
                FieldSpec::score("relevance_score"),
                FieldSpec::category("category", self.categories(), self.default_category()),
            ],
        )
    }

    /// Newsletter outline. Articles are de-duplicated by title across all
    /// sections.
    pub fn outline_schema(&self) -> Schema {
        let article = vec![
            FieldSpec::text("title", UNTITLED),
            FieldSpec::text("summary", NO_SUMMARY),
            FieldSpec::text("url", "#"),
            FieldSpec::category("category", self.categories(), self.default_category()),
        ];
        Schema::new(
            "outline",
            vec![
                FieldSpec::list("introduction_points"),
                FieldSpec::records(
                    "sections",
                    vec![
                        FieldSpec::text("name", UNTITLED_SECTION),
                        FieldSpec::records("articles", article).with_identity("title"),
                    ],
                ),
                FieldSpec::list("conclusion_points"),
                FieldSpec::list("overall_trends"),
            ],
        )
    }

    /// Review verdict from the judge model.
    pub fn review_schema(&self) -> Schema {
        Schema::new(
            "review",
            vec![
                FieldSpec::score("quality_score"),
                FieldSpec::text("feedback", NO_FEEDBACK),
                FieldSpec::records(
                    "issues_found",
                    vec![
                        FieldSpec::text("type", "Unknown Type"),
                        FieldSpec::text("description", "No description"),
                    ],
                ),
            ],
        )
    }
}

use std::sync::Arc;

use async_trait::async_trait;

use crate::models::{AvailabilityQuery, Intent};
use crate::services::ai::{parse_json_reply, LlmProvider, Message};

const AVAILABILITY_PROMPT: &str = r#"You extract availability questions for a dental clinic's appointment desk.

Return ONLY valid JSON (no markdown, no explanation) with this exact structure:
{
  "type": "doctor" | "specialization",
  "doctor_name": "lowercase full doctor name or null",
  "specialization": "snake_case specialization or null",
  "date": "DD-MM-YYYY"
}

Rules:
- Use "doctor" when the patient names a doctor, "specialization" when they name a kind of dentist
- Known specializations: general_dentist, cosmetic_dentist, prosthodontist, pediatric_dentist, emergency_dentist, oral_surgeon, orthodontist
- Copy the date exactly as DD-MM-YYYY; never guess a date that was not given
"#;

/// Turns free text into a structured [`Intent`]. An `Err` means the text
/// could not be interpreted.
#[async_trait]
pub trait IntentExtractor: Send + Sync {
    async fn extract_availability(&self, text: &str) -> anyhow::Result<Intent>;
}

pub struct LlmIntentExtractor {
    llm: Arc<dyn LlmProvider>,
}

impl LlmIntentExtractor {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl IntentExtractor for LlmIntentExtractor {
    async fn extract_availability(&self, text: &str) -> anyhow::Result<Intent> {
        let messages = [Message {
            role: "user".to_string(),
            content: text.to_string(),
        }];

        let response = self.llm.chat(AVAILABILITY_PROMPT, &messages).await?;

        parse_availability_response(&response)
    }
}

fn parse_availability_response(response: &str) -> anyhow::Result<Intent> {
    let query: AvailabilityQuery = parse_json_reply(response)
        .ok_or_else(|| anyhow::anyhow!("extractor reply is not an availability query"))?;

    match query.into_intent() {
        Intent::Unrecognized => anyhow::bail!("extractor reply is missing required fields"),
        intent => Ok(intent),
    }
}

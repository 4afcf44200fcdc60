//! Tool selection for the booking handler.
//!
//! A responder only *plans*: it picks operations and their arguments. The
//! booking handler executes the plan once selection has finished, so an
//! abandoned or timed-out plan never leaves a half-applied change behind.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{ChatMessage, Intent, PatientId};
use crate::services::ai::{parse_json_reply, LlmProvider, Message};
use crate::services::booking::datetime_pattern;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Book,
    Cancel,
    Reschedule,
}

impl Operation {
    pub const ALL: [Operation; 3] = [Operation::Book, Operation::Cancel, Operation::Reschedule];

    fn describe(&self) -> &'static str {
        match self {
            Operation::Book => {
                r#"{"operation":"book","doctor_name":"...","datetime":"DD-MM-YYYY HH:MM"} - book an open slot"#
            }
            Operation::Cancel => {
                r#"{"operation":"cancel","doctor_name":"...","datetime":"DD-MM-YYYY HH:MM"} - cancel the patient's appointment"#
            }
            Operation::Reschedule => {
                r#"{"operation":"reschedule","doctor_name":"...","old_datetime":"DD-MM-YYYY HH:MM","new_datetime":"DD-MM-YYYY HH:MM"} - move the patient's appointment"#
            }
        }
    }
}

/// One selected operation. Calls never carry a patient id; the handler binds
/// the session's patient when it turns a call into an [`Intent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum OperationCall {
    Book {
        doctor_name: String,
        datetime: String,
    },
    Cancel {
        doctor_name: String,
        datetime: String,
    },
    Reschedule {
        doctor_name: String,
        old_datetime: String,
        new_datetime: String,
    },
}

impl OperationCall {
    pub fn operation(&self) -> Operation {
        match self {
            OperationCall::Book { .. } => Operation::Book,
            OperationCall::Cancel { .. } => Operation::Cancel,
            OperationCall::Reschedule { .. } => Operation::Reschedule,
        }
    }

    pub fn into_intent(self, patient_id: PatientId) -> Intent {
        match self {
            OperationCall::Book {
                doctor_name,
                datetime,
            } => Intent::Book {
                doctor: doctor_name,
                patient_id,
                datetime,
            },
            OperationCall::Cancel {
                doctor_name,
                datetime,
            } => Intent::Cancel {
                doctor: doctor_name,
                patient_id,
                datetime,
            },
            OperationCall::Reschedule {
                doctor_name,
                old_datetime,
                new_datetime,
            } => Intent::Reschedule {
                doctor: doctor_name,
                patient_id,
                old_datetime,
                new_datetime,
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolPlan {
    #[serde(default)]
    pub calls: Vec<OperationCall>,
    /// Text for the patient when no operation applies.
    #[serde(default)]
    pub reply: Option<String>,
}

pub struct ToolRequest<'a> {
    pub system_prompt: &'a str,
    pub messages: &'a [ChatMessage],
    pub operations: &'a [Operation],
    pub doctors: &'a [String],
}

#[async_trait]
pub trait ToolResponder: Send + Sync {
    async fn plan(&self, request: &ToolRequest<'_>) -> anyhow::Result<ToolPlan>;
}

/// Drops calls for operations outside the request's capability set.
fn scoped(mut plan: ToolPlan, operations: &[Operation]) -> ToolPlan {
    plan.calls.retain(|call| {
        let allowed = operations.contains(&call.operation());
        if !allowed {
            tracing::warn!(operation = ?call.operation(), "responder selected an operation it was not offered");
        }
        allowed
    });
    plan
}

// ── LLM-backed responder ──

pub struct LlmToolResponder {
    llm: Arc<dyn LlmProvider>,
}

impl LlmToolResponder {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

fn tool_prompt(request: &ToolRequest<'_>) -> String {
    let operations = request
        .operations
        .iter()
        .map(|op| format!("- {}", op.describe()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "{}\n\nAvailable operations:\n{operations}\n\nKnown doctors: {}\n\n\
         Return ONLY valid JSON (no markdown, no explanation):\n\
         {{\"calls\": [ ...operations to run, in order... ], \"reply\": \"text for the patient or null\"}}\n\
         Use an empty calls list and a reply when information is missing.",
        request.system_prompt,
        request.doctors.join(", "),
    )
}

#[async_trait]
impl ToolResponder for LlmToolResponder {
    async fn plan(&self, request: &ToolRequest<'_>) -> anyhow::Result<ToolPlan> {
        let system = tool_prompt(request);
        let messages: Vec<Message> = request.messages.iter().map(Message::from).collect();

        let response = self.llm.chat(&system, &messages).await?;

        let plan = match parse_json_reply::<ToolPlan>(&response) {
            Some(plan) => plan,
            None => {
                tracing::warn!("failed to parse LLM response as tool plan, using reply text");
                ToolPlan {
                    calls: vec![],
                    reply: Some(response),
                }
            }
        };

        Ok(scoped(plan, request.operations))
    }
}

// ── Deterministic responder ──

/// Keyword and pattern based planner for deployments without a model.
#[derive(Debug, Default)]
pub struct RuleBasedResponder;

impl RuleBasedResponder {
    fn select(text: &str, doctors: &[String]) -> Result<OperationCall, String> {
        let lowered = text.to_lowercase();

        let datetimes: Vec<String> = datetime_pattern()
            .find_iter(text)
            .map(|m| m.as_str().split_whitespace().collect::<Vec<_>>().join(" "))
            .collect();

        let mut by_length: Vec<&String> = doctors.iter().collect();
        by_length.sort_by_key(|d| std::cmp::Reverse(d.len()));
        let Some(doctor) = by_length
            .into_iter()
            .find(|d| lowered.contains(d.to_lowercase().as_str()))
        else {
            return Err(format!(
                "Which doctor is this for? Our doctors are: {}.",
                doctors.join(", ")
            ));
        };
        let doctor_name = doctor.clone();

        let Some(first) = datetimes.first().cloned() else {
            return Err(
                "Please provide the appointment date and time in DD-MM-YYYY HH:MM format."
                    .to_string(),
            );
        };

        if ["reschedul", "move", "change"].iter().any(|w| lowered.contains(w)) {
            let Some(second) = datetimes.get(1).cloned() else {
                return Err(
                    "To reschedule, please give both the current and the new date and time in DD-MM-YYYY HH:MM format."
                        .to_string(),
                );
            };
            return Ok(OperationCall::Reschedule {
                doctor_name,
                old_datetime: first,
                new_datetime: second,
            });
        }

        if lowered.contains("cancel") {
            return Ok(OperationCall::Cancel {
                doctor_name,
                datetime: first,
            });
        }

        Ok(OperationCall::Book {
            doctor_name,
            datetime: first,
        })
    }
}

#[async_trait]
impl ToolResponder for RuleBasedResponder {
    async fn plan(&self, request: &ToolRequest<'_>) -> anyhow::Result<ToolPlan> {
        let Some(text) = crate::models::conversation::last_human(request.messages) else {
            return Ok(ToolPlan::default());
        };

        let plan = match Self::select(&text.content, request.doctors) {
            Ok(call) => ToolPlan {
                calls: vec![call],
                reply: None,
            },
            Err(reply) => ToolPlan {
                calls: vec![],
                reply: Some(reply),
            },
        };

        Ok(scoped(plan, request.operations))
    }
}

//! Supervisor loop: routes each human message to exactly one handler and
//! re-enters until the transcript ends with an assistant message.

use crate::models::{ChatMessage, Route, RunState};
use crate::services::{booking, information};
use crate::state::AppState;

const AVAILABILITY_WORDS: [&str; 2] = ["available", "availability"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Routing,
    AwaitingHandlerResult(Route),
    Done,
}

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("supervisor did not reach a terminal state within {0} handler calls")]
    StepLimit(usize),

    #[error(transparent)]
    Handler(#[from] anyhow::Error),
}

/// Availability vocabulary goes to the information handler; everything
/// else, including ambiguous text, goes to booking.
pub fn classify(text: &str) -> Route {
    let lowered = text.to_lowercase();
    if AVAILABILITY_WORDS.iter().any(|w| lowered.contains(w)) {
        Route::Information
    } else {
        Route::Booking
    }
}

/// Pure transition function. The terminal check runs first on every entry
/// to `Routing`.
pub fn transition(state: SupervisorState, last: Option<&ChatMessage>) -> SupervisorState {
    match state {
        SupervisorState::Done => SupervisorState::Done,
        SupervisorState::Routing => match last {
            None => SupervisorState::Done,
            Some(msg) if msg.is_assistant() => SupervisorState::Done,
            Some(msg) => SupervisorState::AwaitingHandlerResult(classify(&msg.content)),
        },
        SupervisorState::AwaitingHandlerResult(_) => SupervisorState::Routing,
    }
}

pub async fn run(state: &AppState, run: &mut RunState) -> Result<(), SupervisorError> {
    let max_steps = state.config.max_supervisor_steps;
    let mut current = SupervisorState::Routing;

    loop {
        current = transition(current, run.messages.last());

        let route = match current {
            SupervisorState::Done => break,
            SupervisorState::Routing => continue,
            SupervisorState::AwaitingHandlerResult(route) => route,
        };

        if run.steps >= max_steps {
            tracing::error!(patient_id = %run.patient_id, steps = run.steps, "supervisor step limit reached");
            return Err(SupervisorError::StepLimit(max_steps));
        }
        run.steps += 1;

        let query = run
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        run.query = query.clone();
        run.route = Some(route);

        tracing::info!(patient_id = %run.patient_id, route = route.node_name(), step = run.steps, "routing message");

        match route {
            Route::Information => {
                let message = information::handle(state, &query).await?;
                run.messages.push(message);
            }
            Route::Booking => {
                let reply = booking::handle(state, run.patient_id, &run.messages).await?;
                run.messages.push(reply.message);
                run.applied.extend(reply.applied);
            }
        }
    }

    tracing::info!(patient_id = %run.patient_id, steps = run.steps, "supervisor done");
    Ok(())
}

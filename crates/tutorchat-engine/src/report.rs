use serde_json::json;
use tutorchat_contracts::events::EventWriter;
use tutorchat_contracts::transcript::Transcript;

use crate::errors::ChatError;
use crate::map_object;
use crate::prompts::report_prompt;
use crate::session::SessionManager;

pub const REPORT_BANNER: &str = "📊 AUTOMATIC REPORT:";
pub const REPORT_FAILURE_MESSAGE: &str = "Something went wrong while generating the report.";
pub const REPORT_EMPTY_MESSAGE: &str = "Unable to generate a report right now.";

pub fn build_report_prompt(transcript: &Transcript) -> String {
    report_prompt(&transcript.conversation_text())
}

/// Prefixes the banner the chat shows above a generated report.
pub fn report_message_text(report: &str) -> String {
    format!("{REPORT_BANNER}\n\n{report}")
}

/// One stateless request over the memoized client. Never fails: problems
/// come back as one of the static report messages.
pub fn generate_report(
    sessions: &mut SessionManager,
    transcript: &Transcript,
    events: &EventWriter,
) -> String {
    let prompt = build_report_prompt(transcript);
    let (text, outcome, error) = match request_report(sessions, &prompt) {
        Ok(reply) if reply.trim().is_empty() => (REPORT_EMPTY_MESSAGE.to_string(), "empty", None),
        Ok(reply) => (reply, "generated", None),
        Err(err) => {
            eprintln!("tutorchat: report generation failed: {err}");
            (
                REPORT_FAILURE_MESSAGE.to_string(),
                "failed",
                Some(err.kind().as_str()),
            )
        }
    };
    events.record(
        "report_generated",
        map_object(json!({
            "outcome": outcome,
            "error_kind": error,
            "messages": transcript.len(),
            "prompt_chars": prompt.chars().count(),
            "report_chars": text.chars().count(),
        })),
    );
    text
}

fn request_report(sessions: &mut SessionManager, prompt: &str) -> Result<String, ChatError> {
    let model = sessions.next_model().to_string();
    let instruction = sessions.config().system_instruction.clone();
    sessions
        .ensure_client()?
        .generate(&model, Some(&instruction), prompt)
        .map_err(ChatError::from_service)
}

use tutorchat_contracts::modes::SupportMode;

pub const INITIAL_GREETING: &str = "Hi! I'm your math tutor. Send me a problem you're stuck on, \
as text or as a photo with /image, and pick how much help you want with /mode. \
I'll start with hints so you can try the next step yourself.";

pub const SYSTEM_INSTRUCTION: &str = r#"You are a patient secondary-school mathematics tutor talking with one student.

Every student message starts with a marker of the form [CURRENT MODE: <MODE>]. Follow it strictly for that turn:
- HINT: give one short hint toward the next step. Never state the final answer.
- GUIDE: walk through the method one step at a time and stop to let the student try each step.
- SOLUTION: give a complete worked solution with the reasoning for every step.
- CHECK: review the student's own answer, point out exactly where it goes wrong, and do not redo the whole problem.

If the student attaches a photo, read the exercise from it before answering. If the photo is unreadable, say so and ask for a clearer one.
Use plain language, short paragraphs, and write formulas in plain text or LaTeX.
Stay on mathematics and schoolwork; politely decline anything else.

When asked for a STUDENT SUPPORT REPORT, answer with exactly these sections and nothing else:
1. Topics covered: the subjects and exercise types discussed.
2. Difficulties observed: the misconceptions or errors the student showed.
3. Support given: which modes were used and what help was provided.
4. Progress: what the student managed on their own.
5. Recommendations: concrete next exercises or topics to review.
Only use information present in the conversation; write "not observed" for a section with no evidence."#;

/// Opening of every outgoing turn.
pub fn mode_marker_line(mode: SupportMode) -> String {
    format!("[CURRENT MODE: {}]", mode.marker())
}

pub fn turn_text(text: &str, mode: SupportMode) -> String {
    format!(
        "{}\n\nStudent question/answer:\n{text}",
        mode_marker_line(mode)
    )
}

pub fn report_prompt(conversation_text: &str) -> String {
    format!(
        "Based on the following conversation, prepare the STUDENT SUPPORT REPORT using the template defined in your instructions.\nOnly extract information from this conversation.\n\nConversation:\n{conversation_text}"
    )
}

#[cfg(test)]
mod tests {
    use tutorchat_contracts::modes::SupportMode;

    use super::{report_prompt, turn_text, SYSTEM_INSTRUCTION};

    #[test]
    fn turn_text_leads_with_marker() {
        let text = turn_text("2x = 6", SupportMode::Check);
        assert!(text.starts_with("[CURRENT MODE: CHECK]\n\n"));
        assert!(text.ends_with("\n2x = 6"));
    }

    #[test]
    fn system_instruction_documents_every_mode() {
        for mode in SupportMode::ALL {
            assert!(SYSTEM_INSTRUCTION.contains(&format!("- {}:", mode.marker())));
        }
    }

    #[test]
    fn report_prompt_ends_with_conversation() {
        assert!(report_prompt("").ends_with("Conversation:\n"));
        assert!(report_prompt("user: hi").ends_with("Conversation:\nuser: hi"));
    }
}

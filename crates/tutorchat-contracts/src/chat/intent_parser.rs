use std::collections::BTreeMap;

use serde_json::Value;

use super::command_registry::{
    CommandSpec, NO_ARG_COMMANDS, RAW_ARG_COMMANDS, SINGLE_PATH_COMMANDS,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub action: String,
    pub raw: String,
    pub prompt: Option<String>,
    pub command_args: BTreeMap<String, Value>,
}

impl Intent {
    fn new(action: &str, raw: &str) -> Self {
        Self {
            action: action.to_string(),
            raw: raw.to_string(),
            prompt: None,
            command_args: BTreeMap::new(),
        }
    }

    pub fn arg(&self, key: &str) -> Option<&str> {
        self.command_args
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

fn find_command(command: &str, specs: &[CommandSpec]) -> Option<CommandSpec> {
    specs.iter().find(|spec| spec.command == command).copied()
}

fn parse_path_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg
            .split_whitespace()
            .map(str::to_string)
            .filter(|value| !value.is_empty())
            .collect(),
    }
}

fn parse_single_path_arg(arg: &str) -> String {
    let parts = parse_path_args(arg);
    match parts.len() {
        0 => String::new(),
        1 => parts[0].clone(),
        _ => parts.join(" "),
    }
}

/// Classifies one line of chat input. Anything that is not a known
/// `/command` is a message for the tutor (`send`).
pub fn parse_intent(text: &str) -> Intent {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return Intent::new("noop", text);
    }

    if let Some(slash_tail) = raw_trimmed.strip_prefix('/') {
        let command_len = slash_tail
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            .count();
        if command_len > 0 {
            let command = slash_tail[..command_len].to_ascii_lowercase();
            let arg = slash_tail[command_len..].trim();

            if let Some(spec) = find_command(&command, RAW_ARG_COMMANDS) {
                let mut intent = Intent::new(spec.action, text);
                intent
                    .command_args
                    .insert(spec.arg_key.to_string(), Value::String(arg.to_string()));
                return intent;
            }

            if let Some(spec) = find_command(&command, SINGLE_PATH_COMMANDS) {
                let mut intent = Intent::new(spec.action, text);
                intent.command_args.insert(
                    spec.arg_key.to_string(),
                    Value::String(parse_single_path_arg(arg)),
                );
                return intent;
            }

            if let Some(spec) = find_command(&command, NO_ARG_COMMANDS) {
                return Intent::new(spec.action, text);
            }

            let mut intent = Intent::new("unknown", text);
            intent
                .command_args
                .insert("command".to_string(), Value::String(command));
            intent
                .command_args
                .insert("arg".to_string(), Value::String(arg.to_string()));
            return intent;
        }
    }

    let mut intent = Intent::new("send", text);
    intent.prompt = Some(raw_trimmed.to_string());
    intent
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::parse_intent;

    #[test]
    fn plain_text_is_sent_to_the_tutor() {
        let intent = parse_intent("  How do I factor x^2 - 9?  ");
        assert_eq!(intent.action, "send");
        assert_eq!(intent.prompt.as_deref(), Some("How do I factor x^2 - 9?"));
    }

    #[test]
    fn blank_line_is_noop() {
        assert_eq!(parse_intent("   ").action, "noop");
    }

    #[test]
    fn division_expression_is_not_a_command() {
        let intent = parse_intent("/ 2 is half");
        assert_eq!(intent.action, "send");
    }

    #[test]
    fn parse_mode_model_and_key_commands() {
        let mode = parse_intent("/mode solution");
        assert_eq!(mode.action, "set_mode");
        assert_eq!(mode.arg("mode"), Some("solution"));

        let model = parse_intent("/MODEL gemini-2.5-pro");
        assert_eq!(model.action, "set_model");
        assert_eq!(model.command_args["model"], json!("gemini-2.5-pro"));

        let key = parse_intent("/key AIzaSyExample");
        assert_eq!(key.action, "set_key");
        assert_eq!(key.arg("key"), Some("AIzaSyExample"));
    }

    #[test]
    fn parse_image_with_quoted_path() {
        let intent = parse_intent("/image \"/tmp/home work.png\"");
        assert_eq!(intent.action, "attach_image");
        assert_eq!(intent.command_args["path"], json!("/tmp/home work.png"));
    }

    #[test]
    fn parse_export_with_and_without_path() {
        let bare = parse_intent("/export");
        assert_eq!(bare.action, "export");
        assert_eq!(bare.arg("path"), None);

        let with_path = parse_intent("/export out/chat.html");
        assert_eq!(with_path.arg("path"), Some("out/chat.html"));
    }

    #[test]
    fn parse_no_arg_commands() {
        assert_eq!(parse_intent("/report").action, "report");
        assert_eq!(parse_intent("/modes").action, "list_modes");
        assert_eq!(parse_intent("/models").action, "list_models");
        assert_eq!(parse_intent("/drop_image").action, "drop_image");
        assert_eq!(parse_intent("/clear_key").action, "clear_key");
        assert_eq!(parse_intent("/settings").action, "show_settings");
        assert_eq!(parse_intent("/exit").action, "quit");
    }

    #[test]
    fn parse_unknown_command() {
        let intent = parse_intent("/magic foo bar");
        assert_eq!(intent.action, "unknown");
        assert_eq!(intent.command_args["command"], json!("magic"));
        assert_eq!(intent.command_args["arg"], json!("foo bar"));
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
    pub arg_key: &'static str,
}

pub(crate) const RAW_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "mode",
        action: "set_mode",
        arg_key: "mode",
    },
    CommandSpec {
        command: "model",
        action: "set_model",
        arg_key: "model",
    },
    CommandSpec {
        command: "key",
        action: "set_key",
        arg_key: "key",
    },
];

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "image",
        action: "attach_image",
        arg_key: "path",
    },
    CommandSpec {
        command: "export",
        action: "export",
        arg_key: "path",
    },
];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "modes",
        action: "list_modes",
        arg_key: "",
    },
    CommandSpec {
        command: "models",
        action: "list_models",
        arg_key: "",
    },
    CommandSpec {
        command: "drop_image",
        action: "drop_image",
        arg_key: "",
    },
    CommandSpec {
        command: "report",
        action: "report",
        arg_key: "",
    },
    CommandSpec {
        command: "clear_key",
        action: "clear_key",
        arg_key: "",
    },
    CommandSpec {
        command: "settings",
        action: "show_settings",
        arg_key: "",
    },
    CommandSpec {
        command: "clear",
        action: "clear",
        arg_key: "",
    },
    CommandSpec {
        command: "help",
        action: "help",
        arg_key: "",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
        arg_key: "",
    },
    CommandSpec {
        command: "exit",
        action: "quit",
        arg_key: "",
    },
];

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/mode <hint|guide|solution|check>",
    "/modes",
    "/image <path>",
    "/drop_image",
    "/report",
    "/export [path]",
    "/key <api-key>",
    "/clear_key",
    "/model <id>",
    "/models",
    "/settings",
    "/clear",
    "/help",
    "/quit",
];

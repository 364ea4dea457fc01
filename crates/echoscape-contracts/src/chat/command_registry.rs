#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub command: &'static str,
    pub usage: &'static str,
    pub summary: &'static str,
}

pub const JOURNAL_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "help",
        usage: "/help",
        summary: "show this list",
    },
    CommandSpec {
        command: "new",
        usage: "/new",
        summary: "start a fresh session",
    },
    CommandSpec {
        command: "visual",
        usage: "/visual",
        summary: "render the session's base landscape",
    },
    CommandSpec {
        command: "reframe",
        usage: "/reframe hope=0.3 warmth=0.2 [name=brighter]",
        summary: "render a variant of the latest base landscape",
    },
    CommandSpec {
        command: "mood",
        usage: "/mood <hope 0-1> <intensity 0-1>",
        summary: "transform the landscape with mood sliders",
    },
    CommandSpec {
        command: "history",
        usage: "/history",
        summary: "list messages and visuals in this session",
    },
    CommandSpec {
        command: "summary",
        usage: "/summary",
        summary: "summarize and close the session",
    },
    CommandSpec {
        command: "quit",
        usage: "/quit",
        summary: "leave the journal",
    },
];

/// Aliases resolved before lookup.
pub(crate) const COMMAND_ALIASES: &[(&str, &str)] = &[("exit", "quit"), ("q", "quit"), ("?", "help")];

pub fn find_command(command: &str) -> Option<&'static CommandSpec> {
    let command = COMMAND_ALIASES
        .iter()
        .find(|(alias, _)| *alias == command)
        .map(|(_, target)| *target)
        .unwrap_or(command);
    JOURNAL_COMMANDS.iter().find(|spec| spec.command == command)
}

pub fn help_text() -> String {
    let width = JOURNAL_COMMANDS
        .iter()
        .map(|spec| spec.usage.len())
        .max()
        .unwrap_or(0);
    JOURNAL_COMMANDS
        .iter()
        .map(|spec| format!("  {:<width$}  {}", spec.usage, spec.summary))
        .collect::<Vec<_>>()
        .join("\n")
}

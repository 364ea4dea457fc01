use std::collections::BTreeMap;

use super::command_registry::find_command;
use crate::visual::DELTA_KEYS;

#[derive(Debug, Clone, PartialEq)]
pub enum JournalCommand {
    Noop,
    Message(String),
    Help,
    NewSession,
    Visual,
    Reframe {
        deltas: BTreeMap<String, f64>,
        variant_name: Option<String>,
    },
    Mood {
        hope: f64,
        intensity: f64,
    },
    History,
    Summary,
    Quit,
    Invalid {
        command: String,
        reason: String,
    },
    Unknown(String),
}

fn split_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg.split_whitespace().map(str::to_string).collect(),
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|value| value.is_finite())
}

fn invalid(command: &str, reason: impl Into<String>) -> JournalCommand {
    JournalCommand::Invalid {
        command: command.to_string(),
        reason: reason.into(),
    }
}

fn parse_reframe(args: &[String]) -> JournalCommand {
    let mut deltas = BTreeMap::new();
    let mut variant_name = None;
    for arg in args {
        let Some((key, value)) = arg.split_once('=') else {
            return invalid("reframe", format!("expected key=value, got '{arg}'"));
        };
        let key = key.trim().to_ascii_lowercase();
        if key == "name" || key == "variant" {
            let value = value.trim();
            if !value.is_empty() {
                variant_name = Some(value.to_string());
            }
            continue;
        }
        if !DELTA_KEYS.contains(&key.as_str()) {
            return invalid(
                "reframe",
                format!("unknown key '{key}' (use {})", DELTA_KEYS.join(", ")),
            );
        }
        let Some(number) = parse_number(value) else {
            return invalid("reframe", format!("'{value}' is not a number"));
        };
        deltas.insert(key, number);
    }
    if deltas.is_empty() {
        return invalid("reframe", "at least one delta is required");
    }
    JournalCommand::Reframe {
        deltas,
        variant_name,
    }
}

fn parse_mood(args: &[String]) -> JournalCommand {
    let [hope, intensity] = args else {
        return invalid("mood", "expected two numbers: <hope> <intensity>");
    };
    match (parse_number(hope), parse_number(intensity)) {
        (Some(hope), Some(intensity)) => JournalCommand::Mood { hope, intensity },
        _ => invalid("mood", "hope and intensity must be numbers"),
    }
}

/// Parses one line of journal input. Lines that do not start with `/` are
/// journal messages; `//text` escapes a literal leading slash.
pub fn parse_journal_command(text: &str) -> JournalCommand {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return JournalCommand::Noop;
    }
    let Some(tail) = trimmed.strip_prefix('/') else {
        return JournalCommand::Message(trimmed.to_string());
    };
    if tail.starts_with('/') {
        return JournalCommand::Message(tail.to_string());
    }

    let (head, remainder) = match tail.split_once(char::is_whitespace) {
        Some((head, remainder)) => (head, remainder),
        None => (tail, ""),
    };
    let head = head.to_ascii_lowercase();
    let Some(spec) = find_command(&head) else {
        return JournalCommand::Unknown(head);
    };
    let args = split_args(remainder);

    match spec.command {
        "help" => JournalCommand::Help,
        "new" => JournalCommand::NewSession,
        "visual" => JournalCommand::Visual,
        "reframe" => parse_reframe(&args),
        "mood" => parse_mood(&args),
        "history" => JournalCommand::History,
        "summary" => JournalCommand::Summary,
        "quit" => JournalCommand::Quit,
        other => JournalCommand::Unknown(other.to_string()),
    }
}

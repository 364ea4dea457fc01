mod command_registry;
mod intent_parser;

pub use command_registry::{find_command, help_text, CommandSpec, JOURNAL_COMMANDS};
pub use intent_parser::{parse_journal_command, JournalCommand};

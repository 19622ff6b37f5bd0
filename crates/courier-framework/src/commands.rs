//! Command-list extraction.
//!
//! During readiness every handler carrying a [`Command`](crate::Command)
//! filter contributes one [`CommandsInfo`] to the client's registry: the
//! filter's command names plus the handler's description.

use std::sync::LazyLock;

use courier_core::{CommandRegistry, CommandsInfo};
use regex::Regex;

use crate::handler::HandlerEntry;

static COMMANDS_INFO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"commands_info:\s*([^\n]*)").expect("commands_info regex"));

/// Pulls the command description out of free text.
///
/// The description is whatever follows the first `commands_info:` label,
/// after any whitespace (line breaks included), up to the end of that line.
/// Returns `None` without a label or when the description is blank.
pub fn parse_commands_info(doc: &str) -> Option<String> {
    let captures = COMMANDS_INFO.captures(doc)?;
    let info = captures.get(1)?.as_str().trim();
    (!info.is_empty()).then(|| info.to_string())
}

/// The entries `handler` contributes, one per command filter with at least
/// one name.
pub fn handler_commands(handler: &HandlerEntry) -> Vec<CommandsInfo> {
    handler
        .filters()
        .iter()
        .filter_map(|filter| filter.commands())
        .filter(|commands| !commands.is_empty())
        .map(|commands| CommandsInfo::new(commands.to_vec(), handler.info().map(str::to_owned)))
        .collect()
}

/// Appends `handler`'s entries to `registry`.
pub fn extract_commands(handler: &HandlerEntry, registry: &CommandRegistry) {
    for info in handler_commands(handler) {
        registry.push(info);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Command, filter_fn};
    use crate::router::{Router, Routing};

    #[test]
    fn test_parse_commands_info() {
        assert_eq!(
            parse_commands_info("\n        commands_info: Запустить бота\n        "),
            Some("Запустить бота".to_string())
        );
        assert_eq!(
            parse_commands_info("commands_info:   spaced out   "),
            Some("spaced out".to_string())
        );
        assert_eq!(parse_commands_info("no label here"), None);
        assert_eq!(parse_commands_info("commands_info:"), None);
    }

    #[test]
    fn test_label_followed_by_newline_takes_next_line() {
        assert_eq!(
            parse_commands_info("commands_info:\n    Next line\nignored"),
            Some("Next line".to_string())
        );
    }

    #[test]
    fn test_only_command_filters_contribute() {
        let mut router = Router::new();
        router
            .message_created()
            .filter(filter_fn(|_| true))
            .command(Command::new(["b", "c"]))
            .info("info2")
            .handler(|| async {});
        router.message_created().handler(|| async {});
        router
            .message_created()
            .command(Command::new(Vec::<String>::new()))
            .handler(|| async {});

        let handlers = router.unit().handlers();
        assert_eq!(
            handler_commands(&handlers[0]),
            vec![CommandsInfo::new(
                vec!["b".into(), "c".into()],
                Some("info2".into())
            )]
        );
        assert!(handler_commands(&handlers[1]).is_empty());
        assert!(handler_commands(&handlers[2]).is_empty());
    }

    #[test]
    fn test_command_without_info() {
        let mut router = Router::new();
        router
            .message_created()
            .command(Command::new(["help"]))
            .handler(|| async {});

        let registry = CommandRegistry::new();
        extract_commands(&router.unit().handlers()[0], &registry);
        assert_eq!(
            registry.snapshot(),
            vec![CommandsInfo::new(vec!["help".into()], None)]
        );
    }
}

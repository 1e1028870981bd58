//! Command Resolver: turns a leading `/<command> <argument>` into a data card.
//!
//! Resolution failure never blocks a send. The message degrades to plain text
//! and carries a notice explaining what could not be resolved.

use tracing::{debug, warn};

use huddle_types::models::{DataCard, LookupKind};

use crate::lookup::{LookupError, LookupRegistry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub kind: LookupKind,
    /// Command word as typed, without the slash.
    pub name: String,
    /// Identifier or query; `None` when the command was given bare.
    pub argument: Option<String>,
}

/// Scan the start of a control-stripped, unescaped body for a known command.
/// Unknown commands are ordinary text and yield `None`.
pub fn parse_command(body: &str) -> Option<ParsedCommand> {
    let rest = body.strip_prefix('/')?;
    let (name, argument) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    let kind = match name.to_ascii_lowercase().as_str() {
        "order" => LookupKind::Order,
        "lead" => LookupKind::Lead,
        "appointment" | "appt" => LookupKind::Appointment,
        "product" => LookupKind::Product,
        "ticket" => LookupKind::Ticket,
        "search" => LookupKind::Search,
        _ => return None,
    };

    let argument = if kind == LookupKind::Search {
        argument.to_string()
    } else {
        // Records take a single identifier; anything after it is commentary.
        let ident = argument.split_whitespace().next().unwrap_or("");
        ident.trim_start_matches('#').to_string()
    };

    Some(ParsedCommand {
        kind,
        name: name.to_string(),
        argument: (!argument.is_empty()).then_some(argument),
    })
}

/// Outcome of resolving a command. `Failed` carries the user-visible notice.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Card(DataCard),
    Failed(String),
}

#[derive(Clone)]
pub struct CommandResolver {
    registry: LookupRegistry,
}

impl CommandResolver {
    pub fn new(registry: LookupRegistry) -> Self {
        Self { registry }
    }

    pub async fn resolve(&self, command: &ParsedCommand) -> Resolution {
        let Some(argument) = command.argument.as_deref() else {
            let hint = if command.kind == LookupKind::Search { "query" } else { "id" };
            return Resolution::Failed(format!("Usage: /{} <{}>", command.name, hint));
        };

        match self.registry.resolve(command.kind, argument).await {
            Ok(Some(card)) => {
                debug!("Resolved /{} {}", command.name, argument);
                Resolution::Card(card)
            }
            Ok(None) => Resolution::Failed(not_found_notice(command.kind, argument)),
            Err(LookupError::Unsupported(kind)) => {
                Resolution::Failed(format!("{} lookups are not available", capitalize(kind.as_str())))
            }
            Err(e) => {
                warn!("Lookup for /{} {} failed: {}", command.name, argument, e);
                Resolution::Failed(format!("Could not look up {} right now", describe(command.kind, argument)))
            }
        }
    }
}

/// Notice used when a deferred lookup runs past its deadline.
pub fn timeout_notice(command: &ParsedCommand) -> String {
    match command.argument.as_deref() {
        Some(argument) => format!("Timed out looking up {}", describe(command.kind, argument)),
        None => format!("Timed out resolving /{}", command.name),
    }
}

fn not_found_notice(kind: LookupKind, argument: &str) -> String {
    match kind {
        LookupKind::Search => format!("No results for \"{}\"", argument),
        _ => format!("Could not find {}", describe(kind, argument)),
    }
}

fn describe(kind: LookupKind, argument: &str) -> String {
    match kind {
        LookupKind::Search => format!("search \"{}\"", argument),
        _ => format!("{} #{}", kind, argument),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::StaticLookup;
    use crate::testing::order_card;
    use std::sync::Arc;

    fn resolver() -> CommandResolver {
        let mut registry = LookupRegistry::new();
        registry.register(
            LookupKind::Order,
            Arc::new(StaticLookup::new().with_record("1001", order_card())),
        );
        CommandResolver::new(registry)
    }

    #[test]
    fn parses_known_commands() {
        let cmd = parse_command("/order #1001 please check").unwrap();
        assert_eq!(cmd.kind, LookupKind::Order);
        assert_eq!(cmd.argument.as_deref(), Some("1001"));

        let cmd = parse_command("/APPT 77").unwrap();
        assert_eq!(cmd.kind, LookupKind::Appointment);

        let cmd = parse_command("/search blue widgets").unwrap();
        assert_eq!(cmd.argument.as_deref(), Some("blue widgets"));
    }

    #[test]
    fn ignores_unknown_or_embedded_commands() {
        assert!(parse_command("/shrug").is_none());
        assert!(parse_command("see /order 1").is_none());
        assert!(parse_command("hello").is_none());
    }

    #[test]
    fn bare_command_has_no_argument() {
        let cmd = parse_command("/ticket").unwrap();
        assert_eq!(cmd.argument, None);
        let cmd = parse_command("/order #").unwrap();
        assert_eq!(cmd.argument, None);
    }

    #[tokio::test]
    async fn resolves_existing_record() {
        let cmd = parse_command("/order #1001").unwrap();
        assert_eq!(resolver().resolve(&cmd).await, Resolution::Card(order_card()));
    }

    #[tokio::test]
    async fn missing_record_degrades_with_notice() {
        let cmd = parse_command("/order #999999").unwrap();
        assert_eq!(
            resolver().resolve(&cmd).await,
            Resolution::Failed("Could not find order #999999".into())
        );
    }

    #[tokio::test]
    async fn unregistered_kind_and_usage_notices() {
        let cmd = parse_command("/lead 5").unwrap();
        assert_eq!(
            resolver().resolve(&cmd).await,
            Resolution::Failed("Lead lookups are not available".into())
        );

        let cmd = parse_command("/order").unwrap();
        assert_eq!(resolver().resolve(&cmd).await, Resolution::Failed("Usage: /order <id>".into()));
    }

    #[tokio::test]
    async fn collaborator_error_degrades() {
        let mut registry = LookupRegistry::new();
        registry.register(LookupKind::Ticket, Arc::new(StaticLookup::new().failing()));
        let cmd = parse_command("/ticket 12").unwrap();
        assert_eq!(
            CommandResolver::new(registry).resolve(&cmd).await,
            Resolution::Failed("Could not look up ticket #12 right now".into())
        );
    }
}

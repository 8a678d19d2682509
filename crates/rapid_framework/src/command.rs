//! # Command Framework
//!
//! Sub-commands of a plugin's root command (`/<label> <sub> [args...]`).
//!
//! A [`SubCommand`] bundles its permission node, usage lines, an optional
//! exact argument count, per-position [`ArgumentMapper`]s and the action to
//! run. [`CommandRegistry`] resolves a typed line to a sub-command, checks the
//! sender's permission and prints usage when the action reports misuse.

use crate::error::{CommandError, InvalidArgumentError};
use crate::trie::Trie;
use crate::types::PlayerId;
use std::sync::Arc;
use tracing::{debug, warn};

/// Placeholder replaced by the root command label in usage lines.
pub const COMMAND_PLACEHOLDER: &str = "${command}";

// ============================================================================
// Command Sender
// ============================================================================

/// Whoever issued a command: a player or the console.
pub trait CommandSender: Send + Sync {
    fn display_name(&self) -> String;

    fn send_message(&self, message: &str);

    /// `true` if the sender holds at least one of `permissions`.
    fn has_permission(&self, permissions: &[&str]) -> bool;

    /// `None` for non-player senders.
    fn player_id(&self) -> Option<PlayerId> {
        None
    }
}

// ============================================================================
// Argument Mapping
// ============================================================================

/// An argument after mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Text(String),
    Integer(i64),
    Decimal(f64),
    Boolean(bool),
    Player(PlayerId),
}

/// Extraction of a concrete type from a mapped argument.
pub trait FromArgValue: Sized {
    fn from_arg(value: ArgValue) -> Option<Self>;
}

impl FromArgValue for ArgValue {
    fn from_arg(value: ArgValue) -> Option<Self> {
        Some(value)
    }
}

impl FromArgValue for String {
    fn from_arg(value: ArgValue) -> Option<Self> {
        match value {
            ArgValue::Text(s) => Some(s),
            ArgValue::Integer(i) => Some(i.to_string()),
            ArgValue::Decimal(d) => Some(d.to_string()),
            ArgValue::Boolean(b) => Some(b.to_string()),
            ArgValue::Player(p) => Some(p.to_string()),
        }
    }
}

impl FromArgValue for i64 {
    fn from_arg(value: ArgValue) -> Option<Self> {
        match value {
            ArgValue::Integer(i) => Some(i),
            _ => None,
        }
    }
}

impl FromArgValue for f64 {
    fn from_arg(value: ArgValue) -> Option<Self> {
        match value {
            ArgValue::Decimal(d) => Some(d),
            ArgValue::Integer(i) => Some(i as f64),
            _ => None,
        }
    }
}

impl FromArgValue for bool {
    fn from_arg(value: ArgValue) -> Option<Self> {
        match value {
            ArgValue::Boolean(b) => Some(b),
            _ => None,
        }
    }
}

impl FromArgValue for PlayerId {
    fn from_arg(value: ArgValue) -> Option<Self> {
        match value {
            ArgValue::Player(p) => Some(p),
            _ => None,
        }
    }
}

type MapperFn = dyn Fn(&str) -> Result<ArgValue, InvalidArgumentError> + Send + Sync;

/// Converts the raw text of one argument.
#[derive(Clone)]
pub struct ArgumentMapper(Arc<MapperFn>);

impl ArgumentMapper {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&str) -> Result<ArgValue, InvalidArgumentError> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Leaves the argument as text.
    pub fn identity() -> Self {
        Self::new(|raw| Ok(ArgValue::Text(raw.to_string())))
    }

    pub fn integer() -> Self {
        Self::new(|raw| {
            raw.parse::<i64>()
                .map(ArgValue::Integer)
                .map_err(|_| InvalidArgumentError::new("not an integer"))
        })
    }

    pub fn non_negative_integer() -> Self {
        Self::new(|raw| match raw.parse::<i64>() {
            Ok(i) if i >= 0 => Ok(ArgValue::Integer(i)),
            Ok(_) => Err(InvalidArgumentError::new("must not be negative")),
            Err(_) => Err(InvalidArgumentError::new("not an integer")),
        })
    }

    pub fn decimal() -> Self {
        Self::new(|raw| match raw.parse::<f64>() {
            Ok(d) if d.is_finite() => Ok(ArgValue::Decimal(d)),
            _ => Err(InvalidArgumentError::new("not a number")),
        })
    }

    /// Accepts `true/false`, `yes/no`, `on/off` in any case.
    pub fn boolean() -> Self {
        Self::new(|raw| match raw.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" => Ok(ArgValue::Boolean(true)),
            "false" | "no" | "off" => Ok(ArgValue::Boolean(false)),
            _ => Err(InvalidArgumentError::new("not true or false")),
        })
    }

    /// Accepts a UUID, or a player name which is turned into its offline id.
    pub fn player() -> Self {
        Self::new(|raw| {
            if let Ok(id) = raw.parse::<PlayerId>() {
                return Ok(ArgValue::Player(id));
            }
            let valid_name = (3..=16).contains(&raw.len())
                && raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
            if valid_name {
                Ok(ArgValue::Player(PlayerId::from_name(raw)))
            } else {
                Err(InvalidArgumentError::new("not a player name or id"))
            }
        })
    }

    pub fn apply(&self, raw: &str) -> Result<ArgValue, InvalidArgumentError> {
        (self.0)(raw)
    }
}

impl std::fmt::Debug for ArgumentMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ArgumentMapper")
    }
}

// ============================================================================
// Arguments
// ============================================================================

/// Arguments of one command invocation.
pub struct Arguments<'a> {
    sender: &'a dyn CommandSender,
    args: &'a [String],
    mappers: &'a [ArgumentMapper],
}

impl<'a> Arguments<'a> {
    pub fn new(sender: &'a dyn CommandSender, args: &'a [String], mappers: &'a [ArgumentMapper]) -> Self {
        Self { sender, args, mappers }
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn raw(&self, index: usize) -> Option<&'a str> {
        self.args.get(index).map(String::as_str)
    }

    /// Argument at `index` converted by the mapper registered for that position.
    ///
    /// Returns `Some(default)` when `index` is out of range. Returns `None` when
    /// the conversion fails; the sender has already been told why.
    pub fn get<T: FromArgValue>(&self, index: usize, default: T) -> Option<T> {
        let Some(raw) = self.args.get(index) else {
            return Some(default);
        };

        let mapped = match self.mappers.get(index) {
            Some(mapper) => mapper.apply(raw),
            None => ArgumentMapper::identity().apply(raw),
        };

        match mapped {
            Ok(value) => {
                let converted = T::from_arg(value);
                if converted.is_none() {
                    warn!(
                        "Argument {} ({}) does not match the type requested by the command",
                        index, raw
                    );
                }
                converted
            }
            Err(e) => {
                self.sender.send_message(&format!("'{}': {}", raw, e));
                None
            }
        }
    }

    /// Arguments from `index` to the end joined with spaces.
    pub fn joined(&self, index: usize) -> Option<String> {
        self.joined_range(index, self.args.len().saturating_sub(1))
    }

    /// Arguments from `index` to `end` (both inclusive) joined with spaces.
    /// `end` is clamped to the last argument.
    pub fn joined_range(&self, index: usize, end: usize) -> Option<String> {
        if index >= self.args.len() {
            return None;
        }
        let end = end.min(self.args.len() - 1);
        if end < index {
            return None;
        }
        Some(self.args[index..=end].join(" "))
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a str> + 'a {
        self.args.iter().map(String::as_str)
    }
}

impl std::fmt::Debug for Arguments<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arguments").field("args", &self.args).finish()
    }
}

// ============================================================================
// Sub Command
// ============================================================================

/// Action run by a sub-command. Returns `false` to have usage printed.
pub type CommandAction = Arc<dyn Fn(&dyn CommandSender, &Arguments<'_>) -> bool + Send + Sync>;

pub struct SubCommand {
    name: String,
    aliases: Vec<String>,
    permission: String,
    description: Option<String>,
    usage: Vec<String>,
    arg_count: Option<usize>,
    action: CommandAction,
    mappers: Vec<ArgumentMapper>,
}

impl SubCommand {
    /// Starts building `name`; its permission defaults to `<admin_permission>.<name>`.
    pub fn builder(name: impl Into<String>, admin_permission: &str) -> SubCommandBuilder {
        SubCommandBuilder::for_command(name, admin_permission)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn permission(&self) -> &str {
        &self.permission
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn arg_count(&self) -> Option<usize> {
        self.arg_count
    }

    /// Usage lines with the placeholder replaced by `label`.
    pub fn usage(&self, label: &str) -> Vec<String> {
        self.usage
            .iter()
            .map(|line| line.replace(COMMAND_PLACEHOLDER, label))
            .collect()
    }

    /// Case-insensitive match against the name and the aliases.
    pub fn matches(&self, input: &str) -> bool {
        self.name.eq_ignore_ascii_case(input) || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(input))
    }

    /// Runs the action. Returns `false` when the number of arguments does not
    /// match or the action reports misuse.
    pub fn execute(&self, sender: &dyn CommandSender, label: &str, args: &[String]) -> bool {
        if let Some(expected) = self.arg_count {
            if args.len() != expected {
                debug!(
                    "/{} {}: expected {} arguments, got {}",
                    label,
                    self.name,
                    expected,
                    args.len()
                );
                return false;
            }
        }

        let arguments = Arguments::new(sender, args, &self.mappers);
        (self.action)(sender, &arguments)
    }
}

impl std::fmt::Debug for SubCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubCommand")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("permission", &self.permission)
            .field("arg_count", &self.arg_count)
            .finish_non_exhaustive()
    }
}

pub struct SubCommandBuilder {
    name: String,
    aliases: Vec<String>,
    permission: String,
    description: Option<String>,
    usage: Vec<String>,
    arg_count: Option<usize>,
    action: Option<CommandAction>,
    mappers: Vec<ArgumentMapper>,
}

impl SubCommandBuilder {
    pub fn for_command(name: impl Into<String>, admin_permission: &str) -> Self {
        let name = name.into();
        Self {
            permission: format!("{}.{}", admin_permission, name),
            name,
            aliases: Vec::new(),
            description: None,
            usage: Vec::new(),
            arg_count: None,
            action: None,
            mappers: Vec::new(),
        }
    }

    pub fn aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    pub fn permission(mut self, permission: impl Into<String>) -> Self {
        self.permission = permission.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Adds a usage line; `${command}` is replaced by the root label.
    pub fn usage(mut self, line: impl Into<String>) -> Self {
        self.usage.push(line.into());
        self
    }

    /// Requires exactly `count` arguments.
    pub fn arguments(mut self, count: usize) -> Self {
        self.arg_count = Some(count);
        self
    }

    pub fn action<F>(mut self, action: F) -> Self
    where
        F: Fn(&dyn CommandSender, &Arguments<'_>) -> bool + Send + Sync + 'static,
    {
        self.action = Some(Arc::new(action));
        self
    }

    /// Sets the mapper for argument `index`; earlier unset positions keep the
    /// identity mapper.
    pub fn mapper(mut self, index: usize, mapper: ArgumentMapper) -> Self {
        while self.mappers.len() <= index {
            self.mappers.push(ArgumentMapper::identity());
        }
        self.mappers[index] = mapper;
        self
    }

    pub fn build(self) -> Result<SubCommand, CommandError> {
        let action = self
            .action
            .ok_or_else(|| CommandError::MissingAction(self.name.clone()))?;

        Ok(SubCommand {
            name: self.name,
            aliases: self.aliases,
            permission: self.permission,
            description: self.description,
            usage: self.usage,
            arg_count: self.arg_count,
            action,
            mappers: self.mappers,
        })
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Sub-commands of one root command label.
pub struct CommandRegistry {
    label: String,
    commands: Vec<Arc<SubCommand>>,
    names: Trie,
}

impl CommandRegistry {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            commands: Vec::new(),
            names: Trie::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn register(&mut self, command: SubCommand) -> Result<(), CommandError> {
        let taken = std::iter::once(command.name())
            .chain(command.aliases().iter().map(String::as_str))
            .find(|name| self.find(name).is_some());
        if let Some(name) = taken {
            return Err(CommandError::DuplicateCommand(name.to_string()));
        }

        self.names.insert(&command.name().to_ascii_lowercase());
        for alias in command.aliases() {
            self.names.insert(&alias.to_ascii_lowercase());
        }

        debug!("Registered /{} {}", self.label, command.name());
        self.commands.push(Arc::new(command));
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<&Arc<SubCommand>> {
        self.commands.iter().find(|command| command.matches(name))
    }

    pub fn commands(&self) -> impl Iterator<Item = &Arc<SubCommand>> {
        self.commands.iter()
    }

    /// Runs the sub-command named by the first word of `line`.
    ///
    /// An empty line prints help. Returns `Ok(false)` when the sender lacks
    /// permission or the command was misused (usage has been sent).
    pub fn dispatch(&self, sender: &dyn CommandSender, line: &str) -> Result<bool, CommandError> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            self.help(sender);
            return Ok(true);
        };
        let args: Vec<String> = words.map(str::to_string).collect();

        let Some(command) = self.find(name) else {
            sender.send_message(&format!("Unknown command '{}'. Try /{} help", name, self.label));
            return Err(CommandError::UnknownCommand(name.to_string()));
        };

        if !sender.has_permission(&[command.permission()]) {
            sender.send_message("You don't have permission to do that.");
            debug!(
                "{} lacks {} for /{} {}",
                sender.display_name(),
                command.permission(),
                self.label,
                command.name()
            );
            return Ok(false);
        }

        if command.execute(sender, &self.label, &args) {
            return Ok(true);
        }

        for line in command.usage(&self.label) {
            sender.send_message(&line);
        }
        Ok(false)
    }

    /// Sends a one-line summary of every command the sender may use.
    pub fn help(&self, sender: &dyn CommandSender) {
        for command in &self.commands {
            if !sender.has_permission(&[command.permission()]) {
                continue;
            }
            match command.description() {
                Some(description) => {
                    sender.send_message(&format!("/{} {} - {}", self.label, command.name(), description))
                }
                None => sender.send_message(&format!("/{} {}", self.label, command.name())),
            }
        }
    }

    /// Command names and aliases starting with `prefix`.
    pub fn complete(&self, prefix: &str) -> Vec<String> {
        self.names.words_with_prefix(&prefix.to_ascii_lowercase())
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("label", &self.label)
            .field("commands", &self.commands)
            .finish()
    }
}

//! Command dispatch table and text parsing.
//!
//! The engine consumes parsed commands; this module supplies the narrow seam
//! that turns command text into a [`CommandList`]: a table of
//! [`CommandDef`] entries, name lookup with alias and unambiguous-prefix
//! matching, and a small tmux-style argument splitter (`-x value` flags plus
//! positionals). The outer process CLI is clap's job; this is the embedded
//! command language.

use crate::command::{Command, CommandExec, CommandList, TargetClaims};
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::rc::Rc;

// =============================================================================
// Arguments
// =============================================================================

/// Parsed arguments of one command: single-character flags plus positionals.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Args {
    flags: BTreeMap<char, Option<String>>,
    values: Vec<String>,
}

impl Args {
    /// Whether `flag` was given.
    #[must_use]
    pub fn has(&self, flag: char) -> bool {
        self.flags.contains_key(&flag)
    }

    /// Value of a value-taking flag, if given.
    #[must_use]
    pub fn get(&self, flag: char) -> Option<&str> {
        self.flags.get(&flag).and_then(|v| v.as_deref())
    }

    /// Positional arguments in order.
    #[must_use]
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// First positional argument, if any.
    #[must_use]
    pub fn first(&self) -> Option<&str> {
        self.values.first().map(String::as_str)
    }

    /// All given flags with their values, in flag order.
    pub fn flag_entries(&self) -> impl Iterator<Item = (char, Option<&str>)> {
        self.flags.iter().map(|(f, v)| (*f, v.as_deref()))
    }

    pub(crate) fn set(&mut self, flag: char, value: Option<String>) {
        self.flags.insert(flag, value);
    }

    pub(crate) fn push_value(&mut self, value: String) {
        self.values.push(value);
    }
}

// =============================================================================
// Command definitions
// =============================================================================

/// One dispatch-table entry: name, argument template, target claims and
/// executable behavior.
pub struct CommandDef {
    pub name: &'static str,
    pub alias: Option<&'static str>,
    /// Flags that take a value (`-t target`).
    pub value_flags: &'static [char],
    /// Flags that stand alone (`-g`).
    pub bool_flags: &'static [char],
    /// Bounds on positional argument count.
    pub min_args: usize,
    pub max_args: Option<usize>,
    pub usage: &'static str,
    pub claims: TargetClaims,
    /// Marks the command in guard markers emitted around its execution.
    pub control: bool,
    pub exec: Rc<dyn CommandExec>,
}

impl std::fmt::Debug for CommandDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDef")
            .field("name", &self.name)
            .field("alias", &self.alias)
            .field("value_flags", &self.value_flags)
            .field("bool_flags", &self.bool_flags)
            .field("min_args", &self.min_args)
            .field("max_args", &self.max_args)
            .field("usage", &self.usage)
            .field("claims", &self.claims)
            .field("control", &self.control)
            .finish_non_exhaustive()
    }
}

impl PartialEq for CommandDef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.alias == other.alias
            && self.value_flags == other.value_flags
            && self.bool_flags == other.bool_flags
            && self.min_args == other.min_args
            && self.max_args == other.max_args
            && self.usage == other.usage
            && self.claims == other.claims
            && self.control == other.control
            && Rc::ptr_eq(&self.exec, &other.exec)
    }
}

// =============================================================================
// Command table
// =============================================================================

/// Ordered table of command definitions with prefix lookup.
#[derive(Default)]
pub struct CommandTable {
    defs: Vec<Rc<CommandDef>>,
}

impl CommandTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, def: CommandDef) {
        self.defs.push(Rc::new(def));
    }

    /// Look up a command word: exact name or alias wins, otherwise an
    /// unambiguous prefix of a name.
    pub fn lookup(&self, word: &str) -> Result<Rc<CommandDef>> {
        let mut found: Option<Rc<CommandDef>> = None;
        let mut ambiguous = false;

        for def in &self.defs {
            if def.alias == Some(word) || def.name == word {
                return Ok(Rc::clone(def));
            }
            if def.name.starts_with(word) {
                if found.is_some() {
                    ambiguous = true;
                }
                found = Some(Rc::clone(def));
            }
        }

        if ambiguous {
            let candidates: Vec<&str> = self
                .defs
                .iter()
                .filter(|d| d.name.starts_with(word))
                .map(|d| d.name)
                .collect();
            return Err(Error::AmbiguousCommand(
                word.to_string(),
                candidates.join(", "),
            ));
        }
        found.ok_or_else(|| Error::UnknownCommand(word.to_string()))
    }

    /// Parse one command from a token sequence.
    fn parse_tokens(&self, tokens: &[String]) -> Result<Command> {
        let Some(word) = tokens.first() else {
            return Err(Error::Parse("no command".to_string()));
        };
        let def = self.lookup(word)?;

        let mut args = Args::default();
        let mut positional_only = false;
        let mut iter = tokens[1..].iter();
        while let Some(token) = iter.next() {
            if !positional_only && token == "--" {
                positional_only = true;
                continue;
            }
            if !positional_only && token.len() >= 2 && token.starts_with('-') {
                let mut chars = token[1..].chars();
                let flag = chars.next().unwrap_or('-');
                let inline: String = chars.collect();
                if def.value_flags.contains(&flag) {
                    let value = if inline.is_empty() {
                        iter.next()
                            .ok_or_else(|| Error::Usage(format!("{} {}", def.name, def.usage)))?
                            .clone()
                    } else {
                        inline
                    };
                    args.set(flag, Some(value));
                    continue;
                }
                if def.bool_flags.contains(&flag) && inline.is_empty() {
                    args.set(flag, None);
                    continue;
                }
                return Err(Error::Usage(format!("{} {}", def.name, def.usage)));
            }
            args.push_value(token.clone());
        }

        if args.values().len() < def.min_args
            || def.max_args.is_some_and(|max| args.values().len() > max)
        {
            return Err(Error::Usage(format!("{} {}", def.name, def.usage)));
        }

        Ok(Command { def, args })
    }

    /// Parse a single command line.
    pub fn parse_line(&self, line: &str) -> Result<Command> {
        let tokens =
            shell_words::split(line).map_err(|e| Error::Parse(e.to_string()))?;
        self.parse_tokens(&tokens)
    }

    /// Parse a script into one command list.
    ///
    /// Commands are separated by newlines or by a standalone `;` token, so a
    /// quoted semicolon inside an argument does not split. A parse failure
    /// anywhere aborts the whole script; no partial list is produced.
    pub fn parse_script(&self, text: &str) -> Result<CommandList> {
        let mut commands = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let tokens =
                shell_words::split(line).map_err(|e| Error::Parse(e.to_string()))?;
            for group in tokens.split(|t| t == ";") {
                if group.is_empty() {
                    continue;
                }
                commands.push(self.parse_tokens(group)?);
            }
        }
        Ok(CommandList::new(commands))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandOutcome;
    use crate::queue::CmdQueue;
    use crate::runtime::Runtime;
    use crate::state::ExecState;

    fn noop(_: &Runtime, _: &CmdQueue, _: &Command, _: &mut ExecState) -> CommandOutcome {
        CommandOutcome::Normal
    }

    fn noop_def(name: &'static str, alias: Option<&'static str>) -> CommandDef {
        CommandDef {
            name,
            alias,
            value_flags: &['t', 'n'],
            bool_flags: &['g'],
            min_args: 0,
            max_args: None,
            usage: "[-g] [-t target] [args]",
            claims: TargetClaims::empty(),
            control: false,
            exec: Rc::new(noop),
        }
    }

    fn table() -> CommandTable {
        let mut t = CommandTable::new();
        t.define(noop_def("set-hook", None));
        t.define(noop_def("show-hooks", None));
        t.define(noop_def("display-message", Some("display")));
        t
    }

    // -- lookup -----------------------------------------------------------

    #[test]
    fn exact_and_alias_lookup() {
        let t = table();
        assert_eq!(t.lookup("set-hook").unwrap().name, "set-hook");
        assert_eq!(t.lookup("display").unwrap().name, "display-message");
    }

    #[test]
    fn unambiguous_prefix_matches() {
        let t = table();
        assert_eq!(t.lookup("se").unwrap().name, "set-hook");
        assert_eq!(t.lookup("di").unwrap().name, "display-message");
    }

    #[test]
    fn ambiguous_prefix_is_an_error() {
        let t = table();
        match t.lookup("s") {
            Err(Error::AmbiguousCommand(word, candidates)) => {
                assert_eq!(word, "s");
                assert!(candidates.contains("set-hook"));
                assert!(candidates.contains("show-hooks"));
            }
            other => panic!("expected ambiguity, got {other:?}"),
        }
    }

    #[test]
    fn unknown_command_is_an_error() {
        assert_eq!(
            table().lookup("bogus"),
            Err(Error::UnknownCommand("bogus".to_string()))
        );
    }

    // -- parsing ----------------------------------------------------------

    #[test]
    fn parses_flags_and_positionals() {
        let cmd = table()
            .parse_line("set-hook -g -n before-foo 'display-message hi'")
            .unwrap();
        assert!(cmd.args.has('g'));
        assert_eq!(cmd.args.get('n'), Some("before-foo"));
        assert_eq!(cmd.args.values(), ["display-message hi"]);
    }

    #[test]
    fn inline_flag_value() {
        let cmd = table().parse_line("display-message -tmain:0 hi").unwrap();
        assert_eq!(cmd.args.get('t'), Some("main:0"));
    }

    #[test]
    fn missing_flag_value_is_usage_error() {
        match table().parse_line("set-hook -n") {
            Err(Error::Usage(u)) => assert!(u.starts_with("set-hook")),
            other => panic!("expected usage error, got {other:?}"),
        }
    }

    #[test]
    fn unknown_flag_is_usage_error() {
        assert!(matches!(
            table().parse_line("set-hook -z"),
            Err(Error::Usage(_))
        ));
    }

    #[test]
    fn script_splits_on_bare_semicolon_only() {
        let list = table()
            .parse_script("display hi ; display 'a;b'")
            .unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.commands()[1].args.first(), Some("a;b"));
    }

    #[test]
    fn script_skips_blank_and_comment_lines() {
        let list = table()
            .parse_script("# comment\n\ndisplay one\ndisplay two\n")
            .unwrap();
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn script_parse_failure_produces_nothing() {
        assert!(table().parse_script("display ok ; bogus-cmd").is_err());
    }
}

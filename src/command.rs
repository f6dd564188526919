//! The text command language.
//!
//! One or more commands per line, separated by `;`. Everything after `#` is a
//! comment.
//!
//! ```text
//! add sine a; add echo b   # a voice through an echo
//! connect a b; connect b mixer
//! fire a keydown C4
//! queue a hz 330
//! sleep 0.5
//! disconnect b
//! ```
//!
//! Values are plain numbers or note names, which become frequencies.

use core::str::FromStr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::event::EventKind;
use crate::field::When;
use crate::note::parse_note;

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Add { kind: String, name: String },
    AddSample { name: String, path: PathBuf },
    Delete { name: String },
    Connect { src: String, dst: String },
    /// With no `dst`, drops every child of `src`.
    Disconnect { src: String, dst: Option<String> },
    Fire { name: String, kind: EventKind, value: f32, when: When },
    Sleep(Duration),
    Info,
    Dot,
    Quit,
}

/// Parse every command on one line.
pub fn parse_line(line: &str) -> Result<Vec<Command>> {
    let code = line.split('#').next().unwrap_or_default();
    code.split(';')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::parse)
        .collect()
}

/// Parse a whole script. Errors carry the 1-based line number.
pub fn parse_script(text: &str) -> Result<Vec<Command>> {
    let mut commands = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let parsed = parse_line(line).map_err(|e| match e {
            Error::Command(msg) => Error::Command(format!("line {}: {}", i + 1, msg)),
            other => other,
        })?;
        commands.extend(parsed);
    }
    Ok(commands)
}

/// A number, or a note name read as its frequency.
pub fn parse_value(s: &str) -> Result<f32> {
    if let Ok(v) = s.parse::<f32>() {
        return Ok(v);
    }
    parse_note(s)
        .map(|n| n.hz())
        .map_err(|_| Error::Command(format!("'{}' is neither a number nor a note", s)))
}

fn usage(what: &str) -> Error {
    Error::Command(format!("usage: {}", what))
}

impl FromStr for Command {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let words: Vec<&str> = s.split_whitespace().collect();
        let Some((&verb, args)) = words.split_first() else {
            return Err(Error::Command("empty command".into()));
        };

        let cmd = match (verb.to_ascii_lowercase().as_str(), args) {
            ("add", ["sample", name, path]) => Command::AddSample {
                name: name.to_string(),
                path: PathBuf::from(*path),
            },
            ("add", [kind, name]) => Command::Add {
                kind: kind.to_string(),
                name: name.to_string(),
            },
            ("add", _) => return Err(usage("add <kind> <name> | add sample <name> <path>")),
            ("del" | "delete", [name]) => Command::Delete { name: name.to_string() },
            ("del" | "delete", _) => return Err(usage("delete <name>")),
            ("connect", [src, dst]) => Command::Connect {
                src: src.to_string(),
                dst: dst.to_string(),
            },
            ("connect", _) => return Err(usage("connect <src> <dst>")),
            ("disconnect", [src]) => Command::Disconnect { src: src.to_string(), dst: None },
            ("disconnect", [src, dst]) => Command::Disconnect {
                src: src.to_string(),
                dst: Some(dst.to_string()),
            },
            ("disconnect", _) => return Err(usage("disconnect <src> [dst]")),
            (verb @ ("fire" | "queue"), [name, kind, rest @ ..]) => {
                let value = match rest {
                    [] => 0.0,
                    [v] => parse_value(v)?,
                    _ => return Err(usage("fire|queue <name> <event> [value]")),
                };
                let kind: EventKind = kind.parse().unwrap_or_else(|never| match never {});
                if kind.is_topology() {
                    return Err(Error::Command(format!("'{}' cannot be fired, use the topology commands", kind)));
                }
                let when = if verb == "queue" { When::Deferred } else { When::Immediate };
                Command::Fire { name: name.to_string(), kind, value, when }
            }
            ("fire" | "queue", _) => return Err(usage("fire|queue <name> <event> [value]")),
            ("sleep", [secs]) => {
                let bad = || Error::Command(format!("bad duration '{}'", secs));
                let parsed: f64 = secs.parse().map_err(|_| bad())?;
                Command::Sleep(Duration::try_from_secs_f64(parsed).map_err(|_| bad())?)
            }
            ("sleep", _) => return Err(usage("sleep <seconds>")),
            ("info" | "ls", []) => Command::Info,
            ("dot", []) => Command::Dot,
            ("quit" | "exit", []) => Command::Quit,
            (other, _) => return Err(Error::Command(format!("unknown command '{}'", other))),
        };
        Ok(cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn add_and_connect() {
        let cmds = parse_line("add sine a; add echo b ; connect a b").unwrap();
        assert_eq!(
            cmds,
            vec![
                Command::Add { kind: "sine".into(), name: "a".into() },
                Command::Add { kind: "echo".into(), name: "b".into() },
                Command::Connect { src: "a".into(), dst: "b".into() },
            ]
        );
    }

    #[test]
    fn comments_and_blank_lines() {
        assert!(parse_line("   # nothing here").unwrap().is_empty());
        assert!(parse_line("").unwrap().is_empty());
        assert_eq!(parse_line("info # list").unwrap(), vec![Command::Info]);
    }

    #[test]
    fn add_sample() {
        assert_eq!(
            "add sample kick drums/kick.wav".parse::<Command>().unwrap(),
            Command::AddSample { name: "kick".into(), path: PathBuf::from("drums/kick.wav") }
        );
    }

    #[test]
    fn disconnect_forms() {
        assert_eq!(
            "disconnect a".parse::<Command>().unwrap(),
            Command::Disconnect { src: "a".into(), dst: None }
        );
        assert_eq!(
            "disconnect a b".parse::<Command>().unwrap(),
            Command::Disconnect { src: "a".into(), dst: Some("b".into()) }
        );
    }

    #[test]
    fn fire_with_note_value() {
        let Command::Fire { name, kind, value, when } = "fire a keydown A4".parse::<Command>().unwrap() else {
            panic!("not a fire");
        };
        assert_eq!(name, "a");
        assert_eq!(kind, EventKind::KeyDown);
        assert_relative_eq!(value, 440.0, epsilon = 1e-3);
        assert_eq!(when, When::Immediate);
    }

    #[test]
    fn queue_is_deferred() {
        let Command::Fire { value, when, .. } = "queue a hz 330".parse::<Command>().unwrap() else {
            panic!("not a fire");
        };
        assert_eq!(value, 330.0);
        assert_eq!(when, When::Deferred);
    }

    #[test]
    fn fire_without_value_and_custom_kinds() {
        let Command::Fire { kind, value, .. } = "fire d Cutoff".parse::<Command>().unwrap() else {
            panic!("not a fire");
        };
        assert_eq!(kind, EventKind::Custom("cutoff".into()));
        assert_eq!(value, 0.0);
    }

    #[test]
    fn topology_events_cannot_be_fired() {
        assert!(matches!("fire a kill".parse::<Command>(), Err(Error::Command(_))));
        assert!(matches!("fire a connect 1".parse::<Command>(), Err(Error::Command(_))));
    }

    #[test]
    fn sleep() {
        assert_eq!("sleep 0.25".parse::<Command>().unwrap(), Command::Sleep(Duration::from_millis(250)));
        assert!("sleep -1".parse::<Command>().is_err());
        assert!("sleep soon".parse::<Command>().is_err());
        assert!("sleep 1e300".parse::<Command>().is_err());
        assert!("sleep inf".parse::<Command>().is_err());
    }

    #[test]
    fn bad_input() {
        assert!(matches!("frobnicate x".parse::<Command>(), Err(Error::Command(_))));
        assert!(matches!("connect a".parse::<Command>(), Err(Error::Command(_))));
        assert!(matches!("fire a hz loud".parse::<Command>(), Err(Error::Command(_))));
    }

    #[test]
    fn script_errors_carry_line_numbers() {
        let err = parse_script("add sine a\nconnect a\n").unwrap_err();
        assert!(err.to_string().contains("line 2"), "{}", err);
        assert_eq!(parse_script("add sine a\n\nquit").unwrap().len(), 2);
    }
}

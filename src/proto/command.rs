use std::fmt;

/// Reserved key carrying the message number. Never stored as an ordinary parameter.
pub const MSG_KEY: &str = "msg";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SetRgb,
    Ack,
    Nack,
    /// Unrecognised command name; only ever produced by decoding.
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Red,
    Green,
    Blue,
    Msg,
    Invalid,
}

pub type Value = u16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Param {
    pub key: Key,
    pub value: Value,
}

impl Param {
    pub const fn new(key: Key, value: Value) -> Self {
        Self { key, value }
    }
}

/* ---------- vocabulary tables ---------- */

struct KeyRule {
    key: Key,
    max: Value,
}

struct CommandEntry {
    name: &'static str,
    command: Command,
    keys: &'static [KeyRule],
}

const RGB_KEYS: &[KeyRule] = &[
    KeyRule {
        key: Key::Red,
        max: u8::MAX as Value,
    },
    KeyRule {
        key: Key::Green,
        max: u8::MAX as Value,
    },
    KeyRule {
        key: Key::Blue,
        max: u8::MAX as Value,
    },
];

const COMMANDS: &[CommandEntry] = &[
    CommandEntry {
        name: "set_rgb",
        command: Command::SetRgb,
        keys: RGB_KEYS,
    },
    CommandEntry {
        name: "ack",
        command: Command::Ack,
        keys: &[],
    },
    CommandEntry {
        name: "nack",
        command: Command::Nack,
        keys: &[],
    },
];

const KEYS: &[(&str, Key)] = &[
    ("red", Key::Red),
    ("green", Key::Green),
    ("blue", Key::Blue),
    (MSG_KEY, Key::Msg),
];

fn entry(command: Command) -> Option<&'static CommandEntry> {
    COMMANDS.iter().find(|e| e.command == command)
}

impl Command {
    /// Map a wire name to a command. Unknown names yield [`Command::Invalid`].
    pub fn from_name(name: &str) -> Command {
        COMMANDS
            .iter()
            .find(|e| e.name == name)
            .map_or(Command::Invalid, |e| e.command)
    }

    /// Wire name, or `None` for [`Command::Invalid`].
    pub fn name(self) -> Option<&'static str> {
        entry(self).map(|e| e.name)
    }
}

impl Key {
    /// Map a wire name to a key regardless of command. Unknown names yield [`Key::Invalid`].
    pub fn from_name(name: &str) -> Key {
        KEYS.iter()
            .find(|(n, _)| *n == name)
            .map_or(Key::Invalid, |(_, k)| *k)
    }

    /// Map a wire name to a key accepted by `command`. Keys the command does
    /// not take (including `msg`) yield [`Key::Invalid`].
    pub fn for_command(command: Command, name: &str) -> Key {
        let key = Key::from_name(name);
        match entry(command) {
            Some(e) if e.keys.iter().any(|r| r.key == key) => key,
            _ => Key::Invalid,
        }
    }

    pub fn name(self) -> Option<&'static str> {
        KEYS.iter().find(|(_, k)| *k == self).map(|(n, _)| *n)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name().unwrap_or("<invalid>"))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name().unwrap_or("<invalid>"))
    }
}

/// Check an ordinary parameter against the rules of `command`.
///
/// `msg` is not an ordinary parameter and is never valid here; the parser
/// handles it before consulting this table.
pub fn validate(command: Command, key: Key, value: Value) -> bool {
    entry(command)
        .and_then(|e| e.keys.iter().find(|r| r.key == key))
        .is_some_and(|r| value <= r.max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_names_roundtrip() {
        for cmd in [Command::SetRgb, Command::Ack, Command::Nack] {
            let name = cmd.name().unwrap();
            assert_eq!(Command::from_name(name), cmd);
        }
        assert_eq!(Command::from_name("set_rgb"), Command::SetRgb);
        assert_eq!(Command::from_name("SET_RGB"), Command::Invalid);
        assert_eq!(Command::from_name(""), Command::Invalid);
        assert_eq!(Command::Invalid.name(), None);
    }

    #[test]
    fn key_lookup_is_scoped_to_command() {
        assert_eq!(Key::from_name("msg"), Key::Msg);
        assert_eq!(Key::from_name("purple"), Key::Invalid);
        assert_eq!(Key::for_command(Command::SetRgb, "green"), Key::Green);
        assert_eq!(Key::for_command(Command::Ack, "green"), Key::Invalid);
        assert_eq!(Key::for_command(Command::SetRgb, "msg"), Key::Invalid);
        assert_eq!(Key::for_command(Command::Invalid, "red"), Key::Invalid);
        assert_eq!(Key::Blue.name(), Some("blue"));
        assert_eq!(Key::Invalid.name(), None);
    }

    #[test]
    fn rgb_channel_bounds() {
        assert!(validate(Command::SetRgb, Key::Red, 0));
        assert!(validate(Command::SetRgb, Key::Red, 255));
        assert!(!validate(Command::SetRgb, Key::Red, 256));
        assert!(validate(Command::SetRgb, Key::Blue, 128));
        assert!(!validate(Command::SetRgb, Key::Green, u16::MAX));
    }

    #[test]
    fn unknown_combinations_rejected() {
        assert!(!validate(Command::Ack, Key::Red, 1));
        assert!(!validate(Command::Nack, Key::Blue, 1));
        assert!(!validate(Command::SetRgb, Key::Msg, 1));
        assert!(!validate(Command::SetRgb, Key::Invalid, 1));
        assert!(!validate(Command::Invalid, Key::Red, 1));
    }
}

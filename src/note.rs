//! Note names in scientific pitch notation.

use core::fmt;
use core::str::FromStr;

use crate::error::Error;

#[derive(Clone, Debug, PartialEq)]
pub struct Note {
    name: String,
    hz: f32,
}

impl Note {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hz(&self) -> f32 {
        self.hz
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Parse `C4`, `a#3`, `Eb2` and the like. `A4` is 440 Hz, equal temperament.
pub fn parse_note(s: &str) -> Result<Note, Error> {
    let bad = || Error::Command(format!("not a note: '{}'", s));
    let lower = s.trim().to_ascii_lowercase();
    let mut chars = lower.chars().peekable();

    let (letter, mut offset) = match chars.next().ok_or_else(bad)? {
        'c' => ('C', 0),
        'd' => ('D', 2),
        'e' => ('E', 4),
        'f' => ('F', 5),
        'g' => ('G', 7),
        'a' => ('A', 9),
        'b' => ('B', 11),
        _ => return Err(bad()),
    };
    let mut name = letter.to_string();

    match chars.peek() {
        Some('#') => {
            offset += 1;
            name.push('#');
            chars.next();
        }
        Some('b') => {
            offset -= 1;
            name.push('b');
            chars.next();
        }
        _ => {}
    }

    let octave = chars.next().and_then(|c| c.to_digit(10)).ok_or_else(bad)? as i32;
    if chars.next().is_some() {
        return Err(bad());
    }
    name.push_str(&octave.to_string());

    let midi = 12 * (octave + 1) + offset;
    let hz = 440.0 * 2f32.powf((midi - 69) as f32 / 12.0);
    Ok(Note { name, hz })
}

impl FromStr for Note {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_note(s)
    }
}

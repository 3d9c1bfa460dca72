//! Input atomisation.
//!
//! Breaks the input into the atomic units the reducer works on. Lines keep
//! their terminators so that concatenating any sub-sequence of atoms yields
//! a byte-faithful candidate file.

use std::str::FromStr;

/// Granularity of the initial split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Atom {
    /// One unit per line, terminator included.
    #[default]
    Line,
    /// One unit per character.
    Char,
}

impl FromStr for Atom {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "line" => Ok(Self::Line),
            "char" => Ok(Self::Char),
            other => Err(format!("unknown atom '{other}'; valid atoms: line, char")),
        }
    }
}

/// Split `src` into atoms.
#[must_use]
pub fn split_atoms(src: &str, atom: Atom) -> Vec<String> {
    match atom {
        Atom::Line => src.split_inclusive('\n').map(str::to_owned).collect(),
        Atom::Char => src.chars().map(String::from).collect(),
    }
}

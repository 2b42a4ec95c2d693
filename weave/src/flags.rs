//! The fixed-schema `^Af` flag lines (§6.1).

use crate::errors::{Error, Result};

/// The `l` flag: which releases are locked against further deltas.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LockedReleases {
    All,
    Releases(Vec<u32>),
}

/// All flags a history file may carry. Every field defaults to "unset", matching a freshly
/// created file that was never given any `admin -f`/`admin -a` arguments.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Flags {
    pub branching: bool,
    pub ceiling: Option<u32>,
    pub floor: Option<u32>,
    pub default_sid: Option<String>,
    pub id_keyword_required: bool,
    pub joint_edit: bool,
    pub locked: Option<LockedReleases>,
    pub module: Option<String>,
    pub null_deltas: bool,
    pub user_def: Option<String>,
    pub encoded: bool,
    pub file_type: Option<String>,
    pub mr_validator: Option<String>,
    pub executable: bool,
    pub subst_letters: Option<Vec<char>>,
}

impl Flags {
    pub fn new() -> Flags {
        Flags::default()
    }

    /// Parse one already-stripped `^Af` line body, e.g. `"b"`, `"c1.2"`, `"m module"`.
    pub fn apply_line(&mut self, letter: char, value: &str) -> Result<()> {
        let value = value.trim();
        match letter {
            'b' => self.branching = true,
            'c' => self.ceiling = Some(parse_release(letter, value)?),
            'f' => self.floor = Some(parse_release(letter, value)?),
            'd' => self.default_sid = Some(value.to_string()),
            'i' => self.id_keyword_required = true,
            'j' => self.joint_edit = true,
            'l' => {
                self.locked = Some(if value == "a" {
                    LockedReleases::All
                } else {
                    let mut rels = Vec::new();
                    for part in value.split(',').filter(|s| !s.is_empty()) {
                        rels.push(parse_release(letter, part)?);
                    }
                    LockedReleases::Releases(rels)
                })
            }
            'm' => self.module = Some(value.to_string()),
            'n' => self.null_deltas = true,
            'q' => self.user_def = Some(value.to_string()),
            'e' => {
                self.encoded = match value {
                    "1" => true,
                    "0" | "" => false,
                    other => {
                        return Err(Error::InvalidFlagValue { letter, value: other.to_string() })
                    }
                }
            }
            't' => self.file_type = Some(value.to_string()),
            'v' => self.mr_validator = Some(value.to_string()),
            'x' => self.executable = true,
            'y' => self.subst_letters = Some(value.chars().filter(|c| !c.is_whitespace()).collect()),
            other => {
                return Err(Error::InvalidFlagValue { letter: other, value: value.to_string() })
            }
        }
        Ok(())
    }

    /// Serialize back to `^Af` line bodies (without the `\x01f` prefix), in a fixed order so
    /// that repeated writes of unchanged flags are byte-identical (the "idempotent admin"
    /// property, §8).
    pub fn to_lines(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.branching {
            out.push("b".to_string());
        }
        if let Some(c) = self.ceiling {
            out.push(format!("c{}", c));
        }
        if let Some(f) = self.floor {
            out.push(format!("f{}", f));
        }
        if let Some(d) = &self.default_sid {
            out.push(format!("d {}", d));
        }
        if self.id_keyword_required {
            out.push("i".to_string());
        }
        if self.joint_edit {
            out.push("j".to_string());
        }
        match &self.locked {
            Some(LockedReleases::All) => out.push("l a".to_string()),
            Some(LockedReleases::Releases(rels)) => {
                let joined = rels.iter().map(|r| r.to_string()).collect::<Vec<_>>().join(",");
                out.push(format!("l {}", joined));
            }
            None => (),
        }
        if let Some(m) = &self.module {
            out.push(format!("m {}", m));
        }
        if self.null_deltas {
            out.push("n".to_string());
        }
        if let Some(q) = &self.user_def {
            out.push(format!("q {}", q));
        }
        if self.encoded {
            out.push("e 1".to_string());
        }
        if let Some(t) = &self.file_type {
            out.push(format!("t {}", t));
        }
        if let Some(v) = &self.mr_validator {
            out.push(format!("v {}", v));
        }
        if self.executable {
            out.push("x".to_string());
        }
        if let Some(letters) = &self.subst_letters {
            out.push(format!("y {}", letters.iter().collect::<String>()));
        }
        out
    }
}

fn parse_release(letter: char, value: &str) -> Result<u32> {
    value
        .parse()
        .map_err(|_| Error::InvalidFlagValue { letter, value: value.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_lines() {
        let mut f = Flags::new();
        f.apply_line('b', "").unwrap();
        f.apply_line('c', "3").unwrap();
        f.apply_line('m', "widget").unwrap();
        f.apply_line('l', "a").unwrap();

        let lines = f.to_lines();
        let mut reparsed = Flags::new();
        for line in &lines {
            let mut chars = line.chars();
            let letter = chars.next().unwrap();
            reparsed.apply_line(letter, chars.as_str()).unwrap();
        }
        assert_eq!(f, reparsed);
    }

    #[test]
    fn invalid_encoded_value() {
        let mut f = Flags::new();
        assert!(f.apply_line('e', "2").is_err());
    }
}

//! `%X%` keyword substitution over extracted text (§4.3).
//!
//! Runs one line at a time so that `Extract` can interleave it with the weave traversal without
//! materialising the whole file twice.

use std::fs;
use std::path::{Path, PathBuf};

use sccs_weave::{Date, Sid};

/// Everything a single line's worth of keyword expansion needs to know. Built once per
/// extraction and reused for every line; `Extract` is responsible for bumping `line_no` between
/// calls.
#[derive(Clone, Debug)]
pub struct KeywordContext {
    pub module: Option<String>,
    pub sid: Sid,
    /// The gotten delta's recorded date (`%E%`/`%G%`/`%U%`).
    pub delta_date: Date,
    /// Wall-clock date at extraction time (`%D%`/`%H%`/`%T%`).
    pub now: Date,
    pub file_type: Option<String>,
    pub user_def: Option<String>,
    pub s_file: PathBuf,
    /// The `y` flag's letter restriction, if any: when present, only these letters expand.
    pub allowed_letters: Option<Vec<char>>,
    /// Override for the `%W%` shorthand (`wstring` in §4.4), used by some callers in place of
    /// the default `%Z%%M%\t%I%` expansion.
    pub wstring_override: Option<String>,
}

impl KeywordContext {
    fn letter_allowed(&self, letter: char) -> bool {
        match &self.allowed_letters {
            Some(letters) => letters.contains(&letter),
            None => true,
        }
    }
}

/// Keyword expansion engine. Stateless; every call takes the context it needs.
pub struct KeywordSubst;

impl KeywordSubst {
    /// Expand every recognised `%X%` occurrence in `line`. Returns the expanded text and whether
    /// any keyword was actually found (consulted by the "id keywords required" flag check).
    ///
    /// When `suppress` is set (the `-k` mode, or `for_edit` extraction), the line is returned
    /// verbatim and `found` is always `false`.
    pub fn expand_line(ctx: &KeywordContext, line: &str, line_no: u32, suppress: bool) -> (String, bool) {
        if suppress {
            return (line.to_string(), false);
        }
        expand_inner(ctx, line, line_no, true)
    }
}

/// Whether `text` contains at least one recognised `%X%` keyword, without performing any
/// substitution. Used by the `i` flag's "missing keyword is an error" check (§4.3, §6.1): that
/// check runs against the unexpanded new text at delta time, so scanning is kept separate from
/// [`KeywordSubst::expand_line`] rather than threaded through its `suppress` path.
pub fn contains_recognised_keyword(text: &str) -> bool {
    let mut rest = text;
    while let Some(pos) = rest.find('%') {
        let after = &rest[pos + 1..];
        let Some(end) = after.find('%') else { break };
        let candidate = &after[..end];
        let mut chars = candidate.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if is_recognised_letter(c) {
                return true;
            }
        }
        rest = &after[end + 1..];
    }
    false
}

fn is_recognised_letter(letter: char) -> bool {
    matches!(
        letter,
        'M' | 'I' | 'R' | 'L' | 'B' | 'S' | 'D' | 'H' | 'T' | 'E' | 'G' | 'U' | 'Y' | 'F' | 'P' | 'Q' | 'C'
            | 'Z' | 'W' | 'A'
    )
}

fn expand_inner(ctx: &KeywordContext, line: &str, line_no: u32, allow_w_recursion: bool) -> (String, bool) {
    let mut out = String::with_capacity(line.len());
    let mut found = false;
    let mut rest = line;

    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let Some(end) = after.find('%') else {
            // Unterminated `%`: emit it literally and stop scanning.
            out.push('%');
            out.push_str(after);
            return (out, found);
        };

        let candidate = &after[..end];
        let mut chars = candidate.chars();
        let letter = match (chars.next(), chars.next()) {
            (Some(c), None) => Some(c),
            _ => None,
        };

        match letter.filter(|&l| ctx.letter_allowed(l)).and_then(|l| expand_letter(ctx, l, line_no, allow_w_recursion)) {
            Some(value) => {
                out.push_str(&value);
                found = true;
            }
            None => {
                out.push('%');
                out.push_str(candidate);
                out.push('%');
            }
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    (out, found)
}

fn expand_letter(ctx: &KeywordContext, letter: char, line_no: u32, allow_w_recursion: bool) -> Option<String> {
    match letter {
        'M' => Some(ctx.module.clone().unwrap_or_else(|| base_name(&ctx.s_file))),
        'I' => Some(ctx.sid.to_string()),
        'R' => Some(ctx.sid.release.to_string()),
        'L' => Some(ctx.sid.level.to_string()),
        'B' => Some(ctx.sid.branch.to_string()),
        'S' => Some(ctx.sid.sequence.to_string()),
        'D' => Some(ctx.now.format_letter('D')),
        'H' => Some(ctx.now.format_letter('H')),
        'T' => Some(ctx.now.format_letter('T')),
        'E' => Some(ctx.delta_date.format_letter('D')),
        'G' => Some(ctx.delta_date.format_letter('H')),
        'U' => Some(ctx.delta_date.format_letter('T')),
        'Y' => Some(ctx.file_type.clone().unwrap_or_default()),
        'F' => Some(base_name(&ctx.s_file)),
        'P' => Some(canonical_path(&ctx.s_file)),
        'Q' => Some(ctx.user_def.clone().unwrap_or_default()),
        'C' => Some(line_no.to_string()),
        'Z' => Some("@(#)".to_string()),
        'W' => {
            if !allow_w_recursion {
                return None;
            }
            let template = ctx.wstring_override.clone().unwrap_or_else(|| "%Z%%M%\t%I%".to_string());
            Some(expand_inner(ctx, &template, line_no, false).0)
        }
        'A' => {
            if !allow_w_recursion {
                return None;
            }
            let template = "%Z%%Y% %M% %I%%Z%".to_string();
            Some(expand_inner(ctx, &template, line_no, false).0)
        }
        _ => None,
    }
}

fn base_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}

fn canonical_path(path: &Path) -> String {
    fs::canonicalize(path).map(|p| p.display().to_string()).unwrap_or_else(|_| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> KeywordContext {
        KeywordContext {
            module: Some("widget".to_string()),
            sid: Sid::trunk(1, 2),
            delta_date: Date::parse("24/03/05 13:45:09").unwrap(),
            now: Date::parse("24/03/06 08:00:00").unwrap(),
            file_type: Some("c".to_string()),
            user_def: None,
            s_file: PathBuf::from("/tmp/s.widget.c"),
            allowed_letters: None,
            wstring_override: None,
        }
    }

    #[test]
    fn expands_sid_and_components() {
        let (out, found) = KeywordSubst::expand_line(&ctx(), "id=%I% rel=%R%", 1, false);
        assert_eq!(out, "id=1.2 rel=1");
        assert!(found);
    }

    #[test]
    fn unknown_letter_passes_through() {
        let (out, found) = KeywordSubst::expand_line(&ctx(), "keep %X% as-is", 1, false);
        assert_eq!(out, "keep %X% as-is");
        assert!(!found);
    }

    #[test]
    fn suppressed_expansion_is_verbatim() {
        let (out, found) = KeywordSubst::expand_line(&ctx(), "id=%I%", 1, true);
        assert_eq!(out, "id=%I%");
        assert!(!found);
    }

    #[test]
    fn w_shorthand_expands_once() {
        let (out, _found) = KeywordSubst::expand_line(&ctx(), "%W%", 1, false);
        assert_eq!(out, "@(#)widget\t1.2");
    }

    #[test]
    fn keyword_scan_finds_recognised_letters_without_expanding() {
        assert!(contains_recognised_keyword("id=%I%"));
        assert!(!contains_recognised_keyword("no keywords here"));
        assert!(!contains_recognised_keyword("unknown %X% letter"));
    }

    #[test]
    fn y_flag_restricts_letters() {
        let mut c = ctx();
        c.allowed_letters = Some(vec!['I']);
        let (out, found) = KeywordSubst::expand_line(&c, "%I% %M%", 1, false);
        assert_eq!(out, "1.2 %M%");
        assert!(found);
    }
}

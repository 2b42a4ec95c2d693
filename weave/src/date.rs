//! SCCS-style two-digit-year dates.
//!
//! On disk a date is always `yy/mm/dd hh:mm:ss`. The two-digit year is windowed the classical
//! way: `yy >= 69` means `19yy`, anything smaller means `20yy`.

use std::fmt;

use chrono::{Datelike, NaiveDateTime, Timelike};

use crate::errors::{Error, Result};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Date(NaiveDateTime);

const WINDOW_PIVOT: i32 = 69;

impl Date {
    pub fn from_naive(dt: NaiveDateTime) -> Date {
        Date(dt)
    }

    pub fn naive(&self) -> NaiveDateTime {
        self.0
    }

    /// Parse the on-disk `yy/mm/dd hh:mm:ss` representation.
    pub fn parse(text: &str) -> Result<Date> {
        let mut parts = text.split_whitespace();
        let date_part = parts.next().ok_or_else(|| malformed(text))?;
        let time_part = parts.next().ok_or_else(|| malformed(text))?;
        if parts.next().is_some() {
            return Err(malformed(text));
        }

        let mut dp = date_part.split('/');
        let yy: i32 = dp.next().ok_or_else(|| malformed(text))?.parse()?;
        let mm: u32 = dp.next().ok_or_else(|| malformed(text))?.parse()?;
        let dd: u32 = dp.next().ok_or_else(|| malformed(text))?.parse()?;
        if dp.next().is_some() {
            return Err(malformed(text));
        }

        let mut tp = time_part.split(':');
        let hh: u32 = tp.next().ok_or_else(|| malformed(text))?.parse()?;
        let mi: u32 = tp.next().ok_or_else(|| malformed(text))?.parse()?;
        let ss: u32 = tp.next().ok_or_else(|| malformed(text))?.parse()?;
        if tp.next().is_some() {
            return Err(malformed(text));
        }

        let year = if yy >= WINDOW_PIVOT { 1900 + yy } else { 2000 + yy };

        let date = chrono::NaiveDate::from_ymd_opt(year, mm, dd)
            .ok_or_else(|| malformed(text))?;
        let time = chrono::NaiveTime::from_hms_opt(hh, mi, ss).ok_or_else(|| malformed(text))?;
        Ok(Date(NaiveDateTime::new(date, time)))
    }

    /// Render the on-disk `yy/mm/dd hh:mm:ss` representation. The year is always folded into
    /// two digits, which is lossy outside of 1969-2068; that window matches the classical tool.
    pub fn to_disk_string(&self) -> String {
        format!(
            "{:02}/{:02}/{:02} {:02}:{:02}:{:02}",
            self.0.year().rem_euclid(100),
            self.0.month(),
            self.0.day(),
            self.0.hour(),
            self.0.minute(),
            self.0.second()
        )
    }

    /// Render one of the classical per-letter keyword forms: `D` is `yy/mm/dd`, `H` is
    /// `mm/dd/yy`, `T` is `hh:mm:ss`.
    pub fn format_letter(&self, letter: char) -> String {
        match letter {
            'D' => format!("{:02}/{:02}/{:02}", self.0.year().rem_euclid(100), self.0.month(), self.0.day()),
            'H' => format!("{:02}/{:02}/{:02}", self.0.month(), self.0.day(), self.0.year().rem_euclid(100)),
            'T' => format!("{:02}:{:02}:{:02}", self.0.hour(), self.0.minute(), self.0.second()),
            _ => String::new(),
        }
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_disk_string())
    }
}

fn malformed(text: &str) -> Error {
    Error::Malformed(format!("bad date {:?}", text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let d = Date::parse("24/03/05 13:45:09").unwrap();
        assert_eq!(d.to_disk_string(), "24/03/05 13:45:09");
    }

    #[test]
    fn window_pivot() {
        let old = Date::parse("70/01/01 00:00:00").unwrap();
        assert_eq!(old.naive().date().year(), 1970);
        let new = Date::parse("24/01/01 00:00:00").unwrap();
        assert_eq!(new.naive().date().year(), 2024);
    }

    #[test]
    fn keyword_forms() {
        let d = Date::parse("24/03/05 13:45:09").unwrap();
        assert_eq!(d.format_letter('D'), "24/03/05");
        assert_eq!(d.format_letter('H'), "03/05/24");
        assert_eq!(d.format_letter('T'), "13:45:09");
    }
}

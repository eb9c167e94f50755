//! Time window tokens such as `3y`, `6m` or `all`

use std::fmt;
use std::str::FromStr;

use chrono::{Months, NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::error::{PanelError, Result};

/// Unit of a window span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WindowUnit {
    Years,
    Months,
    Weeks,
    Days,
    Hours,
    Minutes,
    Seconds,
    Microseconds,
}

impl WindowUnit {
    /// Map a unit character to its unit. `m` is months and `M` is minutes.
    pub fn from_symbol(c: char) -> Option<Self> {
        match c {
            'y' => Some(Self::Years),
            'm' => Some(Self::Months),
            'w' => Some(Self::Weeks),
            'd' => Some(Self::Days),
            'h' => Some(Self::Hours),
            'M' => Some(Self::Minutes),
            's' => Some(Self::Seconds),
            'u' => Some(Self::Microseconds),
            _ => None,
        }
    }

    pub fn symbol(&self) -> char {
        match self {
            Self::Years => 'y',
            Self::Months => 'm',
            Self::Weeks => 'w',
            Self::Days => 'd',
            Self::Hours => 'h',
            Self::Minutes => 'M',
            Self::Seconds => 's',
            Self::Microseconds => 'u',
        }
    }
}

/// A bounded window: `count` units back from the as-of date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowSpan {
    pub count: u32,
    pub unit: WindowUnit,
}

impl WindowSpan {
    pub fn new(count: u32, unit: WindowUnit) -> Self {
        Self { count, unit }
    }

    /// Subtract this span from `end` using calendar arithmetic.
    ///
    /// Years and months clamp to the last valid day of the target month,
    /// so one month before March 31 is the last day of February.
    /// Returns `None` when the result falls outside the representable range.
    pub fn subtract_from(&self, end: NaiveDateTime) -> Option<NaiveDateTime> {
        let count = i64::from(self.count);
        match self.unit {
            WindowUnit::Years => self
                .count
                .checked_mul(12)
                .and_then(|months| end.checked_sub_months(Months::new(months))),
            WindowUnit::Months => end.checked_sub_months(Months::new(self.count)),
            WindowUnit::Weeks => TimeDelta::try_weeks(count).and_then(|d| end.checked_sub_signed(d)),
            WindowUnit::Days => TimeDelta::try_days(count).and_then(|d| end.checked_sub_signed(d)),
            WindowUnit::Hours => TimeDelta::try_hours(count).and_then(|d| end.checked_sub_signed(d)),
            WindowUnit::Minutes => {
                TimeDelta::try_minutes(count).and_then(|d| end.checked_sub_signed(d))
            }
            WindowUnit::Seconds => {
                TimeDelta::try_seconds(count).and_then(|d| end.checked_sub_signed(d))
            }
            WindowUnit::Microseconds => end.checked_sub_signed(TimeDelta::microseconds(count)),
        }
    }
}

/// A parsed window token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Window {
    Span(WindowSpan),
    /// `all`: no lower time bound
    Unbounded,
}

impl Window {
    pub fn is_unbounded(&self) -> bool {
        matches!(self, Window::Unbounded)
    }

    /// Inclusive lower bound of the window ending at `end`.
    ///
    /// `None` means there is no lower bound, either because the window is
    /// unbounded or because the span reaches past the earliest representable time.
    pub fn lower_bound(&self, end: NaiveDateTime) -> Option<NaiveDateTime> {
        match self {
            Window::Span(span) => span.subtract_from(end),
            Window::Unbounded => None,
        }
    }
}

/// Parse a window token: `<digits><unit>` with unit in `ymwdhMsu`, or `all`.
pub fn parse_window(token: &str) -> Result<Window> {
    if token == "all" {
        return Ok(Window::Unbounded);
    }

    let invalid = || PanelError::Parse(format!("Invalid delta string: '{}'", token));

    let unit_char = token.chars().last().ok_or_else(invalid)?;
    let unit = WindowUnit::from_symbol(unit_char).ok_or_else(invalid)?;
    let digits = &token[..token.len() - unit_char.len_utf8()];

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let count: u32 = digits.parse().map_err(|_| invalid())?;

    Ok(Window::Span(WindowSpan::new(count, unit)))
}

impl FromStr for Window {
    type Err = PanelError;

    fn from_str(s: &str) -> Result<Self> {
        parse_window(s)
    }
}

impl TryFrom<String> for Window {
    type Error = PanelError;

    fn try_from(value: String) -> Result<Self> {
        parse_window(&value)
    }
}

impl From<Window> for String {
    fn from(window: Window) -> Self {
        window.to_string()
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Window::Span(span) => write!(f, "{}{}", span.count, span.unit.symbol()),
            Window::Unbounded => write!(f, "all"),
        }
    }
}

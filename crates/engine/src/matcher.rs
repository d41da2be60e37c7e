//! Year gating for user operations.

use core::fmt;

/// Inclusive year range an operation applies to. An open end means
/// "onwards"; an open start means "from the beginning". Operations whose
/// matcher does not cover the current year are no-ops.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct YearMatcher {
    /// First year the operation applies to.
    pub start: Option<i32>,
    /// Last year the operation applies to.
    pub end: Option<i32>,
}

impl YearMatcher {
    /// Applies in every year.
    pub const fn any() -> Self {
        Self {
            start: None,
            end: None,
        }
    }

    /// Applies in exactly one year.
    pub const fn in_year(year: i32) -> Self {
        Self {
            start: Some(year),
            end: Some(year),
        }
    }

    /// Applies from `year` onwards.
    pub const fn starting(year: i32) -> Self {
        Self {
            start: Some(year),
            end: None,
        }
    }

    /// Applies over an inclusive range.
    pub const fn between(start: i32, end: i32) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// Whether the matcher covers a year.
    pub fn matches(&self, year: i32) -> bool {
        self.start.map_or(true, |start| year >= start) && self.end.map_or(true, |end| year <= end)
    }
}

impl fmt::Display for YearMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.start, self.end) {
            (None, None) => f.write_str("all years"),
            (Some(start), None) => write!(f, "{start} onwards"),
            (None, Some(end)) => write!(f, "through {end}"),
            (Some(start), Some(end)) if start == end => write!(f, "{start}"),
            (Some(start), Some(end)) => write!(f, "{start} to {end}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(YearMatcher::any(), 1990, true)]
    #[case(YearMatcher::in_year(2028), 2028, true)]
    #[case(YearMatcher::in_year(2028), 2029, false)]
    #[case(YearMatcher::starting(2028), 2100, true)]
    #[case(YearMatcher::starting(2028), 2027, false)]
    #[case(YearMatcher::between(2025, 2030), 2030, true)]
    #[case(YearMatcher::between(2025, 2030), 2031, false)]
    fn matches_inclusive_ranges(
        #[case] matcher: YearMatcher,
        #[case] year: i32,
        #[case] expected: bool,
    ) {
        assert_eq!(matcher.matches(year), expected);
    }
}

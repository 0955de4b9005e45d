//! Date sequencing for the archive walk.
//!
//! A [`DateRange`] is validated once, at construction, against the source's
//! archive floor. Iteration is then a plain finite walk one calendar day at a
//! time, inclusive of both bounds, either forwards ([`Direction::Ascending`])
//! or backwards from the end bound ([`Direction::Countdown`]).

use crate::error::ConfigError;
use chrono::NaiveDate;
use serde::Deserialize;

/// Order in which dates are visited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Oldest first; resumable with fast-forward.
    #[default]
    Ascending,
    /// Newest first, down to the start bound.
    Countdown,
}

/// Inclusive, validated range of listing dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
    direction: Direction,
}

impl DateRange {
    /// Validate `start..=end` against `floor`.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::InvertedRange`] if `start > end`
    /// - [`ConfigError::BeforeFloor`] if `start < floor`
    pub fn new(
        start: NaiveDate,
        end: NaiveDate,
        floor: NaiveDate,
        direction: Direction,
    ) -> Result<Self, ConfigError> {
        if start > end {
            return Err(ConfigError::InvertedRange { start, end });
        }
        if start < floor {
            return Err(ConfigError::BeforeFloor { date: start, floor });
        }
        Ok(Self {
            start,
            end,
            direction,
        })
    }

    /// First date the walk visits.
    pub fn first(&self) -> NaiveDate {
        match self.direction {
            Direction::Ascending => self.start,
            Direction::Countdown => self.end,
        }
    }

    /// Last date the walk visits.
    pub fn last(&self) -> NaiveDate {
        match self.direction {
            Direction::Ascending => self.end,
            Direction::Countdown => self.start,
        }
    }

    /// Number of dates in the range.
    pub fn len(&self) -> usize {
        (self.end - self.start).num_days() as usize + 1
    }

    pub fn iter(&self) -> DateIter {
        DateIter {
            next: Some(self.first()),
            last: self.last(),
            direction: self.direction,
            remaining: self.len(),
        }
    }
}

/// Lazy iterator over a [`DateRange`].
#[derive(Debug, Clone)]
pub struct DateIter {
    next: Option<NaiveDate>,
    last: NaiveDate,
    direction: Direction,
    remaining: usize,
}

impl Iterator for DateIter {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        let current = self.next?;
        // Bounds were validated against the floor, so stepping toward `last`
        // never leaves chrono's representable range.
        self.next = if current == self.last {
            None
        } else {
            match self.direction {
                Direction::Ascending => current.succ_opt(),
                Direction::Countdown => current.pred_opt(),
            }
        };
        self.remaining -= 1;
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for DateIter {}

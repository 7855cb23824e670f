//! Offset pagination bookkeeping.
//!
//! [`PageTracker`] decides the offset of each round and when a paginated
//! fetch is complete. The caller performs the actual queries.

use thiserror::Error;

/// Pagination ran for more rounds than allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("pagination exceeded {max_rounds} rounds")]
pub struct RoundLimitExceeded {
    /// The configured round ceiling.
    pub max_rounds: usize,
}

/// What the caller should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStep {
    /// Fetch one page at `offset` with `limit` records.
    Fetch {
        /// Offset of the page.
        offset: usize,
        /// Page size.
        limit: usize,
    },
    /// All records have been fetched.
    Done,
}

/// Tracks rounds and fetched records for one paginated fetch.
///
/// A fetch is complete when a page comes back short, or when the number of
/// fetched records reaches the total reported by the store.
///
/// The round ceiling is exclusive when the store omits the total: a table of
/// exactly `page_size * max_rounds` records needs one more round to see the
/// short page, so it fails with [`RoundLimitExceeded`]. With a reported total
/// the same table completes in `max_rounds` rounds.
#[derive(Debug, Clone)]
pub struct PageTracker {
    page_size: usize,
    max_rounds: usize,
    rounds: usize,
    fetched: usize,
    done: bool,
}

impl PageTracker {
    /// Create a tracker.
    ///
    /// # Panics
    ///
    /// Panics if `page_size` is zero.
    pub fn new(page_size: usize, max_rounds: usize) -> Self {
        assert!(page_size > 0, "page_size must be > 0");
        Self {
            page_size,
            max_rounds,
            rounds: 0,
            fetched: 0,
            done: false,
        }
    }

    /// The next step, counting a new round when a fetch is due.
    ///
    /// Errors once `max_rounds` rounds were issued without finishing.
    pub fn next_step(&mut self) -> Result<PageStep, RoundLimitExceeded> {
        if self.done {
            return Ok(PageStep::Done);
        }
        if self.rounds >= self.max_rounds {
            return Err(RoundLimitExceeded {
                max_rounds: self.max_rounds,
            });
        }
        let offset = self.rounds * self.page_size;
        self.rounds += 1;
        Ok(PageStep::Fetch {
            offset,
            limit: self.page_size,
        })
    }

    /// Record the outcome of the last fetched page.
    pub fn record_page(&mut self, len: usize, total_count: Option<usize>) {
        self.fetched += len;
        let short_page = len < self.page_size;
        let reached_total = total_count.is_some_and(|total| self.fetched >= total);
        if short_page || reached_total {
            self.done = true;
        }
    }

    /// Rounds issued so far.
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    /// Records fetched so far.
    pub fn fetched(&self) -> usize {
        self.fetched
    }

    /// Whether the fetch is complete.
    pub fn is_done(&self) -> bool {
        self.done
    }
}

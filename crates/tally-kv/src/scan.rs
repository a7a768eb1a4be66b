//! Paged range iteration.

use crate::error::StoreError;
use crate::traits::Transaction;
use crate::types::KeyValue;
use crate::types::RangeOptions;
use crate::types::key_after;

/// Walks `[begin, end)` one bounded page at a time.
///
/// After each page the remaining bounds shrink past the last returned key, so
/// a scanner can be stopped at any point and its [`RangeScanner::remaining`]
/// bounds used to resume later, even from another transaction.
#[derive(Debug, Clone)]
pub struct RangeScanner {
    begin: Vec<u8>,
    end: Vec<u8>,
    options: RangeOptions,
    exhausted: bool,
}

impl RangeScanner {
    pub fn new(begin: Vec<u8>, end: Vec<u8>, options: RangeOptions) -> Self {
        let exhausted = begin >= end;
        Self {
            begin,
            end,
            options,
            exhausted,
        }
    }

    /// Fetch the next page, or `None` once the range is exhausted.
    pub async fn next_page<T>(&mut self, tr: &T) -> Result<Option<Vec<KeyValue>>, StoreError>
    where T: Transaction + ?Sized {
        if self.exhausted {
            return Ok(None);
        }

        let result = tr.get_range(&self.begin, &self.end, self.options).await?;
        match result.entries.last() {
            Some(last) if self.options.reverse => self.end = last.key.clone(),
            Some(last) => self.begin = key_after(&last.key),
            None => {}
        }
        if !result.more || result.entries.is_empty() {
            self.exhausted = true;
        }

        if result.entries.is_empty() {
            Ok(None)
        } else {
            Ok(Some(result.entries))
        }
    }

    /// Bounds not yet returned.
    pub fn remaining(&self) -> (&[u8], &[u8]) {
        (&self.begin, &self.end)
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

//! Record filters decide which records are worth an email.

use crate::record::Record;
use eyre::Result;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Predicate over records.
///
/// Filters are configuration-supplied code, so they may fail: an `Err` (or a
/// panic) is reported as a dispatch error rather than silently treated as
/// `false`.
pub trait RecordFilter: Send + Sync {
    fn accept(&self, record: &Record) -> Result<bool>;
}

/// Default filter, lets every record through
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl RecordFilter for AcceptAll {
    fn accept(&self, _record: &Record) -> Result<bool> {
        Ok(true)
    }
}

/// Adapts an infallible closure
pub struct FnFilter<F>(pub F);

impl<F> RecordFilter for FnFilter<F>
where
    F: Fn(&Record) -> bool + Send + Sync,
{
    fn accept(&self, record: &Record) -> Result<bool> {
        Ok((self.0)(record))
    }
}

impl<F> fmt::Debug for FnFilter<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnFilter")
    }
}

/// Adapts a fallible closure
pub struct TryFnFilter<F>(pub F);

impl<F> RecordFilter for TryFnFilter<F>
where
    F: Fn(&Record) -> Result<bool> + Send + Sync,
{
    fn accept(&self, record: &Record) -> Result<bool> {
        (self.0)(record)
    }
}

impl<F> fmt::Debug for TryFnFilter<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TryFnFilter")
    }
}

/// Accepts records whose level is one of the given labels (case-insensitive)
#[derive(Debug, Clone)]
pub struct LevelFilter {
    levels: Vec<String>,
}

impl LevelFilter {
    pub fn new<I, S>(levels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            levels: levels.into_iter().map(Into::into).collect(),
        }
    }
}

impl RecordFilter for LevelFilter {
    fn accept(&self, record: &Record) -> Result<bool> {
        Ok(self
            .levels
            .iter()
            .any(|level| level.eq_ignore_ascii_case(&record.level)))
    }
}

/// Run a filter, converting a panic into an error.
pub(crate) fn evaluate(filter: &dyn RecordFilter, record: &Record) -> Result<bool> {
    match catch_unwind(AssertUnwindSafe(|| filter.accept(record))) {
        Ok(result) => result,
        Err(payload) => Err(eyre::eyre!(
            "filter panicked: {}",
            crate::error::panic_message(payload.as_ref())
        )),
    }
}

//! Record sources.
//!
//! A [`RecordSource`] hands out `(index, record)` pairs, each exactly once,
//! to however many pipeline slots ask for them concurrently. Indices start at
//! zero and increase by one per record handed out.

use std::convert::Infallible;
use std::fs::File;
use std::io::Read;
use std::iter::{Enumerate, Peekable};
use std::path::Path;

use parking_lot::Mutex;

use super::error::SourceError;
use crate::config::CopyOptions;
use crate::error::BoxError;

/// Supplies records to the pipeline.
///
/// Implementations must serialize concurrent calls to [`next_record`] so that
/// no record is handed out twice.
///
/// [`next_record`]: RecordSource::next_record
pub trait RecordSource: Send + Sync + 'static {
    /// Record type handed to the statement builder.
    type Record: Send + 'static;

    /// Fetch the next record.
    ///
    /// Returns `Ok(None)` once the source is exhausted. Exhaustion is not an
    /// error and is reported to every subsequent caller.
    fn next_record(&self) -> Result<Option<(u64, Self::Record)>, SourceError>;

    /// Returns true if the source is known to have no records at all.
    ///
    /// The writer skips starting any slot for an empty source.
    fn is_empty(&self) -> bool {
        false
    }
}

// =============================================================================
// Iterator-backed source
// =============================================================================

/// Record source over any iterator of fallible items.
///
/// An `Err` item is reported as a fetch failure for that position.
pub struct IterSource<I: Iterator> {
    inner: Mutex<Peekable<Enumerate<I>>>,
}

impl<I: Iterator> IterSource<I> {
    /// Wrap an iterator, numbering its items from zero.
    pub fn new(items: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            inner: Mutex::new(items.into_iter().enumerate().peekable()),
        }
    }
}

impl<T> IterSource<std::vec::IntoIter<Result<T, Infallible>>> {
    /// Source over plain values that can never fail.
    pub fn from_values(values: impl IntoIterator<Item = T>) -> Self {
        Self::new(values.into_iter().map(Ok).collect::<Vec<_>>())
    }
}

impl<I, T, E> RecordSource for IterSource<I>
where
    I: Iterator<Item = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
    type Record = T;

    fn next_record(&self) -> Result<Option<(u64, T)>, SourceError> {
        match self.inner.lock().next() {
            None => Ok(None),
            Some((index, Ok(record))) => Ok(Some((index as u64, record))),
            Some((_, Err(e))) => Err(SourceError::Other(e.into())),
        }
    }

    fn is_empty(&self) -> bool {
        self.inner.lock().peek().is_none()
    }
}

// =============================================================================
// Delimited-file source
// =============================================================================

/// Record source over delimited text rows.
///
/// Each record is the row's fields as strings. Rows may have differing
/// widths; width checking is left to the statement builder.
pub struct CsvSource<R: Read> {
    state: Mutex<CsvState<R>>,
}

struct CsvState<R: Read> {
    records: csv::StringRecordsIntoIter<R>,
    pending_skip: u64,
    remaining: Option<u64>,
    next_index: u64,
    peeked: Option<Result<Option<Vec<String>>, SourceError>>,
}

impl<R: Read> CsvState<R> {
    fn read_row(&mut self) -> Result<Option<Vec<String>>, SourceError> {
        if let Some(peeked) = self.peeked.take() {
            return peeked;
        }

        while self.pending_skip > 0 {
            match self.records.next() {
                Some(row) => {
                    self.pending_skip -= 1;
                    row?;
                }
                None => {
                    self.pending_skip = 0;
                    return Ok(None);
                }
            }
        }

        if self.remaining == Some(0) {
            return Ok(None);
        }

        match self.records.next() {
            None => Ok(None),
            Some(row) => {
                let row = row?;
                if let Some(remaining) = self.remaining.as_mut() {
                    *remaining -= 1;
                }
                Ok(Some(row.iter().map(str::to_owned).collect()))
            }
        }
    }
}

impl<R: Read> CsvSource<R> {
    /// Read rows from `reader` using the delimiter, quote, header, skip and
    /// limit settings in `options`.
    pub fn new(reader: R, options: &CopyOptions) -> Self {
        let records = csv::ReaderBuilder::new()
            .delimiter(options.delimiter)
            .quote(options.quote)
            .has_headers(options.header)
            .flexible(true)
            .from_reader(reader)
            .into_records();

        Self {
            state: Mutex::new(CsvState {
                records,
                pending_skip: options.skip_rows,
                remaining: options.max_rows,
                next_index: 0,
                peeked: None,
            }),
        }
    }
}

impl CsvSource<File> {
    /// Open a delimited file.
    pub fn from_path(path: impl AsRef<Path>, options: &CopyOptions) -> Result<Self, SourceError> {
        let file = File::open(path.as_ref())?;
        Ok(Self::new(file, options))
    }
}

impl<R> RecordSource for CsvSource<R>
where
    R: Read + Send + 'static,
{
    type Record = Vec<String>;

    fn next_record(&self) -> Result<Option<(u64, Vec<String>)>, SourceError> {
        let mut state = self.state.lock();
        let row = state.read_row()?;
        Ok(row.map(|row| {
            let index = state.next_index;
            state.next_index += 1;
            (index, row)
        }))
    }

    fn is_empty(&self) -> bool {
        let mut state = self.state.lock();
        let row = state.read_row();
        let empty = matches!(row, Ok(None));
        state.peeked = Some(row);
        empty
    }
}

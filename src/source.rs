//! Record sources.
//!
//! A source is pulled, never pushed: the driver asks for the next record only
//! after the previous one has left the pipeline. After a fault the source is
//! dead and every later pull reports end-of-sequence.

use std::io::Read;

use crate::error::BoxError;
use crate::record::{Record, Value};

/// A lazy, finite sequence of records.
pub trait Source: Send {
    /// Pull the next record. `Ok(None)` marks the end of the sequence.
    fn pull(&mut self) -> Result<Option<Record>, BoxError>;

    /// The display name of this source.
    fn name(&self) -> &str {
        "Source"
    }
}

impl<S: Source + ?Sized> Source for Box<S> {
    fn pull(&mut self) -> Result<Option<Record>, BoxError> {
        (**self).pull()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Adapts an iterator of fallible records into a [`Source`].
pub struct IterSource<I> {
    iter: Option<I>,
}

impl<I, E> IterSource<I>
where
    I: Iterator<Item = Result<Record, E>> + Send,
    E: Into<BoxError>,
{
    pub fn new(iter: I) -> Self {
        Self { iter: Some(iter) }
    }
}

impl<I, E> Source for IterSource<I>
where
    I: Iterator<Item = Result<Record, E>> + Send,
    E: Into<BoxError>,
{
    fn pull(&mut self) -> Result<Option<Record>, BoxError> {
        let Some(iter) = self.iter.as_mut() else {
            return Ok(None);
        };
        match iter.next() {
            Some(Ok(record)) => Ok(Some(record)),
            Some(Err(e)) => {
                self.iter = None;
                Err(e.into())
            }
            None => {
                self.iter = None;
                Ok(None)
            }
        }
    }
}

/// Build a source over records that cannot fail.
pub fn from_records(records: Vec<Record>) -> impl Source {
    IterSource::new(records.into_iter().map(Ok::<_, BoxError>))
}

/// Decodes delimited text with a header row into records of text fields.
///
/// Rows shorter than the header leave their trailing fields absent; extra
/// cells beyond the header are ignored.
pub struct DelimitedSource<R> {
    reader: csv::Reader<R>,
    headers: Option<Vec<String>>,
    row: csv::StringRecord,
    dead: bool,
}

impl<R: Read + Send> DelimitedSource<R> {
    pub fn new(input: R, delimiter: u8) -> Self {
        let reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(input);
        Self {
            reader,
            headers: None,
            row: csv::StringRecord::new(),
            dead: false,
        }
    }

    fn load_headers(&mut self) -> Result<(), csv::Error> {
        if self.headers.is_none() {
            let headers = self.reader.headers()?.iter().map(str::to_string).collect();
            self.headers = Some(headers);
        }
        Ok(())
    }

    fn next_row(&mut self) -> Result<Option<Record>, csv::Error> {
        self.load_headers()?;
        if !self.reader.read_record(&mut self.row)? {
            return Ok(None);
        }
        let headers = self.headers.as_deref().unwrap_or_default();
        let mut record = Record::new();
        for (name, cell) in headers.iter().zip(self.row.iter()) {
            record.set(name, Value::from(cell));
        }
        Ok(Some(record))
    }
}

impl<R: Read + Send> Source for DelimitedSource<R> {
    fn pull(&mut self) -> Result<Option<Record>, BoxError> {
        if self.dead {
            return Ok(None);
        }
        match self.next_row() {
            Ok(Some(record)) => Ok(Some(record)),
            Ok(None) => {
                self.dead = true;
                Ok(None)
            }
            Err(e) => {
                self.dead = true;
                Err(e.into())
            }
        }
    }
}

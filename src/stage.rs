//! The stage abstraction and generic closure-backed stages.
//!
//! A `Stage` takes ownership of one record and hands back zero or one
//! record. Returning `Ok(None)` drops the record; returning `Err` is a
//! transform fault that halts the run.

use crate::error::BoxError;
use crate::record::Record;

/// A single transformation or filtering step in the pipeline.
///
/// Stages run on the driver's worker and must not suspend. The record is
/// moved in and moved out, so a stage cannot keep it after returning.
pub trait Stage: Send {
    /// Process a single record, returning the record to pass downstream or
    /// `None` to drop it.
    fn process(&mut self, record: Record) -> Result<Option<Record>, BoxError>;

    /// The display name of this stage, used to tag faults and traces.
    fn name(&self) -> &str;
}

impl<S: Stage + ?Sized> Stage for Box<S> {
    fn process(&mut self, record: Record) -> Result<Option<Record>, BoxError> {
        (**self).process(record)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Map stage: transforms every record, never drops.
pub struct Map<F> {
    name: String,
    f: F,
}

impl<F> Map<F>
where
    F: FnMut(Record) -> Record + Send,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Stage for Map<F>
where
    F: FnMut(Record) -> Record + Send,
{
    fn process(&mut self, record: Record) -> Result<Option<Record>, BoxError> {
        Ok(Some((self.f)(record)))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Fallible map stage: an `Err` from the closure becomes a transform fault.
pub struct TryMap<F> {
    name: String,
    f: F,
}

impl<F> TryMap<F>
where
    F: FnMut(Record) -> Result<Record, BoxError> + Send,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Stage for TryMap<F>
where
    F: FnMut(Record) -> Result<Record, BoxError> + Send,
{
    fn process(&mut self, record: Record) -> Result<Option<Record>, BoxError> {
        (self.f)(record).map(Some)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Filter stage: keeps records for which the predicate returns `true`.
pub struct Filter<P> {
    name: String,
    keep: P,
}

impl<P> Filter<P>
where
    P: FnMut(&Record) -> bool + Send,
{
    pub fn new(name: impl Into<String>, keep: P) -> Self {
        Self {
            name: name.into(),
            keep,
        }
    }
}

impl<P> Stage for Filter<P>
where
    P: FnMut(&Record) -> bool + Send,
{
    fn process(&mut self, record: Record) -> Result<Option<Record>, BoxError> {
        if (self.keep)(&record) {
            Ok(Some(record))
        } else {
            Ok(None)
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Value;

    #[test]
    fn test_map_stage() {
        let mut stage = Map::new("TAG", |r: Record| r.with("tagged", true));
        let out = stage.process(Record::new()).unwrap().unwrap();
        assert_eq!(out.get("tagged"), Some(&Value::Flag(true)));
        assert_eq!(stage.name(), "TAG");
    }

    #[test]
    fn test_try_map_error_passes_through() {
        let mut stage = TryMap::new("STRICT", |r: Record| {
            if r.get("id").is_some() {
                Ok(r)
            } else {
                Err("missing id".into())
            }
        });
        assert!(stage.process(Record::new().with("id", "1")).unwrap().is_some());
        let err = stage.process(Record::new()).unwrap_err();
        assert_eq!(err.to_string(), "missing id");
    }

    #[test]
    fn test_filter_keep_and_drop() {
        let mut stage = Filter::new("HAS_NAME", |r: &Record| r.get("name").is_some());
        assert!(stage.process(Record::new().with("name", "Al")).unwrap().is_some());
        assert!(stage.process(Record::new()).unwrap().is_none());
    }

    #[test]
    fn test_boxed_stage_delegates() {
        let mut stage: Box<dyn Stage> = Box::new(Filter::new("NONE", |_: &Record| false));
        assert_eq!(stage.name(), "NONE");
        assert!(stage.process(Record::new()).unwrap().is_none());
    }
}

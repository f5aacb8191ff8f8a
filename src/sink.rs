//! Terminal consumers of surviving records.
//!
//! A sink reports its own faults through the same `Result` channel as every
//! other stage, so the driver tags and surfaces them uniformly.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::BoxError;
use crate::record::Record;

/// Terminal consumer of the pipeline.
pub trait Sink: Send {
    /// Accept one surviving record.
    fn accept(&mut self, record: Record) -> Result<(), BoxError>;

    /// End of run: called once after the last record, before completion is
    /// reported. Not called for faulted or cancelled runs.
    fn finish(&mut self) -> Result<(), BoxError> {
        Ok(())
    }

    /// The display name of this sink.
    fn name(&self) -> &str {
        "Sink"
    }
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn accept(&mut self, record: Record) -> Result<(), BoxError> {
        (**self).accept(record)
    }

    fn finish(&mut self) -> Result<(), BoxError> {
        (**self).finish()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

// ---------------------------------------------------------------------------
// CollectSink
// ---------------------------------------------------------------------------

/// Shared view of the records gathered by a [`CollectSink`].
#[derive(Clone, Default)]
pub struct Collected {
    records: Arc<Mutex<Vec<Record>>>,
    finished: Arc<Mutex<bool>>,
}

impl Collected {
    /// Snapshot of the records accepted so far.
    pub fn records(&self) -> Vec<Record> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the sink's `finish` has run.
    pub fn is_finished(&self) -> bool {
        *self.finished.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Gathers records in memory.
#[derive(Default)]
pub struct CollectSink {
    collected: Collected,
}

impl CollectSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle that stays readable after the sink is moved into a pipeline.
    pub fn handle(&self) -> Collected {
        self.collected.clone()
    }
}

impl Sink for CollectSink {
    fn accept(&mut self, record: Record) -> Result<(), BoxError> {
        self.collected
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
        Ok(())
    }

    fn finish(&mut self) -> Result<(), BoxError> {
        *self
            .collected
            .finished
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = true;
        Ok(())
    }

    fn name(&self) -> &str {
        "Collect"
    }
}

// ---------------------------------------------------------------------------
// CallbackSink
// ---------------------------------------------------------------------------

type RecordCallback = Box<dyn FnMut(Record) + Send>;
type EndCallback = Box<dyn FnOnce() + Send>;

/// Observer sink: one callback per surviving record, one at end of run.
pub struct CallbackSink {
    on_record: RecordCallback,
    on_end: Option<EndCallback>,
}

impl CallbackSink {
    pub fn new(on_record: impl FnMut(Record) + Send + 'static) -> Self {
        Self {
            on_record: Box::new(on_record),
            on_end: None,
        }
    }

    pub fn on_end(mut self, on_end: impl FnOnce() + Send + 'static) -> Self {
        self.on_end = Some(Box::new(on_end));
        self
    }
}

impl Sink for CallbackSink {
    fn accept(&mut self, record: Record) -> Result<(), BoxError> {
        (self.on_record)(record);
        Ok(())
    }

    fn finish(&mut self) -> Result<(), BoxError> {
        if let Some(on_end) = self.on_end.take() {
            on_end();
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "Callback"
    }
}

// ---------------------------------------------------------------------------
// WriteSink
// ---------------------------------------------------------------------------

/// Serialization used by [`WriteSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// One JSON object per line, fields in record order.
    JsonLines,
    /// Delimited text with a header row taken from the first record.
    Delimited { delimiter: u8 },
}

enum Output<W: Write> {
    Json(W),
    Delimited {
        writer: csv::Writer<W>,
        header: Option<Vec<String>>,
    },
}

/// Byte-writing destination for serialized records.
///
/// Output is flushed by `finish`; wrap `W` in a `BufWriter` for files.
pub struct WriteSink<W: Write> {
    output: Output<W>,
}

impl<W: Write + Send> WriteSink<W> {
    pub fn new(writer: W, format: OutputFormat) -> Self {
        let output = match format {
            OutputFormat::JsonLines => Output::Json(writer),
            OutputFormat::Delimited { delimiter } => Output::Delimited {
                writer: csv::WriterBuilder::new()
                    .delimiter(delimiter)
                    .has_headers(false)
                    .from_writer(writer),
                header: None,
            },
        };
        Self { output }
    }

    /// Recover the underlying writer, flushing buffered output.
    pub fn into_inner(self) -> Result<W, BoxError> {
        match self.output {
            Output::Json(writer) => Ok(writer),
            Output::Delimited { writer, .. } => writer
                .into_inner()
                .map_err(|e| io::Error::new(e.error().kind(), e.error().to_string()).into()),
        }
    }
}

impl<W: Write + Send> Sink for WriteSink<W> {
    fn accept(&mut self, record: Record) -> Result<(), BoxError> {
        match &mut self.output {
            Output::Json(writer) => {
                serde_json::to_writer(&mut *writer, &record)?;
                writer.write_all(b"\n")?;
            }
            Output::Delimited { writer, header } => {
                if header.is_none() {
                    let names: Vec<String> = record.field_names().map(str::to_string).collect();
                    writer.write_record(&names)?;
                    *header = Some(names);
                }
                let names = header.as_deref().unwrap_or_default();
                let row = names
                    .iter()
                    .map(|name| record.get(name).map(|v| v.to_cell()).unwrap_or_default());
                writer.write_record(row)?;
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), BoxError> {
        match &mut self.output {
            Output::Json(writer) => writer.flush()?,
            Output::Delimited { writer, .. } => writer.flush()?,
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "Writer"
    }
}

// ---------------------------------------------------------------------------
// Logged
// ---------------------------------------------------------------------------

/// Emits a `tracing` event for each record the inner sink accepts.
pub struct Logged<S> {
    inner: S,
}

impl<S: Sink> Logged<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S: Sink> Sink for Logged<S> {
    fn accept(&mut self, record: Record) -> Result<(), BoxError> {
        // The record moves into the inner sink, so render it first, and only
        // when the event would be recorded.
        let rendered = tracing::enabled!(tracing::Level::INFO).then(|| record.to_string());
        self.inner.accept(record)?;
        if let Some(rendered) = rendered {
            tracing::info!(sink = self.inner.name(), record = %rendered, "record accepted");
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), BoxError> {
        self.inner.finish()?;
        tracing::debug!(sink = self.inner.name(), "sink finished");
        Ok(())
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn user(name: &str, age: f64) -> Record {
        Record::new()
            .with("name", name)
            .with("age", age)
            .with("isActive", true)
    }

    #[test]
    fn test_collect_sink_handle() {
        let mut sink = CollectSink::new();
        let handle = sink.handle();
        sink.accept(user("Al", 19.0)).unwrap();
        sink.accept(user("Bo", 18.0)).unwrap();
        assert_eq!(handle.len(), 2);
        assert!(!handle.is_finished());
        sink.finish().unwrap();
        assert!(handle.is_finished());
        assert_eq!(handle.records()[1], user("Bo", 18.0));
    }

    #[test]
    fn test_callback_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let ended = Arc::new(AtomicBool::new(false));
        let mut sink = {
            let seen = Arc::clone(&seen);
            let ended = Arc::clone(&ended);
            CallbackSink::new(move |r| seen.lock().unwrap().push(r))
                .on_end(move || ended.store(true, Ordering::SeqCst))
        };
        sink.accept(user("Al", 19.0)).unwrap();
        assert!(!ended.load(Ordering::SeqCst));
        sink.finish().unwrap();
        assert!(ended.load(Ordering::SeqCst));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_write_sink_json_lines() {
        let mut sink = WriteSink::new(Vec::new(), OutputFormat::JsonLines);
        sink.accept(user("Al", 19.0)).unwrap();
        sink.accept(user("Cy", f64::NAN)).unwrap();
        sink.finish().unwrap();
        let text = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        assert_eq!(
            text,
            "{\"name\":\"Al\",\"age\":19.0,\"isActive\":true}\n\
             {\"name\":\"Cy\",\"age\":null,\"isActive\":true}\n"
        );
    }

    #[test]
    fn test_write_sink_delimited() {
        let mut sink = WriteSink::new(Vec::new(), OutputFormat::Delimited { delimiter: b';' });
        sink.accept(user("Al", 19.0)).unwrap();
        sink.accept(Record::new().with("name", "Bo")).unwrap();
        sink.finish().unwrap();
        let text = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        assert_eq!(text, "name;age;isActive\nAl;19;true\nBo;;\n");
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_sink_reports_io_fault() {
        let mut sink = WriteSink::new(BrokenPipe, OutputFormat::JsonLines);
        let err = sink.accept(user("Al", 19.0)).unwrap_err();
        assert!(err.to_string().contains("pipe closed"));
    }

    #[test]
    fn test_logged_delegates() {
        let inner = CollectSink::new();
        let handle = inner.handle();
        let mut sink = Logged::new(inner);
        assert_eq!(sink.name(), "Collect");
        sink.accept(user("Al", 19.0)).unwrap();
        sink.finish().unwrap();
        assert_eq!(handle.len(), 1);
        assert!(handle.is_finished());
    }

    #[test]
    fn test_logged_accepts_with_info_enabled() {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_test_writer()
            .finish();
        let inner = CollectSink::new();
        let handle = inner.handle();
        let mut sink = Logged::new(inner);
        tracing::subscriber::with_default(subscriber, || {
            sink.accept(user("Al", 19.0)).unwrap();
            sink.accept(user("Bo", 18.0)).unwrap();
        });
        assert_eq!(handle.len(), 2);
        assert_eq!(handle.records()[0], user("Al", 19.0));
    }

    #[test]
    fn test_logged_propagates_inner_fault() {
        let mut sink = Logged::new(WriteSink::new(BrokenPipe, OutputFormat::JsonLines));
        assert!(sink.accept(user("Al", 19.0)).is_err());
    }
}

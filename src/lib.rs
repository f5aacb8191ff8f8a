//! # rowpipe
//!
//! A record-at-a-time pipeline for delimited text records.
//!
//! Records are pulled from a source one at a time, pushed through an ordered
//! list of stages and handed to a sink. The driver never pulls ahead of the
//! sink, so at most one record is in flight, and every run ends in exactly
//! one [`Completion`].
//!
//! ## Overview
//!
//! - **Source**: decodes delimited text into records ([`DelimitedSource`])
//! - **Stages**: normalize fields ([`FieldMapper`]) and filter records
//!   ([`ActiveAgeFilter`]), or any closure via [`Map`] and [`Filter`]
//! - **Sink**: collects, observes or writes surviving records
//! - **Driver**: runs the chain and reports success, failure or cancellation
//!
//! ## Example
//!
//! ```
//! use rowpipe::{CollectSink, DelimitedSource, Driver, Pipeline, PipelineConfig, default_stages};
//!
//! let input = "name;email;age;salary;isActive\n\
//!              Al;X@Y.com;19;50000;true\n\
//!              Bo;z@z.com;25;60000;true\n";
//!
//! let config = PipelineConfig::default();
//! let sink = CollectSink::new();
//! let collected = sink.handle();
//!
//! let source = DelimitedSource::new(input.as_bytes(), b';');
//! let pipeline = Pipeline::with_stages(default_stages(&config), sink);
//! let completion = Driver::new(source, pipeline).run();
//!
//! assert_eq!(completion.report().unwrap().accepted, 1);
//! assert_eq!(collected.len(), 1);
//! ```

pub mod config;
pub mod debug_trace;
pub mod driver;
pub mod error;
pub mod record;
pub mod record_stage;
pub mod sink;
pub mod source;
pub mod stage;

pub use config::PipelineConfig;
pub use debug_trace::{RecordTrace, RunTrace};
pub use driver::{
    CancelToken, Completion, Driver, DriverState, Pipeline, RunHandle, RunReport, run_all,
};
pub use error::{BoxError, ConfigError, Fault};
pub use record::{Record, Value};
pub use record_stage::{ActiveAgeFilter, FieldKind, FieldMapper, FieldRule, default_stages};
pub use sink::{CallbackSink, CollectSink, Collected, Logged, OutputFormat, Sink, WriteSink};
pub use source::{DelimitedSource, IterSource, Source, from_records};
pub use stage::{Filter, Map, Stage, TryMap};

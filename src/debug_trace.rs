//! Debug trace types for the pipeline driver.
//!
//! These types capture the journey of each source record through the
//! stage chain, enabling inspection of where a record was dropped.

use std::fmt;

use crate::record::Record;

/// Trace of one source record's journey through the pipeline.
///
/// `pipe_points[0]` is the record as pulled from the source and
/// `pipe_points[i]` is the output of stage `i-1`. Once a stage drops the
/// record every later pipe point is `None`. Length is `num_stages + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordTrace {
    /// Record present at each pipe point between stages.
    pub pipe_points: Vec<Option<Record>>,
    /// Whether the sink accepted the record.
    pub accepted: bool,
}

impl RecordTrace {
    /// Index of the stage that dropped the record, if any.
    pub fn dropped_at(&self) -> Option<usize> {
        self.pipe_points
            .iter()
            .position(Option::is_none)
            .and_then(|point| point.checked_sub(1))
    }
}

/// Complete debug trace of a pipeline run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunTrace {
    /// Names of each stage in the pipeline.
    pub stage_names: Vec<String>,
    /// One trace per source record, in arrival order.
    pub record_traces: Vec<RecordTrace>,
}

impl fmt::Display for RunTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, trace) in self.record_traces.iter().enumerate() {
            writeln!(f, "record #{i}")?;
            for (point, record) in trace.pipe_points.iter().enumerate() {
                let label = match point {
                    0 => "Source",
                    n => self.stage_names.get(n - 1).map_or("?", String::as_str),
                };
                match record {
                    Some(record) => writeln!(f, "  {label:<10} {record}")?,
                    None => writeln!(f, "  {label:<10} (dropped)")?,
                }
                if record.is_none() {
                    break;
                }
            }
            if trace.accepted {
                writeln!(f, "  {:<10} accepted", "Sink")?;
            }
        }
        Ok(())
    }
}

//! Foreground half of the handoff: drain without blocking, keep the
//! time series, hand each record to a display sink.

use std::thread;
use std::time::Duration;

use chronoamp_frame::{Record, FIELD_COUNT, HEADERS};
use tracing::trace;

use crate::queue::{QueuePoll, RecordReceiver};

/// Anything that displays records as they arrive.
pub trait RecordSink {
    /// Called once per record, after it was appended to `series`.
    fn render(&mut self, record: &Record, series: &TimeSeries);

    /// Called when a poll found nothing to do.
    fn idle(&mut self) {}
}

/// Per-column history of every record the consumer has seen.
#[derive(Debug, Clone, Default)]
pub struct TimeSeries {
    columns: Vec<Vec<f64>>,
}

impl TimeSeries {
    pub fn new() -> Self {
        Self {
            columns: vec![Vec::new(); FIELD_COUNT],
        }
    }

    pub fn push(&mut self, record: &Record) {
        if self.columns.len() != FIELD_COUNT {
            self.columns = vec![Vec::new(); FIELD_COUNT];
        }
        for (column, value) in self.columns.iter_mut().zip(record.fields()) {
            column.push(*value);
        }
    }

    pub fn len(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values of a named column (see [`HEADERS`]).
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        let index = HEADERS.iter().position(|h| *h == name)?;
        self.columns.get(index).map(Vec::as_slice)
    }

    /// Shared x-axis: the first channel's elapsed time.
    pub fn x_axis(&self) -> &[f64] {
        self.column("time1").unwrap_or(&[])
    }

    /// Current history of a 1-based channel.
    pub fn current(&self, channel: usize) -> Option<&[f64]> {
        self.column(&format!("i{channel}"))
    }

    /// Bias voltage history of a 1-based channel.
    pub fn bias(&self, channel: usize) -> Option<&[f64]> {
        self.column(&format!("v_bias{channel}"))
    }

    /// `(min, max)` of a named column, ignoring NaN.
    pub fn range(&self, name: &str) -> Option<(f64, f64)> {
        self.column(name)?
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    /// Most recent record, rebuilt from the columns.
    pub fn last(&self) -> Option<Record> {
        if self.is_empty() {
            return None;
        }
        let mut fields = [0.0; FIELD_COUNT];
        for (slot, column) in fields.iter_mut().zip(&self.columns) {
            *slot = *column.last()?;
        }
        Some(Record::new(fields))
    }
}

/// Outcome of one [`ConsumerLoop::poll_once`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerPoll {
    /// This many records were drained and rendered.
    Rendered(usize),
    /// Queue empty, producer still running.
    Idle,
    /// Queue empty and the producer is gone.
    Closed,
}

pub struct ConsumerLoop<S> {
    queue: RecordReceiver,
    series: TimeSeries,
    sink: S,
}

impl<S: RecordSink> ConsumerLoop<S> {
    pub fn new(queue: RecordReceiver, sink: S) -> Self {
        Self {
            queue,
            series: TimeSeries::new(),
            sink,
        }
    }

    /// Drain the records queued at the time of the call. Never blocks.
    ///
    /// Records that arrive while the sink is rendering wait for the next
    /// call, so a producer outpacing the sink cannot keep this from
    /// returning.
    pub fn poll_once(&mut self) -> ConsumerPoll {
        let budget = self.queue.len().max(1);
        let mut rendered = 0;
        while rendered < budget {
            match self.queue.poll() {
                QueuePoll::Record(record) => {
                    // Width is fixed by `Record`; nothing else to validate.
                    self.series.push(&record);
                    self.sink.render(&record, &self.series);
                    rendered += 1;
                }
                QueuePoll::Empty | QueuePoll::Closed if rendered > 0 => break,
                QueuePoll::Empty => {
                    self.sink.idle();
                    return ConsumerPoll::Idle;
                }
                QueuePoll::Closed => return ConsumerPoll::Closed,
            }
        }
        ConsumerPoll::Rendered(rendered)
    }

    /// Poll until the producer is gone and the queue is drained, or `stop`
    /// returns true. `stop` is asked after every poll, busy or not. Sleeps
    /// `idle_sleep` between empty polls.
    ///
    /// Returns the number of records rendered.
    pub fn run_until(&mut self, idle_sleep: Duration, mut stop: impl FnMut() -> bool) -> usize {
        let mut total = 0;
        loop {
            let poll = self.poll_once();
            match poll {
                ConsumerPoll::Closed => break,
                ConsumerPoll::Rendered(n) => total += n,
                ConsumerPoll::Idle => {}
            }
            if stop() {
                break;
            }
            if poll == ConsumerPoll::Idle {
                trace!("consumer idle");
                thread::sleep(idle_sleep);
            }
        }
        total
    }

    pub fn series(&self) -> &TimeSeries {
        &self.series
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_parts(self) -> (TimeSeries, S) {
        (self.series, self.sink)
    }
}

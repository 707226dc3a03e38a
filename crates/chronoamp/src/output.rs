use std::io::{IsTerminal, Stdout, Write};
use std::path::Path;

use chronoamp_frame::{Record, CHANNEL_COUNT, HEADERS};
use chronoamp_session::{RecordSink, SessionSummary, TimeSeries};
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Csv,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        Self::default_for(std::io::stdout().is_terminal())
    }

    /// Terminals get records line by line as they arrive; `table` holds
    /// everything until the session ends, so it is opt-in only.
    fn default_for(terminal: bool) -> Self {
        if terminal {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct ChannelOutput {
    channel: usize,
    bias_voltage: f64,
    elapsed_time: f64,
    current: f64,
}

#[derive(Serialize)]
struct RecordOutput {
    event: &'static str,
    sample: usize,
    channels: Vec<ChannelOutput>,
}

#[derive(Serialize)]
struct ChannelSummary {
    channel: usize,
    last_current: Option<f64>,
    min_current: Option<f64>,
    max_current: Option<f64>,
}

#[derive(Serialize)]
struct SummaryOutput<'a> {
    event: &'static str,
    end_reason: String,
    frames: u64,
    records: u64,
    rejected: u64,
    log_path: Option<&'a Path>,
    channels: Vec<ChannelSummary>,
}

/// Prints records as the consumer receives them.
///
/// Table output is collected and rendered once by [`RecordPrinter::finish`];
/// every other format streams one line per record.
pub struct RecordPrinter<W: Write = Stdout> {
    format: OutputFormat,
    out: W,
    printed: usize,
    table: Table,
}

impl RecordPrinter<Stdout> {
    pub fn stdout(format: OutputFormat) -> Self {
        Self::new(format, std::io::stdout())
    }
}

impl<W: Write> RecordPrinter<W> {
    pub fn new(format: OutputFormat, out: W) -> Self {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(HEADERS.to_vec());
        Self {
            format,
            out,
            printed: 0,
            table,
        }
    }

    fn print(&mut self, record: &Record) {
        let sample = self.printed;
        let line = match self.format {
            OutputFormat::Json => {
                let out = RecordOutput {
                    event: "record",
                    sample,
                    channels: record
                        .channels()
                        .map(|c| ChannelOutput {
                            channel: c.channel,
                            bias_voltage: c.bias_voltage,
                            elapsed_time: c.elapsed_time,
                            current: c.current,
                        })
                        .collect(),
                };
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            }
            OutputFormat::Csv => {
                let _ = self.write_csv(sample == 0, record);
                return;
            }
            OutputFormat::Pretty => {
                let channels: Vec<String> = record
                    .channels()
                    .map(|c| format!("ch{} {} mV {} uA", c.channel, c.bias_voltage, c.current))
                    .collect();
                format!("#{sample} t={} {}", record.fields()[1], channels.join(" | "))
            }
            OutputFormat::Table => {
                self.table
                    .add_row(record.fields().iter().map(|v| v.to_string()).collect::<Vec<_>>());
                return;
            }
        };
        let _ = writeln!(self.out, "{line}");
        let _ = self.out.flush();
    }

    fn write_csv(&mut self, header: bool, record: &Record) -> csv::Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(&mut self.out);
        if header {
            writer.write_record(HEADERS)?;
        }
        writer.write_record(record.fields().iter().map(|v| v.to_string()))?;
        writer.flush()?;
        Ok(())
    }

    /// Emit anything held back until the end of the session.
    pub fn finish(&mut self) {
        if self.format == OutputFormat::Table && self.printed > 0 {
            let _ = writeln!(self.out, "{}", self.table);
            let _ = self.out.flush();
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> RecordSink for RecordPrinter<W> {
    fn render(&mut self, record: &Record, _series: &TimeSeries) {
        self.print(record);
        self.printed += 1;
    }
}

fn channel_summaries(series: &TimeSeries) -> Vec<ChannelSummary> {
    (1..=CHANNEL_COUNT)
        .map(|channel| {
            let name = format!("i{channel}");
            let range = series.range(&name);
            ChannelSummary {
                channel,
                last_current: series.current(channel).and_then(|c| c.last().copied()),
                min_current: range.map(|r| r.0),
                max_current: range.map(|r| r.1),
            }
        })
        .collect()
}

pub fn print_summary(
    out: &mut impl Write,
    summary: &SessionSummary,
    series: &TimeSeries,
    format: OutputFormat,
) {
    let channels = channel_summaries(series);
    match format {
        OutputFormat::Json => {
            let payload = SummaryOutput {
                event: "summary",
                end_reason: summary.end_reason.to_string(),
                frames: summary.frames,
                records: summary.records,
                rejected: summary.rejected,
                log_path: summary.log_path.as_deref(),
                channels,
            };
            let _ = writeln!(
                out,
                "{}",
                serde_json::to_string(&payload).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Csv => {}
        OutputFormat::Table | OutputFormat::Pretty => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CHANNEL", "LAST (uA)", "MIN (uA)", "MAX (uA)"]);
            for channel in &channels {
                table.add_row(vec![
                    channel.channel.to_string(),
                    display_opt(channel.last_current),
                    display_opt(channel.min_current),
                    display_opt(channel.max_current),
                ]);
            }
            let log = summary
                .log_path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "-".to_string());
            let _ = writeln!(
                out,
                "session ended: {} ({} records, {} rejected)\nlog: {log}\n{table}",
                summary.end_reason, summary.records, summary.rejected
            );
        }
    }
    let _ = out.flush();
}

fn display_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

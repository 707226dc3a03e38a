use std::fmt;

use crate::buffer::{CandidateFrame, FIELD_SEPARATOR};

/// Fields per line: bias voltage, elapsed time and current for each channel.
pub const FIELD_COUNT: usize = 12;

/// Fixed channel count of the device.
pub const CHANNEL_COUNT: usize = 4;

/// 0-based positions of the per-channel current readings.
pub const CURRENT_FIELDS: [usize; CHANNEL_COUNT] = [2, 5, 8, 11];

/// Raw sensor units per display unit (micro-amps).
pub const CURRENT_SCALE: f64 = 1000.0;

/// Canonical column order, shared by the wire format and the session log.
pub const HEADERS: [&str; FIELD_COUNT] = [
    "v_bias1", "time1", "i1", "v_bias2", "time2", "i2", "v_bias3", "time3", "i3", "v_bias4",
    "time4", "i4",
];

/// A decoded, unit-normalized measurement line.
///
/// Always exactly [`FIELD_COUNT`] values; currents are already in micro-amps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Record {
    fields: [f64; FIELD_COUNT],
}

/// One channel's slice of a [`Record`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelReading {
    /// 1-based channel number, as used in the column names.
    pub channel: usize,
    pub bias_voltage: f64,
    pub elapsed_time: f64,
    pub current: f64,
}

impl Record {
    pub fn new(fields: [f64; FIELD_COUNT]) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[f64; FIELD_COUNT] {
        &self.fields
    }

    /// Value of the named column (see [`HEADERS`]).
    pub fn get(&self, column: &str) -> Option<f64> {
        HEADERS
            .iter()
            .position(|h| *h == column)
            .map(|index| self.fields[index])
    }

    /// Reading of a 1-based channel number.
    pub fn channel(&self, channel: usize) -> Option<ChannelReading> {
        if channel == 0 || channel > CHANNEL_COUNT {
            return None;
        }
        let base = (channel - 1) * 3;
        Some(ChannelReading {
            channel,
            bias_voltage: self.fields[base],
            elapsed_time: self.fields[base + 1],
            current: self.fields[base + 2],
        })
    }

    pub fn channels(&self) -> impl Iterator<Item = ChannelReading> + '_ {
        (1..=CHANNEL_COUNT).filter_map(|channel| self.channel(channel))
    }
}

/// The twelve text fields of an accepted line, as they are written to the
/// session log (currents re-rendered after conversion).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    fields: [String; FIELD_COUNT],
}

impl RawFrame {
    pub fn fields(&self) -> &[String; FIELD_COUNT] {
        &self.fields
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }
}

impl fmt::Display for RawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fields.join(","))
    }
}

/// Result of decoding one accepted line.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub raw: RawFrame,
    pub record: Record,
}

/// Why a candidate frame was dropped.
///
/// Rejection is routine (header echoes, sentinel lines, noise) and never
/// aborts a session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Reject {
    #[error("line is not valid UTF-8")]
    NotUtf8,

    #[error("expected {} fields, found {found}", FIELD_COUNT)]
    FieldCount { found: usize },

    #[error("field {index} is not a number")]
    InvalidNumber { index: usize },
}

/// Validate a line and convert it into a [`Record`].
///
/// The line must split into exactly [`FIELD_COUNT`] comma-separated numbers.
/// Current fields are divided by [`CURRENT_SCALE`]. Any failure rejects the
/// whole line; no partial record is produced.
pub fn decode_frame(frame: &CandidateFrame) -> Result<DecodedFrame, Reject> {
    let text = frame.as_str().ok_or(Reject::NotUtf8)?;

    let parts: Vec<&str> = text.split(FIELD_SEPARATOR as char).collect();
    if parts.len() != FIELD_COUNT {
        return Err(Reject::FieldCount { found: parts.len() });
    }

    let mut values = [0.0f64; FIELD_COUNT];
    let mut raw: [String; FIELD_COUNT] = Default::default();

    for (index, part) in parts.iter().enumerate() {
        let trimmed = part.trim();
        let value: f64 = trimmed
            .parse()
            .map_err(|_| Reject::InvalidNumber { index })?;

        if CURRENT_FIELDS.contains(&index) {
            let scaled = value / CURRENT_SCALE;
            values[index] = scaled;
            raw[index] = render_number(scaled);
        } else {
            values[index] = value;
            raw[index] = trimmed.to_string();
        }
    }

    Ok(DecodedFrame {
        raw: RawFrame { fields: raw },
        record: Record::new(values),
    })
}

// Always carries a decimal point or exponent: 5.0, 1.234, 1e-7.
fn render_number(value: f64) -> String {
    format!("{value:?}")
}

//! Streaming normalizer: turns the raw line stream into timestamped blocks.
//!
//! A *normalized block* is a contiguous run of source lines sharing one
//! timestamp header and (optionally) a title. The machine is single-pass and
//! pure given the job date: `push` consumes one line and occasionally emits
//! the block the line closed; `finish` emits the final pending block.
//!
//! Upstream captures arrive in two encodings - proper UTF-8 and the
//! double-encoded (mojibake) form older exports carry - so every fixed
//! pattern below lists both byte forms verbatim. Do not "fix" the garbled
//! literals; they must match the bytes actually present in source material.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use dosar_types::{NormalizedBlock, OccurredAtQuality, PayloadLine};

/// Timezone naive capture timestamps are localized into.
pub const INGEST_TZ: Tz = chrono_tz::Europe::Bucharest;

/// Day-first vs month-first disambiguation for ambiguous numeric dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateOrder {
    /// Day/month/year (the default; matches the captured locale).
    #[default]
    DayFirst,
    /// Month/day/year.
    MonthFirst,
}

impl DateOrder {
    /// Parse the `DMY` / `MDY` configuration spelling, defaulting to DMY.
    pub fn from_config(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("mdy") {
            Self::MonthFirst
        } else {
            Self::DayFirst
        }
    }
}

/// One raw source line plus its evidence tuple.
#[derive(Debug, Clone)]
pub struct RawLine {
    /// Line text as captured (pre-trim).
    pub text: String,
    /// Raw block the line was appended to.
    pub raw_block_id: Uuid,
    /// Zero-based index within that block.
    pub raw_line_index: i32,
}

static TIMESTAMP_STYLE_A: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:—|â€”)+\s*(?P<ts>.+)$").unwrap());
static TIMESTAMP_STYLE_B: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Made by Synked(?:•|â€¢)\s*(?P<ts>.+)$").unwrap());
static TIME_ONLY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\d{1,2}:\d{2}(?:\s*[AP]M)?$").unwrap());
static MENTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"<@!?\d+>").unwrap());

const NOISE_LINES: &[&str] = &[
    "Made by Synked with ❤️ & ☕",
    "Made by Synked with â¤ï¸ & â˜•",
    "Made by Synked with ♥ & ☕",
];

const KNOWN_TITLES: &[&str] = &[
    "Retragere Banca",
    "Depunere Banca",
    "Transfer (Bancar)",
    "Ofera Bani",
    "Ofera Item",
    "💵 Telefon",
    "ğŸ’µ Telefon",
    "⚠️ Obiect aruncat pe jos",
    "âš ï¸ Obiect aruncat pe jos",
    "Transfera Item",
    "Server Connect",
    "Server Disconnect",
    "Give Money (K-Menu)",
    "Give Item (K-Menu)",
    "💎 Bijuterii",
    "ğŸ’ Bijuterii",
];

/// Decorative glyphs a title line may lead with (proper and mojibake forms).
const TITLE_GLYPHS: &[&str] = &["⚠", "💵", "💎", "âš ", "ğŸ’"];

fn looks_like_title(line: &str) -> bool {
    if TITLE_GLYPHS.iter().any(|glyph| line.starts_with(glyph)) {
        return true;
    }
    line.contains('(') && line.contains(')') && line.chars().count() < 40
}

fn clean_payload_line(line: &str) -> String {
    let line = MENTION.replace_all(line, "");
    line.replace("**", "")
        .replace('*', "")
        .replace('`', "")
        .trim()
        .to_owned()
}

fn match_timestamp(line: &str) -> Option<&str> {
    TIMESTAMP_STYLE_A
        .captures(line)
        .or_else(|| TIMESTAMP_STYLE_B.captures(line))
        .and_then(|c| c.name("ts"))
        .map(|m| m.as_str().trim())
}

//─────────────────────────────
//  State machine
//─────────────────────────────

/// Single-pass line → block state machine.
pub struct Normalizer {
    date_order: DateOrder,
    job_date: DateTime<Tz>,
    last_absolute: Option<DateTime<Tz>>,
    title: Option<String>,
    occurred_at: Option<DateTime<Utc>>,
    quality: OccurredAtQuality,
    payload: Vec<PayloadLine>,
    next_line_no: i64,
}

impl Normalizer {
    /// A normalizer anchored at `job_date` (the worker's wall clock in the
    /// ingest timezone). Given identical input and job date, the output is
    /// reproducible.
    pub fn new(job_date: DateTime<Tz>, date_order: DateOrder) -> Self {
        Self {
            date_order,
            job_date,
            last_absolute: None,
            title: None,
            occurred_at: None,
            quality: OccurredAtQuality::Unknown,
            payload: Vec::new(),
            next_line_no: 1,
        }
    }

    /// Consume one line; returns the block this line closed, if any.
    pub fn push(&mut self, line: &RawLine) -> Option<NormalizedBlock> {
        let text = line.text.trim();
        if text.is_empty() || NOISE_LINES.contains(&text) {
            return None;
        }
        let line_no = self.next_line_no;
        self.next_line_no += 1;

        if let Some(ts_text) = match_timestamp(text) {
            let flushed = self.take_block();
            let (occurred_at, quality) = self.resolve_timestamp(ts_text);
            self.occurred_at = occurred_at;
            self.quality = quality;
            return flushed;
        }

        if self.title.is_none()
            && self.payload.is_empty()
            && (KNOWN_TITLES.contains(&text) || looks_like_title(text))
        {
            self.title = Some(text.to_owned());
            return None;
        }

        self.payload.push(PayloadLine {
            text: clean_payload_line(text),
            raw_block_id: line.raw_block_id,
            raw_line_index: line.raw_line_index,
            global_line_no: line_no,
        });
        None
    }

    /// End of stream: emit the final pending block if it has any content.
    pub fn finish(mut self) -> Option<NormalizedBlock> {
        self.take_block()
    }

    fn take_block(&mut self) -> Option<NormalizedBlock> {
        let block = if self.title.is_some() || !self.payload.is_empty() {
            Some(NormalizedBlock {
                title: self.title.take(),
                occurred_at: self.occurred_at,
                occurred_at_quality: self.quality,
                payload: std::mem::take(&mut self.payload),
            })
        } else {
            None
        };
        self.title = None;
        self.occurred_at = None;
        self.quality = OccurredAtQuality::Unknown;
        self.payload.clear();
        block
    }

    //─────────────────────────────
    //  Timestamp resolution
    //─────────────────────────────

    /// Resolve a captured timestamp expression. Only an ABSOLUTE result
    /// advances the `last_absolute` anchor.
    fn resolve_timestamp(&mut self, ts_text: &str) -> (Option<DateTime<Utc>>, OccurredAtQuality) {
        let ts_text = ts_text.strip_prefix("at ").unwrap_or(ts_text).trim();
        let lower = ts_text.to_lowercase();
        let anchor = self.last_absolute.unwrap_or(self.job_date);

        if TIME_ONLY.is_match(ts_text) {
            return match localized_time(ts_text, anchor.date_naive()) {
                Some(dt) => (Some(dt), OccurredAtQuality::TimeOnly),
                None => (None, OccurredAtQuality::Unknown),
            };
        }
        if lower.contains("yesterday") {
            let base = (anchor - Duration::days(1)).date_naive();
            return match localized_time(after_last_at(ts_text), base) {
                Some(dt) => (Some(dt), OccurredAtQuality::Relative),
                None => (None, OccurredAtQuality::Unknown),
            };
        }
        if lower.contains("today") {
            let base = anchor.date_naive();
            return match localized_time(after_last_at(ts_text), base) {
                Some(dt) => (Some(dt), OccurredAtQuality::Relative),
                None => (None, OccurredAtQuality::Unknown),
            };
        }
        match parse_absolute(ts_text, self.date_order) {
            Some(dt) => {
                self.last_absolute = Some(dt);
                (Some(dt.with_timezone(&Utc)), OccurredAtQuality::Absolute)
            }
            None => (None, OccurredAtQuality::Unknown),
        }
    }
}

/// The substring after the last `at`, or the whole expression when no `at`
/// remains.
fn after_last_at(ts_text: &str) -> &str {
    ts_text
        .rsplit_once("at")
        .map(|(_, tail)| tail)
        .unwrap_or(ts_text)
        .trim()
}

fn parse_clock(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    const CLOCK_FORMATS: &[&str] = &["%I:%M %p", "%I:%M%p", "%H:%M:%S", "%H:%M"];
    CLOCK_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(value, fmt).ok())
}

fn localized_time(value: &str, date: NaiveDate) -> Option<DateTime<Utc>> {
    let time = parse_clock(value)?;
    localize(date.and_time(time)).map(|dt| dt.with_timezone(&Utc))
}

fn localize(naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    match INGEST_TZ.from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) => Some(dt),
        chrono::LocalResult::Ambiguous(earliest, _) => Some(earliest),
        chrono::LocalResult::None => None,
    }
}

const DMY_DATETIME_FORMATS: &[&str] = &[
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d/%m/%Y %I:%M %p",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
    "%d/%m/%y %H:%M",
    "%d %B %Y %H:%M",
    "%d %B %Y %I:%M %p",
];
const MDY_DATETIME_FORMATS: &[&str] = &[
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M %p",
    "%m.%d.%Y %H:%M:%S",
    "%m.%d.%Y %H:%M",
    "%m-%d-%Y %H:%M:%S",
    "%m-%d-%Y %H:%M",
    "%m/%d/%y %H:%M",
];
const SHARED_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%B %d, %Y %I:%M %p",
    "%B %d, %Y %H:%M",
];
const DMY_DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%d.%m.%Y", "%d-%m-%Y"];
const MDY_DATE_FORMATS: &[&str] = &["%m/%d/%Y", "%m.%d.%Y", "%m-%d-%Y"];
const SHARED_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%B %d, %Y"];

fn parse_absolute(ts_text: &str, date_order: DateOrder) -> Option<DateTime<Tz>> {
    let (datetime_formats, date_formats) = match date_order {
        DateOrder::DayFirst => (DMY_DATETIME_FORMATS, DMY_DATE_FORMATS),
        DateOrder::MonthFirst => (MDY_DATETIME_FORMATS, MDY_DATE_FORMATS),
    };
    let naive = datetime_formats
        .iter()
        .chain(SHARED_DATETIME_FORMATS)
        .find_map(|fmt| NaiveDateTime::parse_from_str(ts_text, fmt).ok())
        .or_else(|| {
            date_formats
                .iter()
                .chain(SHARED_DATE_FORMATS)
                .find_map(|fmt| NaiveDate::parse_from_str(ts_text, fmt).ok())
                .map(|date| date.and_time(NaiveTime::MIN))
        })?;
    localize(naive)
}

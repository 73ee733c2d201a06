//! Normalizer → parser-registry integration over a synthetic transcript,
//! without any I/O.

use chrono::{TimeZone, Utc};
use uuid::Uuid;

use dosar_ingest::text::normalize_signature;
use dosar_ingest::{default_registry, DateOrder, Normalizer, RawLine, INGEST_TZ};
use dosar_types::{EventData, NormalizedBlock, OccurredAtQuality};

const TRANSCRIPT: &[&str] = &[
    "Made by Synked with ❤️ & ☕",
    "— 12/03/2024 14:05",
    "Retragere Banca",
    "John[42] a retras 1.000$",
    "— 12/03/2024 14:20",
    "💵 Telefon",
    "Jucatorului: Ana(7) i-au fost luati 500 $",
    "Jucatorului: Dan(9) i-au fost adaugati 500 $",
    "— yesterday at 09:30",
    "Ceva Nou",
    "Valoare 42 aici",
];

fn run_pipeline(lines: &[&str]) -> Vec<(NormalizedBlock, Vec<(String, EventData)>)> {
    let job_date = INGEST_TZ.with_ymd_and_hms(2024, 5, 20, 10, 0, 0).unwrap();
    let mut normalizer = Normalizer::new(job_date, DateOrder::DayFirst);
    let registry = default_registry();
    let mut out = Vec::new();

    let mut blocks = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        let raw = RawLine {
            text: (*line).to_owned(),
            raw_block_id: Uuid::nil(),
            raw_line_index: i as i32,
        };
        blocks.extend(normalizer.push(&raw));
    }
    blocks.extend(normalizer.finish());

    for block in blocks {
        let mut events = Vec::new();
        for parser in &registry {
            if parser.matches(&block) {
                for event in parser.parse(&block) {
                    events.push((parser.parser_id().to_owned(), event));
                }
            }
        }
        out.push((block, events));
    }
    out
}

#[test]
fn transcript_splits_into_three_blocks() {
    let results = run_pipeline(TRANSCRIPT);
    assert_eq!(results.len(), 3);
    let titles: Vec<Option<&str>> = results
        .iter()
        .map(|(block, _)| block.title.as_deref())
        .collect();
    assert_eq!(
        titles,
        [Some("Retragere Banca"), Some("💵 Telefon"), Some("Ceva Nou")]
    );
}

#[test]
fn bank_block_yields_the_withdraw_event() {
    let results = run_pipeline(TRANSCRIPT);
    let (block, events) = &results[0];
    assert_eq!(block.occurred_at_quality, OccurredAtQuality::Absolute);
    assert_eq!(
        block.occurred_at,
        Some(Utc.with_ymd_and_hms(2024, 3, 12, 12, 5, 0).unwrap())
    );
    assert_eq!(events.len(), 1);
    let (parser_id, ev) = &events[0];
    assert_eq!(parser_id, "bank");
    assert_eq!(ev.event_type, "BANK_WITHDRAW");
    assert_eq!(ev.src_player.as_deref(), Some("42"));
    assert_eq!(ev.money, Some(1000));
    assert_eq!(ev.evidence.raw_line_index, 3);
}

#[test]
fn phone_block_pairs_into_one_transfer() {
    let results = run_pipeline(TRANSCRIPT);
    let (_, events) = &results[1];
    assert_eq!(events.len(), 1);
    let (_, ev) = &events[0];
    assert_eq!(ev.event_type, "PHONE_TRANSFER");
    assert_eq!(ev.src_player.as_deref(), Some("7"));
    assert_eq!(ev.dst_player.as_deref(), Some("9"));
    assert_eq!(ev.money, Some(500));
}

#[test]
fn relative_block_resolves_against_the_last_absolute() {
    let results = run_pipeline(TRANSCRIPT);
    let (block, _) = &results[2];
    assert_eq!(block.occurred_at_quality, OccurredAtQuality::Relative);
    assert_eq!(
        block.occurred_at,
        Some(Utc.with_ymd_and_hms(2024, 3, 11, 7, 30, 0).unwrap())
    );
}

#[test]
fn unknown_block_yields_no_events_and_a_stable_signature() {
    let results = run_pipeline(TRANSCRIPT);
    let (block, events) = &results[2];
    assert!(events.is_empty());
    assert_eq!(block.payload.len(), 1);
    assert_eq!(normalize_signature(&block.payload[0].text), "valoare <#> aici");
}

#[test]
fn global_line_numbers_order_events_across_blocks() {
    let results = run_pipeline(TRANSCRIPT);
    let mut last = 0;
    for (block, _) in &results {
        for payload in &block.payload {
            assert!(payload.global_line_no > last, "line numbers are monotone");
            last = payload.global_line_no;
        }
    }
}

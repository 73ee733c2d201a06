//! Pattern parsers: ordered registry mapping normalized blocks to typed
//! events.
//!
//! Each parser carries a stable id and version, a cheap title-based `matches`
//! predicate, and a `parse` pass over the block's payload lines. Every parser
//! whose predicate accepts a block runs; all yielded events are persisted.
//! The regexes keep the source byte patterns verbatim, including the
//! mojibake-encoded diacritics upstream captures contain.

use dosar_types::{EventData, NormalizedBlock};

mod admin;
mod bank;
mod connect;
mod container;
mod drop_item;
mod jewelry;
mod offer;
mod phone;

pub use admin::AdminParser;
pub use bank::BankParser;
pub use connect::ConnectParser;
pub use container::ContainerParser;
pub use drop_item::DropItemParser;
pub use jewelry::JewelryParser;
pub use offer::OfferParser;
pub use phone::PhoneParser;

/// A pattern parser over normalized blocks.
pub trait Parser: Send + Sync {
    /// Stable parser id recorded on every emitted event.
    fn parser_id(&self) -> &'static str;
    /// Parser version recorded on every emitted event.
    fn version(&self) -> &'static str;
    /// Whether this parser wants the block (typically a title whitelist).
    fn matches(&self, block: &NormalizedBlock) -> bool;
    /// Extract zero or more events from the block's payload lines.
    fn parse(&self, block: &NormalizedBlock) -> Vec<EventData>;
}

/// The ordered default parser set.
pub fn default_registry() -> Vec<Box<dyn Parser>> {
    vec![
        Box::new(BankParser),
        Box::new(OfferParser),
        Box::new(PhoneParser),
        Box::new(DropItemParser),
        Box::new(ContainerParser),
        Box::new(ConnectParser),
        Box::new(AdminParser),
        Box::new(JewelryParser),
    ]
}

pub(crate) fn title_in(block: &NormalizedBlock, titles: &[&str]) -> bool {
    titles.contains(&block.title_str())
}

#[cfg(test)]
pub(crate) mod testutil {
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    use dosar_types::{NormalizedBlock, OccurredAtQuality, PayloadLine};

    /// A block with the given title and payload lines, numbered from 1.
    pub fn block(title: &str, lines: &[&str]) -> NormalizedBlock {
        NormalizedBlock {
            title: Some(title.to_owned()),
            occurred_at: Some(Utc.with_ymd_and_hms(2024, 3, 12, 12, 5, 0).unwrap()),
            occurred_at_quality: OccurredAtQuality::Absolute,
            payload: lines
                .iter()
                .enumerate()
                .map(|(i, text)| PayloadLine {
                    text: (*text).to_owned(),
                    raw_block_id: Uuid::nil(),
                    raw_line_index: i as i32,
                    global_line_no: (i + 1) as i64,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::block;
    use super::*;

    #[test]
    fn registry_keeps_declaration_order() {
        let ids: Vec<&str> = default_registry().iter().map(|p| p.parser_id()).collect();
        assert_eq!(
            ids,
            ["bank", "offer", "phone", "drop-item", "container", "connect", "admin", "jewelry"]
        );
    }

    #[test]
    fn unknown_title_matches_no_parser() {
        let b = block("Ceva Nou", &["Valoare 42 aici"]);
        assert!(default_registry().iter().all(|p| !p.matches(&b)));
    }

    #[test]
    fn matching_is_on_the_trimmed_title() {
        let mut b = block("Retragere Banca", &[]);
        b.title = Some("  Retragere Banca  ".to_owned());
        assert!(BankParser.matches(&b));
    }
}

//! Container traffic: putting items in, taking items out, and police-search
//! seizures from another player's inventory.

use once_cell::sync::Lazy;
use regex::Regex;

use dosar_types::{EventData, NormalizedBlock};

use super::{title_in, Parser};
use crate::text::parse_amount;

static PUT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\[TRANSFER\].*?\[(?P<id>\d+)\] a pus in (?P<container>.+?) item-ul (?P<item>.+?)\(x(?P<qty>[\d.,]+)\)\.",
    )
    .unwrap()
});
static TAKE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\[REMOVE\].*?\[(?P<id>\d+)\] a scos din (?P<container>.+?) item-ul (?P<item>.+?)\(x(?P<qty>[\d.,]+)\)\.",
    )
    .unwrap()
});
static SEARCH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\[PERCHEZITIE\] Jucatorul (?P<name>.+?)\[(?P<sid>\d+)\] a scos din (?P<target>.+?) item-ul (?P<item>.+?)\(x(?P<qty>[\d.,]+)\)\.",
    )
    .unwrap()
});

/// Parser for `Transfera Item` blocks.
pub struct ContainerParser;

impl Parser for ContainerParser {
    fn parser_id(&self) -> &'static str {
        "container"
    }

    fn version(&self) -> &'static str {
        "v1"
    }

    fn matches(&self, block: &NormalizedBlock) -> bool {
        title_in(block, &["Transfera Item"])
    }

    fn parse(&self, block: &NormalizedBlock) -> Vec<EventData> {
        let mut events = Vec::new();
        for payload in &block.payload {
            let line = payload.text.as_str();
            if let Some(c) = PUT.captures(line) {
                events.push(EventData {
                    src_player: Some(c["id"].to_owned()),
                    container: Some(c["container"].trim().to_owned()),
                    item: Some(c["item"].trim().to_owned()),
                    qty: Some(parse_amount(&c["qty"])),
                    ..EventData::new("CONTAINER_PUT", payload.evidence())
                });
            } else if let Some(c) = TAKE.captures(line) {
                events.push(EventData {
                    src_player: Some(c["id"].to_owned()),
                    container: Some(c["container"].trim().to_owned()),
                    item: Some(c["item"].trim().to_owned()),
                    qty: Some(parse_amount(&c["qty"])),
                    ..EventData::new("CONTAINER_TAKE", payload.evidence())
                });
            } else if let Some(c) = SEARCH.captures(line) {
                // A search seizure reads from another player, not a
                // container: the target's natural key goes to dst.
                events.push(EventData {
                    src_player: Some(c["sid"].to_owned()),
                    src_player_name: Some(c["name"].trim().to_owned()),
                    dst_player: Some(c["target"].trim().to_owned()),
                    item: Some(c["item"].trim().to_owned()),
                    qty: Some(parse_amount(&c["qty"])),
                    ..EventData::new("SEARCH_TAKE", payload.evidence())
                });
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::block;
    use super::*;

    #[test]
    fn put_line_records_container_traffic() {
        let b = block(
            "Transfera Item",
            &["[TRANSFER] Ion[3] a pus in portbagaj_3_sedan item-ul pistol(x1)."],
        );
        let events = ContainerParser.parse(&b);
        let ev = &events[0];
        assert_eq!(ev.event_type, "CONTAINER_PUT");
        assert_eq!(ev.container.as_deref(), Some("portbagaj_3_sedan"));
        assert_eq!(ev.item.as_deref(), Some("pistol"));
        assert_eq!(ev.qty, Some(1));
    }

    #[test]
    fn take_line_records_removal() {
        let b = block(
            "Transfera Item",
            &["[REMOVE] Ion[3] a scos din depozit_7 item-ul bani murdari(x2.500)."],
        );
        let events = ContainerParser.parse(&b);
        assert_eq!(events[0].event_type, "CONTAINER_TAKE");
        assert_eq!(events[0].qty, Some(2500));
    }

    #[test]
    fn search_take_targets_the_searched_player() {
        let b = block(
            "Transfera Item",
            &["[PERCHEZITIE] Jucatorul Politist[5] a scos din Ion[3] item-ul cutit(x1)."],
        );
        let events = ContainerParser.parse(&b);
        let ev = &events[0];
        assert_eq!(ev.event_type, "SEARCH_TAKE");
        assert_eq!(ev.src_player.as_deref(), Some("5"));
        assert_eq!(ev.dst_player.as_deref(), Some("Ion[3]"));
        assert_eq!(ev.item.as_deref(), Some("cutit"));
    }

    #[test]
    fn one_block_may_yield_multiple_events() {
        let b = block(
            "Transfera Item",
            &[
                "[TRANSFER] Ion[3] a pus in portbagaj_3 item-ul apa(x6).",
                "[REMOVE] Ion[3] a scos din portbagaj_3 item-ul apa(x2).",
            ],
        );
        assert_eq!(ContainerParser.parse(&b).len(), 2);
    }
}

//! Items dropped on the ground.

use once_cell::sync::Lazy;
use regex::Regex;

use dosar_types::{EventData, NormalizedBlock};

use super::{title_in, Parser};
use crate::text::parse_amount;

static DROP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"Juc(?:ător|ator|Äƒtor): (?P<name>.+?) \((?P<id>\d+)\) a aruncat pe jos (?P<qty>[\d.,]+)x (?P<item>.+)",
    )
    .unwrap()
});

/// Parser for `⚠️ Obiect aruncat pe jos` blocks.
pub struct DropItemParser;

impl Parser for DropItemParser {
    fn parser_id(&self) -> &'static str {
        "drop-item"
    }

    fn version(&self) -> &'static str {
        "v1"
    }

    fn matches(&self, block: &NormalizedBlock) -> bool {
        title_in(
            block,
            &["⚠️ Obiect aruncat pe jos", "âš ï¸ Obiect aruncat pe jos"],
        )
    }

    fn parse(&self, block: &NormalizedBlock) -> Vec<EventData> {
        block
            .payload
            .iter()
            .filter_map(|payload| {
                DROP.captures(&payload.text).map(|c| EventData {
                    src_player: Some(c["id"].to_owned()),
                    src_player_name: Some(c["name"].trim().to_owned()),
                    container: Some("ground".to_owned()),
                    item: Some(c["item"].trim().to_owned()),
                    qty: Some(parse_amount(&c["qty"])),
                    ..EventData::new("ITEM_DROP", payload.evidence())
                })
            })
            .collect()
    }
}

//! Jewelry shop purchases.

use once_cell::sync::Lazy;
use regex::Regex;

use dosar_types::{EventData, NormalizedBlock};

use super::{title_in, Parser};
use crate::text::parse_amount;

static BUY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"Juc(?:ător|ator|Äƒtor): (?P<name>.+?)\((?P<id>\d+)\) a cumparat (?P<item>.+?) pentru suma de (?P<amount>[\d.,]+)\$",
    )
    .unwrap()
});

/// Parser for `💎 Bijuterii` blocks.
pub struct JewelryParser;

impl Parser for JewelryParser {
    fn parser_id(&self) -> &'static str {
        "jewelry"
    }

    fn version(&self) -> &'static str {
        "v1"
    }

    fn matches(&self, block: &NormalizedBlock) -> bool {
        title_in(block, &["💎 Bijuterii", "ğŸ’ Bijuterii"])
    }

    fn parse(&self, block: &NormalizedBlock) -> Vec<EventData> {
        block
            .payload
            .iter()
            .filter_map(|payload| {
                BUY.captures(&payload.text).map(|c| EventData {
                    src_player: Some(c["id"].to_owned()),
                    src_player_name: Some(c["name"].trim().to_owned()),
                    item: Some(c["item"].trim().to_owned()),
                    money: Some(parse_amount(&c["amount"])),
                    ..EventData::new("JEWELRY_BUY", payload.evidence())
                })
            })
            .collect()
    }
}

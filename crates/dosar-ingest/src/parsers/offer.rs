//! Player-to-player offers of money or items.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;

use dosar_types::{EventData, NormalizedBlock};

use super::{title_in, Parser};
use crate::text::parse_amount;

static MONEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"Jucatorul (?P<src>.+?)\[(?P<src_id>\d+)\] i-a oferit lui (?P<dst>.+?)\[(?P<dst_id>\d+)\] suma de (?P<amount>[\d.,]+)\$\.",
    )
    .unwrap()
});
static ITEM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"Jucatorul (?P<src>.+?)\[(?P<src_id>\d+)\] i-a oferit lui (?P<dst>.+?)\[(?P<dst_id>\d+)\] - (?P<item>.+?)\(x(?P<qty>[\d.,]+)\)\.",
    )
    .unwrap()
});

/// Parser for `Ofera Bani` / `Ofera Item` blocks.
pub struct OfferParser;

impl Parser for OfferParser {
    fn parser_id(&self) -> &'static str {
        "offer"
    }

    fn version(&self) -> &'static str {
        "v1"
    }

    fn matches(&self, block: &NormalizedBlock) -> bool {
        title_in(block, &["Ofera Bani", "Ofera Item"])
    }

    fn parse(&self, block: &NormalizedBlock) -> Vec<EventData> {
        let mut events = Vec::new();
        for payload in &block.payload {
            let line = payload.text.as_str();
            if let Some(c) = MONEY.captures(line) {
                events.push(EventData {
                    src_player: Some(c["src_id"].to_owned()),
                    dst_player: Some(c["dst_id"].to_owned()),
                    src_player_name: Some(c["src"].trim().to_owned()),
                    dst_player_name: Some(c["dst"].trim().to_owned()),
                    money: Some(parse_amount(&c["amount"])),
                    ..EventData::new("OFFER_MONEY", payload.evidence())
                });
            } else if let Some(c) = ITEM.captures(line) {
                // The capture logs `nil` for items the inventory no longer
                // resolves; keep the row but flag it.
                let item = c["item"].trim().to_owned();
                let (item, metadata) = if item.eq_ignore_ascii_case("nil") {
                    (None, Some(json!({ "item_unknown": true })))
                } else {
                    (Some(item), None)
                };
                events.push(EventData {
                    src_player: Some(c["src_id"].to_owned()),
                    dst_player: Some(c["dst_id"].to_owned()),
                    src_player_name: Some(c["src"].trim().to_owned()),
                    dst_player_name: Some(c["dst"].trim().to_owned()),
                    item,
                    qty: Some(parse_amount(&c["qty"])),
                    metadata,
                    ..EventData::new("OFFER_ITEM", payload.evidence())
                });
            }
        }
        events
    }
}

//! Staff give actions from the admin menu, with the staff rank scraped out
//! of the display name.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;

use dosar_types::{EventData, NormalizedBlock};

use super::{title_in, Parser};
use crate::text::parse_amount;

static GIVE_MONEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?P<staff>.+?)\[(?P<staff_id>\d+)\] i-a dat lui (?P<target>.+?)\[(?P<target_id>\d+)\] suma de (?P<amount>[\d.,]+)\$",
    )
    .unwrap()
});
static GIVE_ITEM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?P<staff>.+?)\[(?P<staff_id>\d+)\] i-a dat lui (?P<target>.+?)\[(?P<target_id>\d+)\] item-ul (?P<item>.+?)\(x(?P<qty>[\d.,]+)\)",
    )
    .unwrap()
});

fn staff_rank(name: &str) -> Option<&'static str> {
    if name.contains("Fondator") {
        Some("Fondator")
    } else if name.contains("Admin") {
        Some("Admin")
    } else {
        None
    }
}

/// Parser for the K-Menu give blocks.
pub struct AdminParser;

impl Parser for AdminParser {
    fn parser_id(&self) -> &'static str {
        "admin"
    }

    fn version(&self) -> &'static str {
        "v1"
    }

    fn matches(&self, block: &NormalizedBlock) -> bool {
        title_in(block, &["Give Money (K-Menu)", "Give Item (K-Menu)"])
    }

    fn parse(&self, block: &NormalizedBlock) -> Vec<EventData> {
        let mut events = Vec::new();
        for payload in &block.payload {
            let line = payload.text.as_str();
            if let Some(c) = GIVE_MONEY.captures(line) {
                events.push(EventData {
                    src_player: Some(c["staff_id"].to_owned()),
                    dst_player: Some(c["target_id"].to_owned()),
                    src_player_name: Some(c["staff"].trim().to_owned()),
                    dst_player_name: Some(c["target"].trim().to_owned()),
                    money: Some(parse_amount(&c["amount"])),
                    metadata: Some(json!({ "staff_rank": staff_rank(&c["staff"]) })),
                    ..EventData::new("ADMIN_GIVE_MONEY", payload.evidence())
                });
            } else if let Some(c) = GIVE_ITEM.captures(line) {
                events.push(EventData {
                    src_player: Some(c["staff_id"].to_owned()),
                    dst_player: Some(c["target_id"].to_owned()),
                    src_player_name: Some(c["staff"].trim().to_owned()),
                    dst_player_name: Some(c["target"].trim().to_owned()),
                    item: Some(c["item"].trim().to_owned()),
                    qty: Some(parse_amount(&c["qty"])),
                    metadata: Some(json!({ "staff_rank": staff_rank(&c["staff"]) })),
                    ..EventData::new("ADMIN_GIVE_ITEM", payload.evidence())
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
    fn give_money_records_the_staff_rank() {
        let b = block(
            "Give Money (K-Menu)",
            &["[Fondator] Rex[1] i-a dat lui Ion[3] suma de 10.000$"],
        );
        let events = AdminParser.parse(&b);
        let ev = &events[0];
        assert_eq!(ev.event_type, "ADMIN_GIVE_MONEY");
        assert_eq!(ev.money, Some(10000));
        assert_eq!(ev.metadata, Some(json!({ "staff_rank": "Fondator" })));
    }

    #[test]
    fn give_item_records_item_and_qty() {
        let b = block(
            "Give Item (K-Menu)",
            &["[Admin] Max[2] i-a dat lui Ion[3] item-ul stingator(x1)"],
        );
        let events = AdminParser.parse(&b);
        let ev = &events[0];
        assert_eq!(ev.event_type, "ADMIN_GIVE_ITEM");
        assert_eq!(ev.item.as_deref(), Some("stingator"));
        assert_eq!(ev.metadata, Some(json!({ "staff_rank": "Admin" })));
    }

    #[test]
    fn rankless_staff_yields_null_rank() {
        let b = block(
            "Give Money (K-Menu)",
            &["Rex[1] i-a dat lui Ion[3] suma de 5$"],
        );
        let events = AdminParser.parse(&b);
        assert_eq!(events[0].metadata, Some(json!({ "staff_rank": null })));
    }
}

//! Bank operations: withdrawals, deposits, and transfers between accounts.

use once_cell::sync::Lazy;
use regex::Regex;

use dosar_types::{EventData, NormalizedBlock};

use super::{title_in, Parser};
use crate::text::parse_amount;

static WITHDRAW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<name>.+?)\[(?P<id>\d+)\] a retras (?P<amount>[\d.,]+)\$").unwrap()
});
static DEPOSIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<name>.+?)\[(?P<id>\d+)\] a depozitat (?P<amount>[\d.,]+)\$").unwrap()
});
static TRANSFER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?P<src>.+?)\[(?P<src_id>\d+)\] a transferat (?P<amount>[\d.,]+)\$ lui (?P<dst>.+?)\[(?P<dst_id>\d+)\]\.?",
    )
    .unwrap()
});

/// Parser for the three bank block titles.
pub struct BankParser;

impl Parser for BankParser {
    fn parser_id(&self) -> &'static str {
        "bank"
    }

    fn version(&self) -> &'static str {
        "v1"
    }

    fn matches(&self, block: &NormalizedBlock) -> bool {
        title_in(block, &["Retragere Banca", "Depunere Banca", "Transfer (Bancar)"])
    }

    fn parse(&self, block: &NormalizedBlock) -> Vec<EventData> {
        let mut events = Vec::new();
        for payload in &block.payload {
            let line = payload.text.as_str();
            if let Some(c) = WITHDRAW.captures(line) {
                events.push(EventData {
                    src_player: Some(c["id"].to_owned()),
                    src_player_name: Some(c["name"].trim().to_owned()),
                    money: Some(parse_amount(&c["amount"])),
                    ..EventData::new("BANK_WITHDRAW", payload.evidence())
                });
            } else if let Some(c) = DEPOSIT.captures(line) {
                events.push(EventData {
                    src_player: Some(c["id"].to_owned()),
                    src_player_name: Some(c["name"].trim().to_owned()),
                    money: Some(parse_amount(&c["amount"])),
                    ..EventData::new("BANK_DEPOSIT", payload.evidence())
                });
            } else if let Some(c) = TRANSFER.captures(line) {
                events.push(EventData {
                    src_player: Some(c["src_id"].to_owned()),
                    dst_player: Some(c["dst_id"].to_owned()),
                    src_player_name: Some(c["src"].trim().to_owned()),
                    dst_player_name: Some(c["dst"].trim().to_owned()),
                    money: Some(parse_amount(&c["amount"])),
                    ..EventData::new("BANK_TRANSFER", payload.evidence())
                });
            }
        }
        events
    }
}

//! Phone balance movements.
//!
//! The capture logs a debit line for the sender and a credit line for the
//! receiver of the same transfer. Within one block, debits and credits are
//! paired greedily by equal amount in encounter order into PHONE_TRANSFER
//! events; whatever stays unpaired becomes a PHONE_DELTA with the movement
//! sign in metadata.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;

use dosar_types::{EventData, EvidencePointer, NormalizedBlock};

use super::{title_in, Parser};
use crate::text::parse_amount;

static DELTA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"Juc(?:ătorului|atorului|Äƒtorului): (?P<name>.+?)\((?P<id>\d+)\) i-au fost (?P<action>luati|adaugati) (?P<amount>[\d.,]+) \$",
    )
    .unwrap()
});

struct Movement {
    player: String,
    name: String,
    amount: i64,
    evidence: EvidencePointer,
}

/// Parser for `💵 Telefon` blocks.
pub struct PhoneParser;

impl Parser for PhoneParser {
    fn parser_id(&self) -> &'static str {
        "phone"
    }

    fn version(&self) -> &'static str {
        "v1"
    }

    fn matches(&self, block: &NormalizedBlock) -> bool {
        title_in(block, &["💵 Telefon", "ğŸ’µ Telefon"])
    }

    fn parse(&self, block: &NormalizedBlock) -> Vec<EventData> {
        let mut debits = Vec::new();
        let mut credits = Vec::new();
        for payload in &block.payload {
            let Some(c) = DELTA.captures(&payload.text) else {
                continue;
            };
            let movement = Movement {
                player: c["id"].to_owned(),
                name: c["name"].trim().to_owned(),
                amount: parse_amount(&c["amount"]),
                evidence: payload.evidence(),
            };
            if &c["action"] == "luati" {
                debits.push(movement);
            } else {
                credits.push(movement);
            }
        }

        let mut events = Vec::new();
        let mut credit_used = vec![false; credits.len()];
        for debit in &debits {
            let paired = credits
                .iter()
                .enumerate()
                .find(|(i, credit)| !credit_used[*i] && credit.amount == debit.amount);
            match paired {
                Some((i, credit)) => {
                    credit_used[i] = true;
                    events.push(EventData {
                        src_player: Some(debit.player.clone()),
                        dst_player: Some(credit.player.clone()),
                        src_player_name: Some(debit.name.clone()),
                        dst_player_name: Some(credit.name.clone()),
                        money: Some(debit.amount),
                        ..EventData::new("PHONE_TRANSFER", debit.evidence)
                    });
                }
                None => events.push(delta_event(debit, "debit")),
            }
        }
        for (i, credit) in credits.iter().enumerate() {
            if !credit_used[i] {
                events.push(delta_event(credit, "credit"));
            }
        }
        events
    }
}

fn delta_event(movement: &Movement, sign: &str) -> EventData {
    EventData {
        src_player: Some(movement.player.clone()),
        src_player_name: Some(movement.name.clone()),
        money: Some(movement.amount),
        metadata: Some(json!({ "sign": sign })),
        ..EventData::new("PHONE_DELTA", movement.evidence)
    }
}

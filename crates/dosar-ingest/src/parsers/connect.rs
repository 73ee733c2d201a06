//! Server connect / disconnect tracking, with ban detection on the
//! disconnect reason.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;

use dosar_types::{EventData, NormalizedBlock};

use super::{title_in, Parser};

static CONNECT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?P<name>.+?)\[(?P<id>\d+)\] se conect(?:ează|eaza|eazÄƒ) cu succes \| \(ip: (?P<ip>.+?)\)",
    )
    .unwrap()
});
static DISCONNECT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<name>.+?)\[(?P<id>\d+)\] s-a deconectat (?P<rest>.+)").unwrap()
});

/// Parser for `Server Connect` / `Server Disconnect` blocks.
pub struct ConnectParser;

impl Parser for ConnectParser {
    fn parser_id(&self) -> &'static str {
        "connect"
    }

    fn version(&self) -> &'static str {
        "v1"
    }

    fn matches(&self, block: &NormalizedBlock) -> bool {
        title_in(block, &["Server Connect", "Server Disconnect"])
    }

    fn parse(&self, block: &NormalizedBlock) -> Vec<EventData> {
        let mut events = Vec::new();
        for payload in &block.payload {
            let line = payload.text.as_str();
            if let Some(c) = CONNECT.captures(line) {
                events.push(EventData {
                    src_player: Some(c["id"].to_owned()),
                    src_player_name: Some(c["name"].trim().to_owned()),
                    metadata: Some(json!({ "ip": &c["ip"] })),
                    ..EventData::new("CONNECT", payload.evidence())
                });
            } else if let Some(c) = DISCONNECT.captures(line) {
                let event_type = if line.to_lowercase().contains("banat") {
                    "DISCONNECT_BANNED"
                } else {
                    "DISCONNECT"
                };
                events.push(EventData {
                    src_player: Some(c["id"].to_owned()),
                    src_player_name: Some(c["name"].trim().to_owned()),
                    metadata: Some(json!({ "reason_raw": &c["rest"] })),
                    ..EventData::new(event_type, payload.evidence())
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
    fn connect_captures_the_ip() {
        let b = block(
            "Server Connect",
            &["Ana[7] se conecteaza cu succes | (ip: 10.1.2.3)"],
        );
        let events = ConnectParser.parse(&b);
        let ev = &events[0];
        assert_eq!(ev.event_type, "CONNECT");
        assert_eq!(ev.metadata, Some(json!({ "ip": "10.1.2.3" })));
    }

    #[test]
    fn connect_accepts_the_diacritic_spelling() {
        let b = block(
            "Server Connect",
            &["Ana[7] se conectează cu succes | (ip: 10.1.2.3)"],
        );
        assert_eq!(ConnectParser.parse(&b).len(), 1);
    }

    #[test]
    fn disconnect_keeps_the_raw_reason() {
        let b = block(
            "Server Disconnect",
            &["Ana[7] s-a deconectat (timeout)"],
        );
        let events = ConnectParser.parse(&b);
        let ev = &events[0];
        assert_eq!(ev.event_type, "DISCONNECT");
        assert_eq!(ev.metadata, Some(json!({ "reason_raw": "(timeout)" })));
    }

    #[test]
    fn ban_reason_switches_the_event_type() {
        let b = block(
            "Server Disconnect",
            &["Ana[7] s-a deconectat (a fost BANAT de admin)"],
        );
        let events = ConnectParser.parse(&b);
        assert_eq!(events[0].event_type, "DISCONNECT_BANNED");
    }
}

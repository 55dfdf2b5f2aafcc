//! Channel status classification.

use serde::{Deserialize, Serialize};

use crate::registry::{ChannelRecord, RegistrySnapshot};

/// Derived health of a channel, based on observed sends and receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelStatus {
    Normal,
    Dangling,
    SendOnly,
    ReceiveOnly,
}

impl ChannelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelStatus::Normal => "normal",
            ChannelStatus::Dangling => "dangling",
            ChannelStatus::SendOnly => "send-only",
            ChannelStatus::ReceiveOnly => "receive-only",
        }
    }

    /// Human-readable warning, `None` for healthy channels.
    pub fn warning(&self) -> Option<&'static str> {
        match self {
            ChannelStatus::Normal => None,
            ChannelStatus::Dangling => Some("Dangling channel: no send or receive operations"),
            ChannelStatus::SendOnly => Some("Send-only channel: no receive operations"),
            ChannelStatus::ReceiveOnly => Some("Receive-only channel: no send operations"),
        }
    }
}

impl std::fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classify from operation counts alone.
pub fn classify(send_count: usize, receive_count: usize) -> ChannelStatus {
    match (send_count, receive_count) {
        (0, 0) => ChannelStatus::Dangling,
        (0, _) => ChannelStatus::ReceiveOnly,
        (_, 0) => ChannelStatus::SendOnly,
        _ => ChannelStatus::Normal,
    }
}

/// Classify a single record.
pub fn classify_record(record: &ChannelRecord) -> ChannelStatus {
    classify(record.send_count(), record.receive_count())
}

/// A record paired with its derived status.
#[derive(Debug, Clone, Copy)]
pub struct ClassifiedChannel<'a> {
    pub record: &'a ChannelRecord,
    pub status: ChannelStatus,
}

/// Classify every record of a snapshot, in name order.
pub fn classify_snapshot(snapshot: &RegistrySnapshot) -> Vec<ClassifiedChannel<'_>> {
    snapshot
        .iter()
        .map(|record| ClassifiedChannel {
            record,
            status: classify_record(record),
        })
        .collect()
}

/// Number of channels per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub normal: usize,
    pub dangling: usize,
    pub send_only: usize,
    pub receive_only: usize,
}

impl StatusCounts {
    pub fn tally(channels: &[ClassifiedChannel<'_>]) -> Self {
        let mut counts = Self::default();
        for channel in channels {
            match channel.status {
                ChannelStatus::Normal => counts.normal += 1,
                ChannelStatus::Dangling => counts.dangling += 1,
                ChannelStatus::SendOnly => counts.send_only += 1,
                ChannelStatus::ReceiveOnly => counts.receive_only += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.normal + self.dangling + self.send_only + self.receive_only
    }

    /// Channels that are not `normal`.
    pub fn flagged(&self) -> usize {
        self.total() - self.normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ChannelRegistry, Declaration, Location, UsageKind};

    #[test]
    fn test_classify_counts() {
        assert_eq!(classify(0, 0), ChannelStatus::Dangling);
        assert_eq!(classify(3, 0), ChannelStatus::SendOnly);
        assert_eq!(classify(0, 1), ChannelStatus::ReceiveOnly);
        assert_eq!(classify(2, 5), ChannelStatus::Normal);
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(ChannelStatus::SendOnly.to_string(), "send-only");
        assert_eq!(
            serde_json::to_string(&ChannelStatus::ReceiveOnly).unwrap(),
            "\"receive-only\""
        );
        assert!(ChannelStatus::Normal.warning().is_none());
        assert!(ChannelStatus::Dangling.warning().unwrap().contains("Dangling"));
    }

    #[test]
    fn test_classify_snapshot_and_tally() {
        let registry = ChannelRegistry::new();
        for name in ["a", "b", "c", "d"] {
            registry.upsert_declaration(Declaration {
                name: name.to_string(),
                element_type: "int".to_string(),
                site: Location::new("x.go", 1),
            });
        }
        registry.append_usage("a", UsageKind::Send, Location::new("x.go", 2));
        registry.append_usage("a", UsageKind::Receive, Location::new("x.go", 3));
        registry.append_usage("b", UsageKind::Send, Location::new("x.go", 4));
        registry.append_usage("c", UsageKind::Receive, Location::new("x.go", 5));
        // Hand-offs do not count as traffic.
        registry.append_usage("d", UsageKind::PassedTo, Location::new("x.go", 6));

        let snapshot = registry.snapshot();
        let classified = classify_snapshot(&snapshot);
        let statuses: Vec<_> = classified
            .iter()
            .map(|c| (c.record.name.as_str(), c.status))
            .collect();
        assert_eq!(
            statuses,
            vec![
                ("a", ChannelStatus::Normal),
                ("b", ChannelStatus::SendOnly),
                ("c", ChannelStatus::ReceiveOnly),
                ("d", ChannelStatus::Dangling),
            ]
        );

        let counts = StatusCounts::tally(&classified);
        assert_eq!(counts.total(), 4);
        assert_eq!(counts.flagged(), 3);
        assert_eq!(counts.dangling, 1);
    }
}

//! Conflict-check support: client matter lookup and structured answer parsing.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::legal::dataset::{MatterDataset, MatterRecord};

const CLIENT_PREFIX: &str = "Client:";
const CONFLICT_TYPE_PREFIX: &str = "Conflict Type:";
const DETAILS_PREFIX: &str = "Details:";

/// Conflict categories the model is asked to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConflictType {
    PriorWork,
    PotentialOpponent,
    BusinessOwner,
}

impl ConflictType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PriorWork => "Prior Work",
            Self::PotentialOpponent => "Potential Opponent",
            Self::BusinessOwner => "Business Owner",
        }
    }

    pub fn from_label(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "prior work" => Some(Self::PriorWork),
            "potential opponent" => Some(Self::PotentialOpponent),
            "business owner" => Some(Self::BusinessOwner),
            _ => None,
        }
    }
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One finding parsed from the model's answer. Fields are taken verbatim;
/// nothing checks that the model followed the requested schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRecord {
    #[serde(rename = "Client")]
    pub client: String,
    #[serde(rename = "Conflict Type")]
    pub conflict_type: String,
    #[serde(rename = "Details")]
    pub details: String,
}

impl ConflictRecord {
    /// Known category, or `None` when the model used another label.
    pub fn kind(&self) -> Option<ConflictType> {
        ConflictType::from_label(&self.conflict_type)
    }
}

/// Rows whose Client Name, Matter or Matter Description contains `client_name`
/// (case-insensitive), in dataset order. A blank name matches nothing.
pub fn find_client_matters<'a>(
    dataset: &'a MatterDataset,
    client_name: &str,
) -> Vec<&'a MatterRecord> {
    let needle = client_name.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    dataset
        .records()
        .iter()
        .filter(|record| {
            [
                record.client_name.as_deref(),
                record.matter.as_deref(),
                record.matter_description.as_deref(),
            ]
            .into_iter()
            .flatten()
            .any(|field| field.to_lowercase().contains(&needle))
        })
        .collect()
}

/// Parse `Client:` / `Conflict Type:` / `Details:` lines into records.
///
/// A record opens on the first recognised line and is flushed when the next
/// `Client:` line arrives or the input ends. Other lines are ignored, so a
/// Details value that wraps onto a second line keeps only its first line.
pub fn parse_conflict_records(text: &str) -> Vec<ConflictRecord> {
    let mut records = Vec::new();
    let mut current: Option<ConflictRecord> = None;

    for line in text.lines().map(str::trim) {
        if let Some(value) = line.strip_prefix(CLIENT_PREFIX) {
            if let Some(done) = current.take() {
                records.push(done);
            }
            current = Some(ConflictRecord {
                client: value.trim().to_string(),
                ..Default::default()
            });
        } else if let Some(value) = line.strip_prefix(CONFLICT_TYPE_PREFIX) {
            current.get_or_insert_with(ConflictRecord::default).conflict_type =
                value.trim().to_string();
        } else if let Some(value) = line.strip_prefix(DETAILS_PREFIX) {
            current.get_or_insert_with(ConflictRecord::default).details = value.trim().to_string();
        }
    }

    if let Some(done) = current {
        records.push(done);
    }
    records
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{ConflictRecord, ConflictType, find_client_matters, parse_conflict_records};
    use crate::legal::dataset::{MatterDataset, MatterRecord};

    fn record(client: &str, matter: &str, description: &str) -> MatterRecord {
        MatterRecord {
            attorney: Some("Ann Lee".to_string()),
            client_name: Some(client.to_string()),
            matter: Some(matter.to_string()),
            matter_description: Some(description.to_string()),
            ..Default::default()
        }
    }

    fn dataset() -> MatterDataset {
        MatterDataset::from_records(vec![
            record("Acme Co", "Acme lease", "Commercial lease review"),
            record("Beta LLC", "Beta v. ACME CO", "Breach of supply contract"),
            record("Gamma Inc", "Gamma IPO", "Securities filing; Acme co-investor"),
            record("Delta", "Delta audit", "Tax audit"),
        ])
    }

    #[test]
    fn parses_single_well_formed_record() {
        let records = parse_conflict_records(
            "Client: Acme Co\nConflict Type: Prior Work\nDetails: Represented 2019-2021",
        );
        assert_eq!(
            records,
            vec![ConflictRecord {
                client: "Acme Co".to_string(),
                conflict_type: "Prior Work".to_string(),
                details: "Represented 2019-2021".to_string(),
            }]
        );
        assert_eq!(records[0].kind(), Some(ConflictType::PriorWork));
    }

    #[test]
    fn new_client_line_flushes_previous_record() {
        let text = "Here is what I found:\n\n\
            Client: Acme Co\nConflict Type: Prior Work\nDetails: Lease 2020\n\n\
            Client: Beta LLC\nConflict Type: Potential Opponent\nDetails: Adverse in supply case\n";
        let records = parse_conflict_records(text);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].client, "Beta LLC");
        assert_eq!(records[1].kind(), Some(ConflictType::PotentialOpponent));
    }

    #[test]
    fn unparseable_output_yields_no_records() {
        assert!(parse_conflict_records("No conflicts were identified.").is_empty());
        assert!(parse_conflict_records("").is_empty());
    }

    #[test]
    fn multi_line_details_keep_only_first_line() {
        let records = parse_conflict_records(
            "Client: Acme Co\nConflict Type: Prior Work\nDetails: Represented Acme\nin two lease disputes",
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].details, "Represented Acme");
    }

    #[test]
    fn out_of_order_prefixes_attach_to_the_open_record() {
        // Details before Client opens an anonymous record that the Client line then flushes.
        let records = parse_conflict_records(
            "Details: Owns 40% of Acme\nClient: Acme Co\nConflict Type: Business Owner",
        );
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].client, "");
        assert_eq!(records[0].details, "Owns 40% of Acme");
        assert_eq!(records[1].client, "Acme Co");
        assert_eq!(records[1].details, "");
        assert_eq!(records[1].kind(), Some(ConflictType::BusinessOwner));
    }

    #[test]
    fn bulleted_prefixes_are_not_recognised() {
        let records = parse_conflict_records("- Client: Acme Co\n- Conflict Type: Prior Work");
        assert!(records.is_empty());
    }

    #[test]
    fn unknown_conflict_label_is_kept_verbatim() {
        let records = parse_conflict_records("Client: Acme\nConflict Type: Former Employee");
        assert_eq!(records[0].conflict_type, "Former Employee");
        assert_eq!(records[0].kind(), None);
    }

    #[test]
    fn client_filter_matches_three_columns_case_insensitively() {
        let dataset = dataset();
        let matters: Vec<&str> = find_client_matters(&dataset, "acme co")
            .into_iter()
            .filter_map(|r| r.matter.as_deref())
            .collect();
        assert_eq!(matters, vec!["Acme lease", "Beta v. ACME CO", "Gamma IPO"]);
    }

    #[test]
    fn client_filter_with_no_hits_is_empty() {
        let dataset = dataset();
        assert!(find_client_matters(&dataset, "Omega Holdings").is_empty());
        assert!(find_client_matters(&dataset, "   ").is_empty());
    }

    #[test]
    fn conflict_type_labels_round_trip() {
        for kind in [
            ConflictType::PriorWork,
            ConflictType::PotentialOpponent,
            ConflictType::BusinessOwner,
        ] {
            assert_eq!(ConflictType::from_label(&kind.to_string()), Some(kind));
        }
    }
}

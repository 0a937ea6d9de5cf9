//! Ingestion profile: the alias and erasure rules applied to every export.
//!
//! The built-in profile matches the service report exports this tool was
//! written for. A YAML file can override any part of it; keys left out keep
//! their defaults.

use std::{collections::BTreeMap, fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result, ensure};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::fields::Field;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestProfile {
    /// Header names (case-insensitive) that mark a leading date column. Any
    /// other first column is a row index and gets dropped.
    pub date_aliases: Vec<String>,
    /// Exact source header → canonical column name.
    pub renames: BTreeMap<String, String>,
    /// Columns forced to null after coercion. [`ALWAYS_ERASED`] is nulled
    /// whether or not it is listed here.
    pub erase: Vec<Field>,
}

/// Source amounts never reach the warehouse.
pub const ALWAYS_ERASED: [Field; 2] = [Field::ServicePrice, Field::Package];

impl Default for IngestProfile {
    fn default() -> Self {
        let renames = [("CDT", Field::CreatDate), ("SavingOffUsed", Field::Package)]
            .into_iter()
            .map(|(from, to)| (from.to_string(), to.name().to_string()))
            .collect();
        Self {
            date_aliases: vec!["cdt".to_string(), "creatdate".to_string()],
            renames,
            erase: ALWAYS_ERASED.to_vec(),
        }
    }
}

impl IngestProfile {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening profile {path:?}"))?;
        let profile: IngestProfile = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing profile YAML {path:?}"))?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Serializing profile to YAML")
    }

    pub fn validate(&self) -> Result<()> {
        for (from, to) in &self.renames {
            ensure!(!from.is_empty(), "Profile rename source cannot be empty");
            ensure!(
                Field::from_name(to).is_some(),
                "Profile renames '{from}' to '{to}', which is not a service report column"
            );
        }
        ensure!(
            !self.erase.contains(&Field::UserServiceId),
            "UserServiceId cannot be erased; it is the deduplication watermark"
        );
        Ok(())
    }

    /// Every column nulled on ingest: the fixed amounts, then the profile's own.
    pub fn erased_fields(&self) -> impl Iterator<Item = Field> + '_ {
        ALWAYS_ERASED
            .into_iter()
            .chain(self.erase.iter().copied())
            .unique()
    }

    pub fn is_date_alias(&self, header: &str) -> bool {
        let trimmed = header.trim();
        self.date_aliases
            .iter()
            .any(|alias| alias.eq_ignore_ascii_case(trimmed))
    }

    pub fn canonical_name<'a>(&'a self, header: &'a str) -> &'a str {
        self.renames
            .get(header)
            .map(String::as_str)
            .unwrap_or(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn default_profile_maps_known_aliases() {
        let profile = IngestProfile::default();
        assert_eq!(profile.canonical_name("CDT"), "CreatDate");
        assert_eq!(profile.canonical_name("SavingOffUsed"), "Package");
        assert_eq!(profile.canonical_name("cdt"), "cdt");
        assert!(profile.is_date_alias("CreatDate"));
        assert!(profile.is_date_alias(" cdt "));
        assert!(!profile.is_date_alias("Row"));
    }

    #[test]
    fn partial_yaml_keeps_remaining_defaults() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "renames:\n  CreatedAt: CreatDate\n").unwrap();
        let profile = IngestProfile::load(file.path()).expect("load profile");
        assert_eq!(profile.canonical_name("CreatedAt"), "CreatDate");
        assert_eq!(profile.canonical_name("CDT"), "CDT");
        assert_eq!(profile.erase, vec![Field::ServicePrice, Field::Package]);
        assert_eq!(profile.date_aliases, IngestProfile::default().date_aliases);
    }

    #[test]
    fn load_rejects_unknown_targets_and_id_erasure() {
        let mut bad_target = NamedTempFile::new().expect("temp file");
        writeln!(bad_target, "renames:\n  CDT: CreatedOn\n").unwrap();
        assert!(IngestProfile::load(bad_target.path()).is_err());

        let mut bad_erase = NamedTempFile::new().expect("temp file");
        writeln!(bad_erase, "erase: [UserServiceId]\n").unwrap();
        assert!(IngestProfile::load(bad_erase.path()).is_err());
    }

    #[test]
    fn empty_erase_list_still_erases_amounts() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "erase: []\n").unwrap();
        let profile = IngestProfile::load(file.path()).expect("load profile");
        assert!(profile.erase.is_empty());
        assert_eq!(
            profile.erased_fields().collect::<Vec<_>>(),
            vec![Field::ServicePrice, Field::Package]
        );

        let extended = IngestProfile {
            erase: vec![Field::Package, Field::Username],
            ..IngestProfile::default()
        };
        assert_eq!(
            extended.erased_fields().collect::<Vec<_>>(),
            vec![Field::ServicePrice, Field::Package, Field::Username]
        );
    }

    #[test]
    fn yaml_round_trip_preserves_profile() {
        let profile = IngestProfile::default();
        let yaml = profile.to_yaml_string().expect("yaml");
        let parsed: IngestProfile = serde_yaml::from_str(&yaml).expect("parse");
        assert_eq!(parsed, profile);
    }
}

//! Lab context a state operates over. Read-only to the engine.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencingRun {
    pub run_name: String,
    pub run_directory: PathBuf,
    pub flowcell_label: String,
    pub run_date: NaiveDate,
    /// Lanes loaded on the flowcell with the samples placed on each.
    pub lanes: Vec<LaneContents>,
    /// Where this run's demultiplex output lives, once known.
    #[serde(default)]
    pub demultiplex_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneContents {
    /// 1-based.
    pub lane: u8,
    pub sample_keys: Vec<String>,
}

impl SequencingRun {
    pub fn has_lane(&self, lane: u8) -> bool {
        self.lanes.iter().any(|contents| contents.lane == lane)
    }

    pub fn has_sample(&self, sample_key: &str) -> bool {
        self.lanes
            .iter()
            .any(|contents| contents.sample_keys.iter().any(|key| key == sample_key))
    }

    pub fn sample_on_lane(&self, sample_key: &str, lane: u8) -> bool {
        self.lanes
            .iter()
            .filter(|contents| contents.lane == lane)
            .any(|contents| contents.sample_keys.iter().any(|key| key == sample_key))
    }

    /// Directory name of the run folder, used to match demultiplex tasks.
    pub fn directory_name(&self) -> Option<String> {
        self.run_directory
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleContext {
    pub sample_key: String,
    #[serde(default)]
    pub gender: Option<String>,
}

/// One well of an arrays chip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArraysWell {
    pub chip_barcode: String,
    pub position: String,
    pub vessel_label: String,
}

impl ArraysWell {
    /// Red and green scanner images: `<data>/<chip>/<chip>_<position>_{Red,Grn}.idat`.
    pub fn idat_files(&self, data_path: &Path) -> [PathBuf; 2] {
        let chip_dir = data_path.join(&self.chip_barcode);
        ["Red", "Grn"].map(|channel| {
            chip_dir.join(format!("{}_{}_{channel}.idat", self.chip_barcode, self.position))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadGroup {
    pub flowcell: String,
    pub lane: u8,
    pub sample: String,
}

/// `<flowcell>_<lane>_<sample>`
pub fn read_group_id(flowcell: &str, lane: u8, sample: &str) -> String {
    format!("{flowcell}_{lane}_{sample}")
}

/// Splits a read-group id. The sample keeps any further underscores.
pub fn parse_read_group(id: &str) -> Option<ReadGroup> {
    let mut parts = id.splitn(3, '_');
    let flowcell = parts.next()?;
    let lane = parts.next()?.parse().ok()?;
    let sample = parts.next()?;
    if flowcell.is_empty() || sample.is_empty() {
        return None;
    }
    Some(ReadGroup {
        flowcell: flowcell.to_string(),
        lane,
        sample: sample.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn read_group_round_trip() {
        let id = read_group_id("HXYZ", 2, "SM-7_B");
        assert_eq!(id, "HXYZ_2_SM-7_B");
        assert_eq!(
            parse_read_group(&id),
            Some(ReadGroup {
                flowcell: "HXYZ".to_string(),
                lane: 2,
                sample: "SM-7_B".to_string(),
            })
        );
    }

    #[rstest]
    #[case::undetermined("Undetermined")]
    #[case::bad_lane("HXYZ_x_SM-1")]
    #[case::no_sample("HXYZ_1_")]
    #[case::two_fields("HXYZ_1")]
    fn rejects_malformed_read_groups(#[case] id: &str) {
        assert_eq!(parse_read_group(id), None);
    }

    #[test]
    fn idat_files_follow_scanner_layout() {
        let well = ArraysWell {
            chip_barcode: "2041".to_string(),
            position: "R01C01".to_string(),
            vessel_label: "2041_R01C01".to_string(),
        };
        assert_eq!(
            well.idat_files(Path::new("/data")),
            [
                PathBuf::from("/data/2041/2041_R01C01_Red.idat"),
                PathBuf::from("/data/2041/2041_R01C01_Grn.idat"),
            ]
        );
    }

    #[test]
    fn directory_name_is_the_last_component() {
        let run = SequencingRun {
            run_name: "run1".to_string(),
            run_directory: PathBuf::from("/seq/runs/240301_A01_0001_BHXYZ"),
            flowcell_label: "HXYZ".to_string(),
            run_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            lanes: vec![
                LaneContents {
                    lane: 1,
                    sample_keys: vec!["SM-1".to_string()],
                },
                LaneContents {
                    lane: 2,
                    sample_keys: vec!["SM-1".to_string(), "SM-2".to_string()],
                },
            ],
            demultiplex_dir: None,
        };
        assert_eq!(run.directory_name().as_deref(), Some("240301_A01_0001_BHXYZ"));
        assert!(run.has_lane(2));
        assert!(!run.has_lane(3));
        assert!(run.sample_on_lane("SM-2", 2));
        assert!(!run.sample_on_lane("SM-2", 1));
        assert!(run.has_sample("SM-1"));
    }
}

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::UploadError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadRole {
    First,
    Second,
    Single,
}

impl ReadRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ReadRole::First => "R1",
            ReadRole::Second => "R2",
            ReadRole::Single => "single",
        }
    }
}

impl fmt::Display for ReadRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Read files of one sample. A sample is paired-end or single-end, so the
/// two shapes never coexist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SampleReads {
    #[default]
    Empty,
    Paired {
        first: Vec<PathBuf>,
        second: Vec<PathBuf>,
    },
    Single {
        files: Vec<PathBuf>,
    },
}

impl SampleReads {
    pub fn paired(first: Vec<PathBuf>, second: Vec<PathBuf>) -> Self {
        SampleReads::Paired { first, second }
    }

    pub fn single(files: Vec<PathBuf>) -> Self {
        SampleReads::Single { files }
    }

    /// Adds `path` under `role`, rejecting a role that conflicts with the
    /// shape the sample already has.
    pub fn push(&mut self, sample: &str, role: ReadRole, path: PathBuf) -> Result<(), UploadError> {
        match self {
            SampleReads::Empty => {
                *self = match role {
                    ReadRole::First => SampleReads::paired(vec![path], Vec::new()),
                    ReadRole::Second => SampleReads::paired(Vec::new(), vec![path]),
                    ReadRole::Single => SampleReads::single(vec![path]),
                };
            }
            SampleReads::Paired { first, second } => match role {
                ReadRole::First => first.push(path),
                ReadRole::Second => second.push(path),
                ReadRole::Single => {
                    let (role, conflicting) = if first.is_empty() {
                        (ReadRole::Second, second.clone())
                    } else {
                        (ReadRole::First, first.clone())
                    };
                    return Err(UploadError::MixedRole {
                        sample: sample.to_string(),
                        role: role.as_str(),
                        path,
                        conflicting,
                    });
                }
            },
            SampleReads::Single { files } => {
                if role != ReadRole::Single {
                    return Err(UploadError::MixedRole {
                        sample: sample.to_string(),
                        role: role.as_str(),
                        path,
                        conflicting: files.clone(),
                    });
                }
                files.push(path);
            }
        }
        Ok(())
    }

    pub fn first_reads(&self) -> &[PathBuf] {
        match self {
            SampleReads::Paired { first, .. } => first,
            _ => &[],
        }
    }

    pub fn second_reads(&self) -> &[PathBuf] {
        match self {
            SampleReads::Paired { second, .. } => second,
            _ => &[],
        }
    }

    pub fn single_reads(&self) -> &[PathBuf] {
        match self {
            SampleReads::Single { files } => files,
            _ => &[],
        }
    }

    pub fn is_paired(&self) -> bool {
        matches!(self, SampleReads::Paired { .. })
    }

    pub fn len(&self) -> usize {
        self.first_reads().len() + self.second_reads().len() + self.single_reads().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleFiles {
    pub reads: SampleReads,
    pub reference_fasta: Vec<PathBuf>,
    pub primer_bed: Vec<PathBuf>,
}

impl SampleFiles {
    pub fn new(reads: SampleReads) -> Self {
        Self {
            reads,
            reference_fasta: Vec::new(),
            primer_bed: Vec::new(),
        }
    }

    pub fn first_reads(&self) -> &[PathBuf] {
        self.reads.first_reads()
    }

    pub fn second_reads(&self) -> &[PathBuf] {
        self.reads.second_reads()
    }

    pub fn single_reads(&self) -> &[PathBuf] {
        self.reads.single_reads()
    }

    /// Every local file in upload registration order: reads, then reference
    /// fasta, then primer bed.
    pub fn all_files(&self) -> impl Iterator<Item = &Path> {
        self.first_reads()
            .iter()
            .chain(self.second_reads())
            .chain(self.single_reads())
            .chain(&self.reference_fasta)
            .chain(&self.primer_bed)
            .map(PathBuf::as_path)
    }

    /// Candidate lists in the order remote targets are resolved against.
    pub fn match_candidates(&self) -> [&[PathBuf]; 5] {
        [
            self.first_reads(),
            self.second_reads(),
            self.single_reads(),
            &self.reference_fasta,
            &self.primer_bed,
        ]
    }
}

pub type SampleMap = BTreeMap<String, SampleFiles>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Workflow {
    ShortReadMngs,
    ConsensusGenome,
    Amr,
}

impl Workflow {
    pub fn as_str(self) -> &'static str {
        match self {
            Workflow::ShortReadMngs => "short-read-mngs",
            Workflow::ConsensusGenome => "consensus-genome",
            Workflow::Amr => "amr",
        }
    }
}

impl fmt::Display for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Technology {
    Illumina,
    Nanopore,
}

impl Technology {
    pub fn wire_name(self) -> &'static str {
        match self {
            Technology::Illumina => "Illumina",
            Technology::Nanopore => "ONT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WetlabProtocol {
    #[value(name = "artic-v3")]
    ArticV3,
    #[value(name = "artic-v3-short-amplicons")]
    ArticShortAmplicons,
    #[value(name = "artic-v4")]
    ArticV4,
    Msspe,
    CombinedMsspeArtic,
    Snap,
    Ampliseq,
    Covidseq,
    Midnight,
    Varskip,
}

impl WetlabProtocol {
    pub fn wire_name(self) -> &'static str {
        match self {
            WetlabProtocol::ArticV3 => "artic",
            WetlabProtocol::ArticShortAmplicons => "artic_short_amplicons",
            WetlabProtocol::ArticV4 => "artic_v4",
            WetlabProtocol::Msspe => "msspe",
            WetlabProtocol::CombinedMsspeArtic => "combined_msspe_artic",
            WetlabProtocol::Snap => "snap",
            WetlabProtocol::Ampliseq => "ampliseq",
            WetlabProtocol::Covidseq => "covidseq",
            WetlabProtocol::Midnight => "midnight",
            WetlabProtocol::Varskip => "varskip",
        }
    }
}

/// Per-run sample creation options shared by every sample in the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleOptions {
    pub workflow: Workflow,
    pub technology: Option<Technology>,
    pub wetlab_protocol: Option<WetlabProtocol>,
}

impl SampleOptions {
    pub fn new(workflow: Workflow) -> Self {
        Self {
            workflow,
            technology: None,
            wetlab_protocol: None,
        }
    }
}

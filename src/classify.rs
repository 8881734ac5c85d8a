//! Filename conventions for sequencing read files.
//!
//! Recognized names follow `<sample>[_L###][_R1|_R2[_001]].<ext>[.gz]` where
//! `<ext>` is one of `fasta`, `fa`, `fastq` or `fq`. Matching is case-sensitive
//! and only ever looks at the final path component.

use std::borrow::Cow;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::domain::ReadRole;

static INPUT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.(fasta|fa|fastq|fq)(\.gz)?$").unwrap());

static SUFFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(_L(?P<lane>[0-9]{3}))?(_R[12](_001)?)?\.(fasta|fa|fastq|fq)(\.gz)?$").unwrap()
});

static FIRST_READ_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_R1(_001)?\.(fasta|fa|fastq|fq)(\.gz)?$").unwrap());

static SECOND_READ_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_R2(_001)?\.(fasta|fa|fastq|fq)(\.gz)?$").unwrap());

fn file_name(path: &Path) -> Cow<'_, str> {
    path.file_name()
        .map(|name| name.to_string_lossy())
        .unwrap_or_default()
}

pub fn is_input(path: &Path) -> bool {
    INPUT_RE.is_match(&file_name(path))
}

/// Canonical sample name: the file name with extension, lane and read
/// markers removed. Directories never contribute to the name.
pub fn sample_name(path: &Path) -> String {
    SUFFIX_RE.replace(&file_name(path), "").into_owned()
}

pub fn is_first_read(path: &Path) -> bool {
    FIRST_READ_RE.is_match(&file_name(path))
}

pub fn is_second_read(path: &Path) -> bool {
    SECOND_READ_RE.is_match(&file_name(path))
}

pub fn lane_number(path: &Path) -> Option<u32> {
    SUFFIX_RE
        .captures(&file_name(path))
        .and_then(|caps| caps.name("lane"))
        .and_then(|lane| lane.as_str().parse().ok())
}

/// Role of an input file, or `None` when the path is not a recognized input.
pub fn read_role(path: &Path) -> Option<ReadRole> {
    if !is_input(path) {
        return None;
    }
    if is_first_read(path) {
        Some(ReadRole::First)
    } else if is_second_read(path) {
        Some(ReadRole::Second)
    } else {
        Some(ReadRole::Single)
    }
}

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::classify;
use crate::domain::{SampleFiles, SampleMap, SampleReads};
use crate::error::{PartialDiscovery, UploadError};
use crate::orchestrator::{ProgressEvent, ProgressSink};

/// Walks `root` and groups every recognized read file by sample name.
///
/// Role conflicts abort the walk as soon as they are seen; pairing and lane
/// checks run once the walk completes. Either way the grouping built so far
/// is handed back inside [`PartialDiscovery`].
pub fn group_samples(
    root: &Path,
    verbose: bool,
    sink: &dyn ProgressSink,
) -> Result<SampleMap, PartialDiscovery> {
    let metadata = fs::metadata(root).map_err(|err| PartialDiscovery {
        partial: SampleMap::new(),
        error: UploadError::PathError {
            path: root.to_path_buf(),
            message: err.to_string(),
        },
    })?;
    if !metadata.is_dir() {
        return Err(PartialDiscovery {
            partial: SampleMap::new(),
            error: UploadError::NotADirectory(root.to_path_buf()),
        });
    }

    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .try_fold(Grouping::new(verbose, sink), Grouping::visit)?
        .finish()
}

/// Builds the one-sample mapping used when files are named explicitly.
pub fn sample_from_paths(
    r1: PathBuf,
    r2: Option<PathBuf>,
    sample_name: Option<String>,
) -> Result<SampleMap, UploadError> {
    if r2.as_ref() == Some(&r1) {
        return Err(UploadError::InvalidSampleArgs(
            "r1 and r2 cannot be the same file".to_string(),
        ));
    }
    let name = sample_name
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| classify::sample_name(&r1));
    let reads = match r2 {
        Some(r2) => SampleReads::paired(vec![r1], vec![r2]),
        None => SampleReads::single(vec![r1]),
    };
    Ok(SampleMap::from([(name, SampleFiles::new(reads))]))
}

/// Attaches caller-supplied auxiliary files to every sample.
pub fn attach_auxiliary(
    samples: &mut SampleMap,
    reference_fasta: Option<&Path>,
    primer_bed: Option<&Path>,
) {
    for files in samples.values_mut() {
        if let Some(path) = reference_fasta {
            files.reference_fasta = vec![path.to_path_buf()];
        }
        if let Some(path) = primer_bed {
            files.primer_bed = vec![path.to_path_buf()];
        }
    }
}

struct Grouping<'a> {
    samples: SampleMap,
    verbose: bool,
    sink: &'a dyn ProgressSink,
}

impl<'a> Grouping<'a> {
    fn new(verbose: bool, sink: &'a dyn ProgressSink) -> Self {
        Self {
            samples: SampleMap::new(),
            verbose,
            sink,
        }
    }

    fn report(&self, message: String) {
        tracing::debug!("{message}");
        if self.verbose {
            self.sink.event(ProgressEvent {
                message,
                elapsed: None,
            });
        }
    }

    fn halt(self, error: UploadError) -> PartialDiscovery {
        PartialDiscovery {
            partial: self.samples,
            error,
        }
    }

    fn visit(mut self, entry: walkdir::Result<DirEntry>) -> Result<Self, PartialDiscovery> {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                return Err(self.halt(UploadError::PathError {
                    path,
                    message: err.to_string(),
                }));
            }
        };
        if entry.file_type().is_dir() {
            return Ok(self);
        }

        let path = entry.into_path();
        let Some(role) = classify::read_role(&path) else {
            self.report(format!("ignored {}", path.display()));
            return Ok(self);
        };
        let sample = classify::sample_name(&path);
        self.report(format!(
            "detected {role} sample file for sample: {sample} at path {}",
            path.display()
        ));

        let reads = &mut self.samples.entry(sample.clone()).or_default().reads;
        if let Err(error) = reads.push(&sample, role, path) {
            return Err(self.halt(error));
        }
        Ok(self)
    }

    fn finish(mut self) -> Result<SampleMap, PartialDiscovery> {
        let mut failure = None;
        for (name, files) in self.samples.iter_mut() {
            if let Err(error) = finalize(name, &mut files.reads) {
                failure = Some(error);
                break;
            }
        }
        if let Some(error) = failure {
            return Err(self.halt(error));
        }
        for name in self.samples.keys() {
            self.report(format!("detected sample: {name}"));
        }
        Ok(self.samples)
    }
}

fn finalize(sample: &str, reads: &mut SampleReads) -> Result<(), UploadError> {
    match reads {
        SampleReads::Paired { first, second } => {
            if first.len() != second.len() {
                return Err(UploadError::UnbalancedPair {
                    sample: sample.to_string(),
                    first: first.len(),
                    second: second.len(),
                });
            }
            sort_by_lane(first);
            sort_by_lane(second);
            for (r1, r2) in first.iter().zip(second.iter()) {
                if classify::lane_number(r1) != classify::lane_number(r2) {
                    return Err(UploadError::LaneMismatch {
                        sample: sample.to_string(),
                        first: r1.clone(),
                        second: r2.clone(),
                    });
                }
            }
        }
        SampleReads::Single { files } => sort_by_lane(files),
        SampleReads::Empty => {}
    }
    Ok(())
}

// Stable: files without a lane keep their discovery order.
fn sort_by_lane(paths: &mut [PathBuf]) {
    paths.sort_by_key(|path| classify::lane_number(path));
}

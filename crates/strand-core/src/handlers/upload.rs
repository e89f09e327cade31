//! Hands written record files to the bulk loader.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::app::config::LoaderConfig;
use crate::ports::BulkLoader;

use super::Verdict;

/// One record file and the loader control file that describes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordUpload {
    pub data_file: PathBuf,
    pub control_file: &'static str,
    pub log_name: String,
}

impl RecordUpload {
    pub fn new(data_file: impl Into<PathBuf>, control_file: &'static str) -> Self {
        let data_file = data_file.into();
        let log_name = data_file
            .file_name()
            .map(|name| format!("{}.log", name.to_string_lossy()))
            .unwrap_or_else(|| format!("{control_file}.log"));
        Self {
            data_file,
            control_file,
            log_name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Loaded,
    /// Every upload was attempted; `failed` of them exited non-zero.
    LoaderFailed { failed: usize, total: usize },
    /// The loader could not be started at all.
    Unavailable(String),
}

impl UploadOutcome {
    /// Loader outages suspend the task so it can be retried once the loader is back.
    pub fn into_verdict(self) -> Verdict {
        match self {
            UploadOutcome::Loaded => Verdict::Complete,
            UploadOutcome::LoaderFailed { failed, total } => {
                Verdict::Failed(format!("Failed to upload metrics ({failed} of {total} loads failed)"))
            }
            UploadOutcome::Unavailable(reason) => Verdict::Suspended(reason),
        }
    }
}

pub struct MetricsUploader {
    loader: Arc<dyn BulkLoader>,
    config: LoaderConfig,
}

impl MetricsUploader {
    pub fn new(loader: Arc<dyn BulkLoader>, config: LoaderConfig) -> Self {
        Self { loader, config }
    }

    pub fn tokens(&self, upload: &RecordUpload) -> Vec<String> {
        let mut tokens = Vec::with_capacity(self.config.extra_args.len() + 4);
        tokens.push(self.config.program.clone());
        tokens.extend(self.config.extra_args.iter().cloned());
        tokens.push(format!(
            "control={}",
            self.config.control_dir.join(upload.control_file).display()
        ));
        tokens.push(format!(
            "log={}",
            self.config.log_dir.join(&upload.log_name).display()
        ));
        tokens.push(format!("data={}", upload.data_file.display()));
        tokens
    }

    /// Runs every upload, even after one has failed. Record files are left in place.
    pub async fn upload_all(&self, uploads: &[RecordUpload]) -> UploadOutcome {
        let mut failed = 0;
        for upload in uploads {
            let tokens = self.tokens(upload);
            match self.loader.run_sync_process(&tokens).await {
                Ok(output) if output.success() => {
                    debug!(data = %upload.data_file.display(), "records loaded");
                }
                Ok(output) => {
                    failed += 1;
                    warn!(
                        data = %upload.data_file.display(),
                        exit_code = output.exit_code,
                        output = %output.captured_output,
                        "loader rejected records"
                    );
                }
                Err(err) => return UploadOutcome::Unavailable(err.to_string()),
            }
        }
        if failed == 0 {
            UploadOutcome::Loaded
        } else {
            UploadOutcome::LoaderFailed {
                failed,
                total: uploads.len(),
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedLoader;
    use super::*;
    use rstest::rstest;

    fn config() -> LoaderConfig {
        LoaderConfig {
            program: "sqlldr".to_string(),
            extra_args: vec!["userid=dw".to_string()],
            control_dir: PathBuf::from("/ctl"),
            log_dir: PathBuf::from("/logs"),
        }
    }

    fn uploads() -> Vec<RecordUpload> {
        vec![
            RecordUpload::new("/out/a.dat", "a.ctl"),
            RecordUpload::new("/out/b.dat", "b.ctl"),
            RecordUpload::new("/out/c.dat", "c.ctl"),
        ]
    }

    #[test]
    fn loader_tokens() {
        let uploader = MetricsUploader::new(Arc::new(ScriptedLoader::default()), config());
        assert_eq!(
            uploader.tokens(&RecordUpload::new("/out/a.dat", "a.ctl")),
            vec!["sqlldr", "userid=dw", "control=/ctl/a.ctl", "log=/logs/a.dat.log", "data=/out/a.dat"]
        );
    }

    #[rstest]
    #[case::all_loaded(vec![0, 0, 0], UploadOutcome::Loaded)]
    #[case::one_rejected(vec![0, 1, 0], UploadOutcome::LoaderFailed { failed: 1, total: 3 })]
    #[tokio::test]
    async fn every_upload_is_attempted(#[case] codes: Vec<i32>, #[case] expected: UploadOutcome) {
        let loader = Arc::new(ScriptedLoader::with_exit_codes(codes));
        let uploader = MetricsUploader::new(loader.clone(), config());

        assert_eq!(uploader.upload_all(&uploads()).await, expected);
        assert_eq!(loader.calls().len(), 3);
    }

    #[tokio::test]
    async fn spawn_failure_suspends() {
        let uploader = MetricsUploader::new(Arc::new(ScriptedLoader::unavailable()), config());

        let verdict = uploader.upload_all(&uploads()).await.into_verdict();

        assert!(matches!(verdict, Verdict::Suspended(reason) if reason.contains("sqlldr")));
    }
}

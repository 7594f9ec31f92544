use crate::error::{ClientError, ClientResult};
use crate::transport::{Api, FilePayload, GradeCard};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

const DOWNLOAD_FILENAME: &str = "grading_results.json";

/// Grading page: upload a student PDF and an answer-key PDF, process them,
/// download the result file.
///
/// Exactly two cancellation tokens exist at any time, one per long-running
/// operation; starting a new process/download cancels its predecessor.
pub struct GradingSession {
    api: Arc<dyn Api>,
    data_dir: PathBuf,
    student_pdf: Option<FilePayload>,
    key_pdf: Option<FilePayload>,
    results: Option<Vec<GradeCard>>,
    process_token: CancellationToken,
    download_token: CancellationToken,
}

impl GradingSession {
    pub fn new(api: Arc<dyn Api>, data_dir: PathBuf) -> Self {
        Self {
            api,
            data_dir,
            student_pdf: None,
            key_pdf: None,
            results: None,
            process_token: CancellationToken::new(),
            download_token: CancellationToken::new(),
        }
    }

    pub fn set_student_pdf(&mut self, file: FilePayload) -> ClientResult<()> {
        require_pdf(&file)?;
        self.student_pdf = Some(file);
        Ok(())
    }

    pub fn set_key_pdf(&mut self, file: FilePayload) -> ClientResult<()> {
        require_pdf(&file)?;
        self.key_pdf = Some(file);
        Ok(())
    }

    pub fn results(&self) -> Option<&[GradeCard]> {
        self.results.as_deref()
    }

    pub async fn process(&mut self) -> ClientResult<()> {
        let (Some(student), Some(key)) = (self.student_pdf.clone(), self.key_pdf.clone()) else {
            return Err(ClientError::UserInput(
                "Upload both PDFs before processing".into(),
            ));
        };

        self.process_token.cancel();
        self.process_token = CancellationToken::new();
        let cancel = self.process_token.clone();

        let results = self.api.grade_process(student, key, &cancel).await?;
        info!("Grading produced {} result cards", results.len());
        self.results = Some(results);
        Ok(())
    }

    /// Fetches the result file and writes it as `grading_results.json` under
    /// the data directory. Returns the written path.
    pub async fn download(&mut self) -> ClientResult<PathBuf> {
        self.download_token.cancel();
        self.download_token = CancellationToken::new();
        let cancel = self.download_token.clone();

        let bytes = self.api.grade_download(&cancel).await?;

        let path = self.data_dir.join(DOWNLOAD_FILENAME);
        tokio::fs::create_dir_all(&self.data_dir)
            .await
            .map_err(|e| ClientError::UserInput(format!("Cannot create download directory: {e}")))?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| ClientError::UserInput(format!("Cannot write {}: {e}", path.display())))?;
        Ok(path)
    }

    /// Cancels both operations and drops all page state. Idempotent.
    pub fn reset(&mut self) {
        self.process_token.cancel();
        self.download_token.cancel();
        self.process_token = CancellationToken::new();
        self.download_token = CancellationToken::new();
        self.student_pdf = None;
        self.key_pdf = None;
        self.results = None;
    }

    pub fn dispose(&mut self) {
        self.process_token.cancel();
        self.download_token.cancel();
    }
}

fn require_pdf(file: &FilePayload) -> ClientResult<()> {
    match Path::new(&file.filename)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
    {
        Some(ext) if ext == "pdf" => Ok(()),
        _ => Err(ClientError::UserInput(format!(
            "Expected a PDF, got {}",
            file.filename
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows::testing::{StubApi, pdf};

    #[tokio::test]
    async fn process_requires_both_pdfs() {
        let api = Arc::new(StubApi::new());
        let dir = tempfile::tempdir().unwrap();
        let mut grading = GradingSession::new(api.clone(), dir.path().to_path_buf());
        grading.set_student_pdf(pdf("student.pdf")).unwrap();

        let err = grading.process().await.unwrap_err();
        assert!(matches!(err, ClientError::UserInput(_)));
        assert!(api.recorded().is_empty());
    }

    #[tokio::test]
    async fn process_sends_the_expected_multipart_fields() {
        let api = Arc::new(StubApi::new());
        let dir = tempfile::tempdir().unwrap();
        let mut grading = GradingSession::new(api.clone(), dir.path().to_path_buf());
        grading.set_student_pdf(pdf("student.pdf")).unwrap();
        grading.set_key_pdf(pdf("key.pdf")).unwrap();

        grading.process().await.unwrap();

        assert_eq!(
            api.recorded(),
            vec!["POST /check/process student_pdf=student.pdf paper_k_pdf=key.pdf"]
        );
        assert_eq!(grading.results().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn download_writes_the_result_file() {
        let api = Arc::new(StubApi::new());
        let dir = tempfile::tempdir().unwrap();
        let mut grading = GradingSession::new(api.clone(), dir.path().to_path_buf());

        let path = grading.download().await.unwrap();
        assert!(path.ends_with("grading_results.json"));
        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content, r#"{"results":[]}"#);
    }

    #[tokio::test]
    async fn a_new_process_cancels_the_previous_token() {
        let api = Arc::new(StubApi::new());
        let dir = tempfile::tempdir().unwrap();
        let mut grading = GradingSession::new(api.clone(), dir.path().to_path_buf());
        grading.set_student_pdf(pdf("student.pdf")).unwrap();
        grading.set_key_pdf(pdf("key.pdf")).unwrap();

        let previous = grading.process_token.clone();
        grading.process().await.unwrap();
        assert!(previous.is_cancelled());
        assert!(!grading.process_token.is_cancelled());
    }

    #[tokio::test]
    async fn non_pdf_inputs_are_refused() {
        let api = Arc::new(StubApi::new());
        let dir = tempfile::tempdir().unwrap();
        let mut grading = GradingSession::new(api, dir.path().to_path_buf());

        let file = FilePayload {
            filename: "notes.txt".into(),
            bytes: vec![],
        };
        assert!(matches!(
            grading.set_student_pdf(file).unwrap_err(),
            ClientError::UserInput(_)
        ));
    }

    #[tokio::test]
    async fn reset_is_idempotent() {
        let api = Arc::new(StubApi::new());
        let dir = tempfile::tempdir().unwrap();
        let mut grading = GradingSession::new(api, dir.path().to_path_buf());
        grading.set_student_pdf(pdf("student.pdf")).unwrap();
        grading.set_key_pdf(pdf("key.pdf")).unwrap();
        grading.process().await.unwrap();

        grading.reset();
        assert!(grading.results().is_none());
        assert!(grading.student_pdf.is_none());
        grading.reset();
        assert!(grading.results().is_none());
        assert!(grading.key_pdf.is_none());
    }
}

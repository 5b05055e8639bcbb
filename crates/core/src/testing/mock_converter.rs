//! Mock converter for testing.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::converter::{
    ConverterError, MediaTransformer, NormalizeResult, NotePackager, PackResult, TransformParams,
};

/// Which converter stage a recorded call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockStage {
    Normalize,
    Pack,
}

/// A recorded converter call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedStage {
    pub stage: MockStage,
    pub input: PathBuf,
    pub output: PathBuf,
    /// Whether the call succeeded.
    pub success: bool,
}

/// Mock implementation of both converter traits.
///
/// Provides controllable behavior for testing:
/// - Record normalize and pack calls
/// - Write placeholder output files like the real tool would
/// - Inject a one-shot error or panic per stage
/// - Slow stages down and report peak concurrency
///
/// # Example
///
/// ```rust,ignore
/// use roundnote_core::testing::MockConverter;
///
/// let converter = MockConverter::new();
/// converter
///     .set_pack_error(ConverterError::encoding_tool(Some(1), "boom"))
///     .await;
///
/// // Run a job...
///
/// assert_eq!(converter.recorded_stages().await.len(), 2);
/// ```
#[derive(Debug)]
pub struct MockConverter {
    stages: Arc<RwLock<Vec<RecordedStage>>>,
    normalize_error: Arc<RwLock<Option<ConverterError>>>,
    pack_error: Arc<RwLock<Option<ConverterError>>>,
    panic_on_normalize: Arc<RwLock<bool>>,
    stage_delay: Arc<RwLock<Duration>>,
    active: AtomicUsize,
    peak_active: AtomicUsize,
}

impl Default for MockConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConverter {
    /// Create a new mock converter.
    pub fn new() -> Self {
        Self {
            stages: Arc::new(RwLock::new(Vec::new())),
            normalize_error: Arc::new(RwLock::new(None)),
            pack_error: Arc::new(RwLock::new(None)),
            panic_on_normalize: Arc::new(RwLock::new(false)),
            stage_delay: Arc::new(RwLock::new(Duration::ZERO)),
            active: AtomicUsize::new(0),
            peak_active: AtomicUsize::new(0),
        }
    }

    /// Get all recorded stage calls.
    pub async fn recorded_stages(&self) -> Vec<RecordedStage> {
        self.stages.read().await.clone()
    }

    /// Configure the next normalize call to fail with the given error.
    pub async fn set_normalize_error(&self, error: ConverterError) {
        *self.normalize_error.write().await = Some(error);
    }

    /// Configure the next pack call to fail with the given error.
    pub async fn set_pack_error(&self, error: ConverterError) {
        *self.pack_error.write().await = Some(error);
    }

    /// Make the next normalize call panic.
    pub async fn panic_on_next_normalize(&self) {
        *self.panic_on_normalize.write().await = true;
    }

    /// Set the simulated duration of each stage.
    pub async fn set_stage_delay(&self, delay: Duration) {
        *self.stage_delay.write().await = delay;
    }

    /// Highest number of stages observed running at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak_active.load(Ordering::SeqCst)
    }

    async fn run_stage(
        &self,
        stage: MockStage,
        input: &Path,
        output: &Path,
        pending_error: &RwLock<Option<ConverterError>>,
        content: &[u8],
    ) -> Result<u64, ConverterError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_active.fetch_max(now, Ordering::SeqCst);

        let result = self.stage_body(input, output, pending_error, content).await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        self.stages.write().await.push(RecordedStage {
            stage,
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            success: result.is_ok(),
        });
        result
    }

    async fn stage_body(
        &self,
        input: &Path,
        output: &Path,
        pending_error: &RwLock<Option<ConverterError>>,
        content: &[u8],
    ) -> Result<u64, ConverterError> {
        let delay = *self.stage_delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if !tokio::fs::try_exists(input).await.unwrap_or(false) {
            return Err(ConverterError::InputNotFound {
                path: input.to_path_buf(),
            });
        }

        if let Some(error) = pending_error.write().await.take() {
            return Err(error);
        }

        tokio::fs::write(output, content).await?;
        Ok(content.len() as u64)
    }
}

#[async_trait]
impl MediaTransformer for MockConverter {
    fn name(&self) -> &str {
        "mock"
    }

    async fn normalize(
        &self,
        input: &Path,
        output: &Path,
        params: &TransformParams,
    ) -> Result<NormalizeResult, ConverterError> {
        let should_panic = std::mem::take(&mut *self.panic_on_normalize.write().await);
        if should_panic {
            panic!("mock converter panic");
        }

        let size = self
            .run_stage(
                MockStage::Normalize,
                input,
                output,
                &self.normalize_error,
                b"mock normalized clip",
            )
            .await?;

        Ok(NormalizeResult {
            output_path: output.to_path_buf(),
            side: params.target_square_side,
            duration_secs: f64::from(params.max_duration_secs),
            trimmed: false,
            output_size_bytes: size,
            elapsed_ms: 0,
        })
    }
}

#[async_trait]
impl NotePackager for MockConverter {
    fn name(&self) -> &str {
        "mock"
    }

    async fn pack(
        &self,
        input: &Path,
        output: &Path,
        params: &TransformParams,
    ) -> Result<PackResult, ConverterError> {
        let size = self
            .run_stage(
                MockStage::Pack,
                input,
                output,
                &self.pack_error,
                b"mock video note",
            )
            .await?;

        Ok(PackResult {
            output_path: output.to_path_buf(),
            side: params.note_side,
            output_size_bytes: size,
            elapsed_ms: 0,
        })
    }
}

use crate::error::{SamError, SamResult};
use log::info;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use std::ops::{Deref, DerefMut};
use std::path::Path;

/// Execution backend for one ONNX session. The CUDA variant carries the
/// optional per-device memory limit in bytes.
#[derive(Copy, Clone, Debug)]
pub enum ExecutionProvider {
    CPU,
    CUDA {
        device_id: i32,
        memory_limit: Option<usize>,
    },
    TensorRT(i32),
}

/// Session settings applied identically to the encoder and decoder.
#[derive(Copy, Clone, Debug)]
pub struct SessionConfig {
    pub threads: usize,
    pub provider: ExecutionProvider,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            threads: 4,
            provider: ExecutionProvider::CPU,
        }
    }
}

pub struct OnnxSession {
    pub(crate) session: Session,
}

impl Deref for OnnxSession {
    type Target = Session;

    fn deref(&self) -> &Self::Target {
        &self.session
    }
}

impl DerefMut for OnnxSession {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.session
    }
}

impl OnnxSession {
    pub fn new(url: impl AsRef<Path>, config: &SessionConfig) -> SamResult<Self> {
        let url = url.as_ref();
        if !url.is_file() {
            return Err(SamError::Load(format!(
                "model file {} not found",
                url.display()
            )));
        }

        let session = Session::builder()
            .and_then(|builder| builder.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|builder| builder.with_intra_threads(config.threads))
            .and_then(|builder| {
                builder.with_execution_providers([match config.provider {
                    ExecutionProvider::CUDA {
                        device_id,
                        memory_limit,
                    } => {
                        let mut provider =
                            ort::execution_providers::CUDAExecutionProvider::default()
                                .with_device_id(device_id);
                        if let Some(limit) = memory_limit {
                            provider = provider.with_memory_limit(limit);
                        }
                        provider.build().error_on_failure()
                    }
                    ExecutionProvider::TensorRT(id) => {
                        ort::execution_providers::TensorRTExecutionProvider::default()
                            .with_device_id(id)
                            .build()
                            .error_on_failure()
                    }
                    ExecutionProvider::CPU => {
                        ort::execution_providers::CPUExecutionProvider::default()
                            .build()
                            .error_on_failure()
                    }
                }])
            })
            .and_then(|builder| builder.commit_from_file(url))
            .map_err(|e| SamError::Load(format!("{}: {e}", url.display())))?;

        info!("ONNX session created from {}", url.display());
        Ok(OnnxSession { session })
    }
}

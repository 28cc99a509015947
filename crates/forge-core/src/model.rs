//! Text-to-image model handle
//!
//! The image model is the one piece of process-wide state. [`ModelHandle`]
//! loads it at most once, on first use or during warm-up. Concurrent first
//! callers wait for that single load instead of racing it. A failed load
//! leaves the handle empty, so the next caller tries again.
//!
//! Inference is serialised behind a fair mutex: the device runs one
//! generation at a time and waiting requests are served in arrival order.

use crate::catalog::params;
use crate::config::ImageParams;
use crate::error::ModelError;
use async_trait::async_trait;
use forge_artifact::ArtifactKind;
use forge_tools::{Bindings, StageDescriptor, StageExecutor};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

/// One image generation
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    /// Prompt after rewriting
    pub prompt: String,
    pub params: ImageParams,
}

/// Anything that turns a prompt into an image file
#[async_trait]
pub trait TextToImage: Send + Sync {
    /// Write an image for `request` to `output`
    ///
    /// # Errors
    /// Returns a `ModelError` if the model cannot load or inference fails.
    async fn generate(&self, request: &ImageRequest, output: &Path) -> Result<(), ModelError>;

    /// Prepare the model ahead of the first request
    ///
    /// # Errors
    /// Returns the load failure, if any.
    async fn warm_up(&self) -> Result<(), ModelError> {
        Ok(())
    }
}

/// Produces the loaded model for a [`ModelHandle`]
#[async_trait]
pub trait ModelLoader: Send + Sync {
    type Model: TextToImage;

    /// Load the model; called at most once per successful load
    ///
    /// # Errors
    /// Returns `ModelError` when the model is unavailable.
    async fn load(&self) -> Result<Self::Model, ModelError>;
}

/// Init-once model with a single-slot device lock
pub struct ModelHandle<L: ModelLoader> {
    loader: L,
    model: OnceCell<L::Model>,
    device: Mutex<()>,
    load_attempts: AtomicUsize,
}

impl<L: ModelLoader> ModelHandle<L> {
    #[must_use]
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            model: OnceCell::new(),
            device: Mutex::new(()),
            load_attempts: AtomicUsize::new(0),
        }
    }

    /// Loaded model, loading it first if needed
    ///
    /// # Errors
    /// Returns the loader's error; the handle stays empty.
    pub async fn get(&self) -> Result<&L::Model, ModelError> {
        self.model
            .get_or_try_init(|| async {
                let attempt = self.load_attempts.fetch_add(1, Ordering::SeqCst) + 1;
                tracing::info!(attempt, "loading image model");
                let model = self.loader.load().await;
                match &model {
                    Ok(_) => tracing::info!("image model ready"),
                    Err(e) => tracing::warn!(error = %e, "image model failed to load"),
                }
                model
            })
            .await
    }

    #[inline]
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.model.initialized()
    }

    /// How many times the loader has been called
    #[inline]
    #[must_use]
    pub fn load_attempts(&self) -> usize {
        self.load_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<L: ModelLoader> TextToImage for ModelHandle<L> {
    async fn generate(&self, request: &ImageRequest, output: &Path) -> Result<(), ModelError> {
        let model = self.get().await?;
        let _device = self.device.lock().await;
        model.generate(request, output).await
    }

    async fn warm_up(&self) -> Result<(), ModelError> {
        self.get().await.map(|_| ())
    }
}

/// Image model backed by the image stage's external tool
#[derive(Clone)]
pub struct ToolImageModel {
    descriptor: StageDescriptor,
    executor: Arc<dyn StageExecutor>,
}

#[async_trait]
impl TextToImage for ToolImageModel {
    async fn generate(&self, request: &ImageRequest, output: &Path) -> Result<(), ModelError> {
        let bindings = Bindings::new()
            .with_path(ArtifactKind::GeneratedImage, output)
            .with_param(params::PROMPT, &request.prompt)
            .with_param(params::SEED, request.params.seed)
            .with_param(params::STEPS, request.params.steps)
            .with_param(params::GUIDANCE, request.params.guidance)
            .with_param(params::MAX_SEQUENCE_LENGTH, request.params.max_sequence_length);

        let run = self.executor.run_stage(&self.descriptor, &bindings).await?;
        match run.output {
            Some(_) => Ok(()),
            None => Err(ModelError::NoOutput(output.to_path_buf())),
        }
    }
}

/// Loads [`ToolImageModel`] by checking the tool installation
#[derive(Clone)]
pub struct ToolImageLoader {
    descriptor: StageDescriptor,
    executor: Arc<dyn StageExecutor>,
}

impl ToolImageLoader {
    #[must_use]
    pub fn new(descriptor: StageDescriptor, executor: Arc<dyn StageExecutor>) -> Self {
        Self {
            descriptor,
            executor,
        }
    }
}

#[async_trait]
impl ModelLoader for ToolImageLoader {
    type Model = ToolImageModel;

    async fn load(&self) -> Result<ToolImageModel, ModelError> {
        self.executor
            .check_installation(&self.descriptor)
            .map_err(|e| ModelError::Tool(e.into()))?;
        Ok(ToolImageModel {
            descriptor: self.descriptor.clone(),
            executor: Arc::clone(&self.executor),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    struct Sleepy {
        active: Arc<AtomicBool>,
        overlapped: Arc<AtomicBool>,
    }

    #[async_trait]
    impl TextToImage for Sleepy {
        async fn generate(&self, _: &ImageRequest, _: &Path) -> Result<(), ModelError> {
            if self.active.swap(true, Ordering::SeqCst) {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.active.store(false, Ordering::SeqCst);
            Ok(())
        }
    }

    struct SleepyLoader {
        fail_first: AtomicBool,
        active: Arc<AtomicBool>,
        overlapped: Arc<AtomicBool>,
    }

    #[async_trait]
    impl ModelLoader for SleepyLoader {
        type Model = Sleepy;

        async fn load(&self) -> Result<Sleepy, ModelError> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail_first.swap(false, Ordering::SeqCst) {
                return Err(ModelError::Load("weights not downloaded".into()));
            }
            Ok(Sleepy {
                active: Arc::clone(&self.active),
                overlapped: Arc::clone(&self.overlapped),
            })
        }
    }

    fn handle(fail_first: bool) -> (Arc<ModelHandle<SleepyLoader>>, Arc<AtomicBool>) {
        let overlapped = Arc::new(AtomicBool::new(false));
        let loader = SleepyLoader {
            fail_first: AtomicBool::new(fail_first),
            active: Arc::new(AtomicBool::new(false)),
            overlapped: Arc::clone(&overlapped),
        };
        (Arc::new(ModelHandle::new(loader)), overlapped)
    }

    fn request() -> ImageRequest {
        ImageRequest {
            prompt: "a red chair".into(),
            params: ImageParams::default(),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_callers_load_once_and_never_overlap() {
        let (handle, overlapped) = handle(false);
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let handle = Arc::clone(&handle);
                tokio::spawn(async move { handle.generate(&request(), Path::new("/unused")).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(handle.load_attempts(), 1);
        assert!(handle.is_loaded());
        assert!(!overlapped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn failed_load_is_retried_by_next_caller() {
        let (handle, _) = handle(true);
        assert!(matches!(handle.warm_up().await, Err(ModelError::Load(_))));
        assert!(!handle.is_loaded());

        handle.generate(&request(), Path::new("/unused")).await.unwrap();
        assert_eq!(handle.load_attempts(), 2);
        assert!(handle.is_loaded());
    }
}

//! Background jobs: named handlers collected from modules, an in-process queue and a worker.
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use anyhow::Context as _;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::container::ProviderSpec;
use crate::instance::Instance;
use crate::registry::ModuleDescriptor;
use crate::token::{ModuleName, Token};

/// Well-known provider token for the application's [`JobQueue`].
pub const JOB_QUEUE: Token = Token::new("job_queue");
/// Module that provides [`JOB_QUEUE`]; modules that enqueue jobs import it.
pub const QUEUE_MODULE: ModuleName = "queue";

type JobFn = Arc<dyn Fn(Value) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// A named job with a JSON payload. Modules list these; the worker runs them.
#[derive(Clone)]
pub struct JobDefinition {
    name: &'static str,
    handler: JobFn,
}

impl fmt::Debug for JobDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobDefinition").field("name", &self.name).finish()
    }
}

impl JobDefinition {
    pub fn new<F, Fut>(name: &'static str, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            name,
            handler: Arc::new(
                move |payload: Value| -> BoxFuture<'static, anyhow::Result<()>> {
                    Box::pin(handler(payload))
                },
            ),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub async fn handle(&self, payload: Value) -> anyhow::Result<()> {
        (self.handler)(payload).await
    }

    pub async fn enqueue(&self, queue: &JobQueue, payload: Value) -> anyhow::Result<JobHandle> {
        queue.push(self.name, payload)
    }
}

/// Typed view of a job: payloads are (de)serialized at the queue boundary.
pub struct Job<T> {
    definition: JobDefinition,
    _payload: PhantomData<fn(T)>,
}

impl<T> Clone for Job<T> {
    fn clone(&self) -> Self {
        Self {
            definition: self.definition.clone(),
            _payload: PhantomData,
        }
    }
}

impl<T> Job<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    pub fn new<F, Fut>(name: &'static str, handler: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let definition = JobDefinition::new(name, move |raw: Value| {
            let handler = handler.clone();
            async move {
                let payload: T = serde_json::from_value(raw)
                    .with_context(|| format!("invalid payload for job '{name}'"))?;
                handler(payload).await
            }
        });
        Self {
            definition,
            _payload: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.definition.name
    }

    pub fn definition(&self) -> JobDefinition {
        self.definition.clone()
    }

    pub async fn handle(&self, payload: T) -> anyhow::Result<()> {
        self.definition.handle(serde_json::to_value(payload)?).await
    }

    pub async fn enqueue(&self, queue: &JobQueue, payload: T) -> anyhow::Result<JobHandle> {
        let payload = serde_json::to_value(payload)
            .with_context(|| format!("failed to serialize payload for job '{}'", self.name()))?;
        self.definition.enqueue(queue, payload).await
    }
}

/// Receipt for an enqueued job.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug)]
pub struct QueuedJob {
    pub id: Uuid,
    pub name: String,
    pub payload: Value,
}

/// Sending half of the in-process queue. Cheap to clone.
#[derive(Clone, Debug)]
pub struct JobQueue {
    tx: mpsc::UnboundedSender<QueuedJob>,
}

pub type JobReceiver = mpsc::UnboundedReceiver<QueuedJob>;

impl JobQueue {
    pub fn channel() -> (JobQueue, JobReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (JobQueue { tx }, rx)
    }

    /// Descriptor for [`QUEUE_MODULE`] providing this queue under [`JOB_QUEUE`].
    pub fn module(&self) -> ModuleDescriptor {
        ModuleDescriptor::new().provider(ProviderSpec::instance(JOB_QUEUE, Instance::new(self.clone())))
    }

    pub fn push(&self, name: &str, payload: Value) -> anyhow::Result<JobHandle> {
        let id = Uuid::new_v4();
        self.tx
            .send(QueuedJob {
                id,
                name: name.to_string(),
                payload,
            })
            .map_err(|_| anyhow::anyhow!("job queue is closed; '{name}' was not enqueued"))?;
        tracing::debug!(job = name, %id, "Job enqueued");
        Ok(JobHandle {
            id,
            name: name.to_string(),
        })
    }
}

/// Runs queued jobs one at a time, dispatching by name. Failures are logged, never retried.
pub struct Worker {
    jobs: HashMap<&'static str, JobDefinition>,
}

impl Worker {
    pub fn new(jobs: impl IntoIterator<Item = JobDefinition>) -> Self {
        let mut map = HashMap::new();
        for job in jobs {
            map.entry(job.name()).or_insert(job);
        }
        Self { jobs: map }
    }

    pub fn job_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.jobs.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Process jobs until the queue closes or `cancel` fires.
    pub async fn run(self, mut rx: JobReceiver, cancel: CancellationToken) -> anyhow::Result<()> {
        tracing::info!(jobs = ?self.job_names(), "Worker started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Worker cancelled");
                    break;
                }
                next = rx.recv() => {
                    match next {
                        Some(job) => {
                            self.process(job).await;
                        }
                        None => {
                            tracing::info!("Job queue closed; worker exiting");
                            break;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Returns whether the job ran successfully.
    pub async fn process(&self, job: QueuedJob) -> bool {
        let Some(def) = self.jobs.get(job.name.as_str()) else {
            tracing::warn!(job = %job.name, id = %job.id, "No handler registered for job");
            return false;
        };
        match def.handle(job.payload).await {
            Ok(()) => {
                tracing::debug!(job = %job.name, id = %job.id, "Job completed");
                true
            }
            Err(err) => {
                tracing::error!(job = %job.name, id = %job.id, error = %format!("{err:#}"), "Job failed");
                false
            }
        }
    }
}

//! Child-process transport for the query worker.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use super::error::{WorkerError, WorkerResult};
use super::protocol::{ExecuteDaxParams, ExecuteDaxResponse, WorkerRequest, WorkerResponse, EXECUTE_DAX};
use crate::config::{PowerBiSettings, Settings};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// How to launch the worker process.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Program, arguments and timeout from the `[worker]` table.
    pub fn from_settings(settings: &Settings) -> WorkerResult<Self> {
        let program = settings
            .worker_path()
            .map_err(|err| WorkerError::Settings(err.to_string()))?;
        Ok(Self {
            program,
            args: settings.worker.args.clone(),
            timeout: Duration::from_secs(settings.worker.timeout_secs),
        })
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Requests written to the worker and still waiting for their response line.
#[derive(Clone, Default)]
struct Inflight {
    waiters: Arc<Mutex<HashMap<String, oneshot::Sender<WorkerResponse>>>>,
}

impl Inflight {
    async fn register(&self, id: &str) -> oneshot::Receiver<WorkerResponse> {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().await.insert(id.to_string(), tx);
        rx
    }

    async fn resolve(&self, response: WorkerResponse) {
        let waiter = self.waiters.lock().await.remove(&response.id);
        match waiter {
            Some(tx) => {
                let _ = tx.send(response);
            }
            None => tracing::warn!(id = %response.id, "worker answered an unknown request"),
        }
    }

    async fn forget(&self, id: &str) {
        self.waiters.lock().await.remove(id);
    }

    async fn abandon_all(&self) {
        let mut waiters = self.waiters.lock().await;
        for (id, tx) in waiters.drain() {
            let _ = tx.send(WorkerResponse::exited(id));
        }
    }
}

/// Reads response lines until the worker closes stdout, then fails whatever is left.
async fn pump_responses(stdout: ChildStdout, inflight: Inflight) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => match serde_json::from_str::<WorkerResponse>(&line) {
                Ok(response) => inflight.resolve(response).await,
                Err(err) => tracing::warn!(error = %err, "discarding malformed worker line"),
            },
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(error = %err, "worker stdout read failed");
                break;
            }
        }
    }
    tracing::debug!("worker stdout closed");
    inflight.abandon_all().await;
}

/// Handle on a running query worker.
///
/// Requests are NDJSON lines on the worker's stdin, each tagged with a fresh
/// uuid; a background task matches response lines on stdout back to their
/// callers. The worker is killed when the handle drops.
pub struct WorkerClient {
    writer: Mutex<BufWriter<ChildStdin>>,
    inflight: Inflight,
    reader: JoinHandle<()>,
    timeout: Duration,
    _process: Child,
}

impl WorkerClient {
    /// Launch `program` with no arguments and the default timeout.
    pub async fn spawn(program: impl AsRef<Path>) -> WorkerResult<Self> {
        Self::launch(WorkerCommand::new(program.as_ref())).await
    }

    pub async fn spawn_with_settings(settings: &Settings) -> WorkerResult<Self> {
        Self::launch(WorkerCommand::from_settings(settings)?).await
    }

    pub async fn launch(command: WorkerCommand) -> WorkerResult<Self> {
        tracing::debug!(
            program = %command.program.display(),
            args = ?command.args,
            timeout_secs = command.timeout.as_secs(),
            "launching query worker"
        );
        let spawn_error = |source: std::io::Error| WorkerError::Spawn {
            program: command.program.clone(),
            source,
        };

        let mut process = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_error)?;

        let (Some(stdin), Some(stdout)) = (process.stdin.take(), process.stdout.take()) else {
            return Err(spawn_error(std::io::Error::other("worker pipes were not captured")));
        };

        let inflight = Inflight::default();
        let reader = tokio::spawn(pump_responses(stdout, inflight.clone()));

        Ok(Self {
            writer: Mutex::new(BufWriter::new(stdin)),
            inflight,
            reader,
            timeout: command.timeout,
            _process: process,
        })
    }

    /// Send one request and decode its result.
    pub async fn request<P, R>(&self, method: &str, params: P) -> WorkerResult<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let request = WorkerRequest {
            id: uuid::Uuid::new_v4().to_string(),
            method: method.to_string(),
            params: serde_json::to_value(params).map_err(WorkerError::Encode)?,
        };

        let response = self.inflight.register(&request.id).await;
        if let Err(err) = self.send(&request).await {
            self.inflight.forget(&request.id).await;
            return Err(err);
        }

        let response = match tokio::time::timeout(self.timeout, response).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(WorkerError::ChannelClosed),
            Err(_) => {
                self.inflight.forget(&request.id).await;
                return Err(WorkerError::Timeout(self.timeout.as_secs()));
            }
        };

        serde_json::from_value(response.into_result()?).map_err(WorkerError::Decode)
    }

    async fn send(&self, request: &WorkerRequest) -> WorkerResult<()> {
        let mut line = serde_json::to_vec(request).map_err(WorkerError::Encode)?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await.map_err(WorkerError::Write)?;
        writer.flush().await.map_err(WorkerError::Write)
    }

    /// Run a DAX statement; without `credentials` the worker uses its own environment.
    pub async fn execute_dax(
        &self,
        dataset_id: &str,
        workspace_id: Option<&str>,
        query: &str,
        credentials: Option<&PowerBiSettings>,
    ) -> WorkerResult<ExecuteDaxResponse> {
        let params = ExecuteDaxParams {
            dataset_id: dataset_id.to_string(),
            workspace_id: workspace_id.map(str::to_string),
            query: query.to_string(),
            credentials: credentials.cloned(),
        };
        self.request(EXECUTE_DAX, params).await
    }

    /// False once the worker has closed its stdout.
    pub fn is_alive(&self) -> bool {
        !self.reader.is_finished()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Drop for WorkerClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

//! In-memory fakes for the ports, shared by unit tests here and in the binary.

use std::{
    future::Future,
    io,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;

use crate::{
    config::BotConfig,
    domain::InstanceRef,
    errors::Error,
    ports::{
        Bot, BotProvider, ComputePort, InstanceView, LongRunningOperation, MessagingPort,
        OperationReport,
    },
    Result,
};

/// Config with fixed values: bot `McBot`, chat `-1001`.
pub fn test_config() -> BotConfig {
    BotConfig::from_lookup(|key| {
        let v = match key {
            "TELEGRAM_TOKEN" => "123:test",
            "TELEGRAM_BOT_NAME" => "McBot",
            "CHAT_ID" => "-1001",
            "INSTANCE_ID" => "mc-server",
            "PROJECT_ID" => "test-project",
            "ZONE_ID" => "us-central1-a",
            _ => return None,
        };
        Some(v.to_string())
    })
    .expect("static test config is complete")
}

/// Telegram update JSON carrying a new message.
pub fn message_update(chat_id: i64, text: &str) -> serde_json::Value {
    serde_json::json!({
        "update_id": 1,
        "message": {
            "message_id": 10,
            "date": 0,
            "chat": { "id": chat_id, "type": "group" },
            "text": text,
        }
    })
}

/// Telegram update JSON for an edit notification.
pub fn edited_update(chat_id: i64, text: &str) -> serde_json::Value {
    serde_json::json!({
        "update_id": 2,
        "edited_message": {
            "message_id": 10,
            "date": 0,
            "chat": { "id": chat_id, "type": "group" },
            "text": text,
        }
    })
}

// ============== Messaging ==============

#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl RecordingMessenger {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent().into_iter().map(|(_, t)| t).collect()
    }
}

#[async_trait]
impl MessagingPort for RecordingMessenger {
    async fn send_markdown(&self, chat_id: &str, text: &str) -> Result<()> {
        if self.fail {
            return Err(Error::External("telegram unavailable".to_string()));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((chat_id.to_string(), text.to_string()));
        }
        Ok(())
    }
}

// ============== Long-running operations ==============

enum Script {
    Done(OperationReport),
    Pending,
    Error(String),
}

pub struct ScriptedOperation {
    id: String,
    script: Script,
    calls: Arc<AtomicUsize>,
}

impl ScriptedOperation {
    pub fn done(id: &str, report: OperationReport) -> Self {
        Self::with(id, Script::Done(report))
    }

    /// Never resolves.
    pub fn pending(id: &str) -> Self {
        Self::with(id, Script::Pending)
    }

    pub fn erroring(id: &str, message: &str) -> Self {
        Self::with(id, Script::Error(message.to_string()))
    }

    fn with(id: &str, script: Script) -> Self {
        Self {
            id: id.to_string(),
            script,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of `wait_done` calls observed.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl LongRunningOperation for ScriptedOperation {
    fn id(&self) -> &str {
        &self.id
    }

    async fn wait_done(&mut self) -> Result<OperationReport> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Done(report) => Ok(report.clone()),
            Script::Pending => std::future::pending().await,
            Script::Error(msg) => Err(Error::External(msg.clone())),
        }
    }
}

// ============== Compute ==============

/// What the fake returns for start/stop.
#[derive(Clone)]
pub enum OpBehavior {
    Succeed,
    Fail { code: String, message: String },
    Hang,
}

pub struct FakeCompute {
    status: String,
    op: OpBehavior,
    calls: Mutex<Vec<String>>,
}

impl FakeCompute {
    pub fn new(status: &str) -> Self {
        Self {
            status: status.to_string(),
            op: OpBehavior::Succeed,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_op(mut self, op: OpBehavior) -> Self {
        self.op = op;
        self
    }

    /// Calls seen so far, e.g. `["get", "stop"]`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|v| v.clone()).unwrap_or_default()
    }

    fn record(&self, call: &str) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call.to_string());
        }
    }

    fn operation(&self, id: &str) -> Box<dyn LongRunningOperation> {
        let op = match &self.op {
            OpBehavior::Succeed => ScriptedOperation::done(id, OperationReport::default()),
            OpBehavior::Fail { code, message } => ScriptedOperation::done(
                id,
                OperationReport {
                    error: Some(crate::ports::OperationError {
                        code: code.clone(),
                        message: message.clone(),
                    }),
                    ..Default::default()
                },
            ),
            OpBehavior::Hang => ScriptedOperation::pending(id),
        };
        Box::new(op)
    }
}

#[async_trait]
impl ComputePort for FakeCompute {
    async fn start(&self, _instance: &InstanceRef) -> Result<Box<dyn LongRunningOperation>> {
        self.record("start");
        Ok(self.operation("op-start"))
    }

    async fn stop(&self, _instance: &InstanceRef) -> Result<Box<dyn LongRunningOperation>> {
        self.record("stop");
        Ok(self.operation("op-stop"))
    }

    async fn get(&self, _instance: &InstanceRef) -> Result<InstanceView> {
        self.record("get");
        Ok(InstanceView {
            status: self.status.clone(),
        })
    }
}

// ============== Bot providers ==============

/// Hands out the same fakes on every `init`.
pub struct StaticBotProvider {
    pub cfg: Arc<BotConfig>,
    pub messenger: Arc<RecordingMessenger>,
    pub compute: Arc<FakeCompute>,
}

impl StaticBotProvider {
    pub fn new(cfg: BotConfig, messenger: RecordingMessenger, compute: FakeCompute) -> Self {
        Self {
            cfg: Arc::new(cfg),
            messenger: Arc::new(messenger),
            compute: Arc::new(compute),
        }
    }
}

#[async_trait]
impl BotProvider for StaticBotProvider {
    async fn init(&self) -> Result<Bot> {
        Ok(Bot {
            cfg: self.cfg.clone(),
            messenger: self.messenger.clone(),
            compute: self.compute.clone(),
        })
    }
}

pub struct FailingBotProvider;

#[async_trait]
impl BotProvider for FailingBotProvider {
    async fn init(&self) -> Result<Bot> {
        Err(Error::Config(
            "TELEGRAM_TOKEN environment variable is required".to_string(),
        ))
    }
}

// ============== Logs ==============

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl io::Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Ok(mut inner) = self.0.lock() {
            inner.extend_from_slice(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `fut` with a thread-local subscriber and return what it logged.
///
/// Only sound on a current-thread runtime, where every poll happens on the
/// thread that installed the subscriber.
pub async fn capture_logs<T>(fut: impl Future<Output = T>) -> (T, String) {
    let buf = SharedBuf::default();
    let writer = buf.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .finish();

    let guard = tracing::subscriber::set_default(subscriber);
    let out = fut.await;
    drop(guard);

    let logs = buf
        .0
        .lock()
        .map(|b| String::from_utf8_lossy(&b).into_owned())
        .unwrap_or_default();
    (out, logs)
}

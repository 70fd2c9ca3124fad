#![allow(dead_code)]

use anyhow::anyhow;
use async_trait::async_trait;
use lorikeet::logging;
use lorikeet::{
    ChildSpec, Exit, ExitReason, Message, Node, NodeConfig, Process, ProcessContext, ProcessHandle, ProcessRef,
    ProcessResult, SpawnOptions, SystemMessage,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

/// Default wait time for async operations during tests in milliseconds
pub const DEFAULT_WAIT_TIME: u64 = 100;

/// How long any single expectation may take before the test fails.
pub const EXPECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Creates a node with short timeouts for testing
pub fn setup_test_node() -> Node {
    logging::init_test();
    Node::new(NodeConfig {
        notify_timeout: Duration::from_millis(200),
        shutdown_timeout: Duration::from_secs(1),
        ..Default::default()
    })
}

/// Waits for a specified duration, useful for async tests that need timing
pub async fn wait_for(duration_millis: u64) {
    tokio::time::sleep(Duration::from_millis(duration_millis)).await;
}

/// Polls `check` until it holds or `EXPECT_TIMEOUT` elapses.
pub async fn eventually<F: FnMut() -> bool>(mut check: F) -> bool {
    let deadline = Instant::now() + EXPECT_TIMEOUT;
    loop {
        if check() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub async fn wait_exit(handle: &ProcessHandle) -> ExitReason {
    tokio::time::timeout(EXPECT_TIMEOUT, handle.wait())
        .await
        .expect("process did not terminate in time")
}

/// Instructions understood by `Probe` and `Worker`.
pub enum Command {
    Fail(String),
    Panic(String),
    Stop(ExitReason),
    Echo(String),
    SpawnLinked(oneshot::Sender<ProcessResult<ProcessRef>>),
    Forward(ProcessRef, String),
    Signal(ProcessRef, ExitReason),
}

async fn execute(ctx: &ProcessContext, command: Command, events: Option<&mpsc::UnboundedSender<Event>>) -> anyhow::Result<()> {
    match command {
        Command::Fail(reason) => Err(anyhow!(reason)),
        Command::Panic(reason) => panic!("{}", reason),
        Command::Stop(reason) => Err(Exit(reason).into()),
        Command::Echo(text) => {
            if let Some(events) = events {
                let _ = events.send(Event::Echo(text));
            }
            Ok(())
        }
        Command::SpawnLinked(reply) => {
            let (probe, _events) = Probe::new();
            let child = ctx
                .spawn_link(probe, SpawnOptions::default())
                .await
                .map(|handle| handle.pid().clone());
            let _ = reply.send(child);
            Ok(())
        }
        Command::Forward(target, text) => {
            ctx.send(&target, Command::Echo(text)).await?;
            Ok(())
        }
        Command::Signal(target, reason) => {
            ctx.exit(&target, reason).await?;
            Ok(())
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Started,
    Echo(String),
    System(SystemMessage),
}

/// Process reporting everything it is handed to a channel.
pub struct Probe {
    trap_exit: bool,
    events: mpsc::UnboundedSender<Event>,
}

impl Probe {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (events, rx) = mpsc::unbounded_channel();
        (Self { trap_exit: false, events }, rx)
    }

    pub fn trapping() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (mut probe, rx) = Self::new();
        probe.trap_exit = true;
        (probe, rx)
    }
}

#[async_trait]
impl Process for Probe {
    async fn init(&mut self, ctx: &ProcessContext) -> anyhow::Result<()> {
        ctx.set_trap_exit(self.trap_exit);
        let _ = self.events.send(Event::Started);
        Ok(())
    }

    async fn handle(&mut self, ctx: &ProcessContext, msg: Message) -> anyhow::Result<()> {
        let msg = match msg {
            Message::System(sys) => {
                let _ = self.events.send(Event::System(sys));
                return Ok(());
            }
            user => user,
        };
        match msg.downcast::<Command>() {
            Ok(command) => execute(ctx, command, Some(&self.events)).await,
            Err(_) => Ok(()),
        }
    }
}

/// Spawns a non-trapping probe.
pub async fn spawn_probe(node: &Node) -> (ProcessHandle, mpsc::UnboundedReceiver<Event>) {
    let (probe, rx) = Probe::new();
    (node.spawn(probe).await.expect("probe spawn"), rx)
}

pub async fn spawn_trapping_probe(node: &Node) -> (ProcessHandle, mpsc::UnboundedReceiver<Event>) {
    let (probe, rx) = Probe::trapping();
    (node.spawn(probe).await.expect("probe spawn"), rx)
}

/// Next system message a probe received, skipping other events.
pub async fn next_system(rx: &mut mpsc::UnboundedReceiver<Event>) -> SystemMessage {
    let wait = async {
        loop {
            match rx.recv().await {
                Some(Event::System(sys)) => return sys,
                Some(_) => continue,
                None => panic!("probe stopped before receiving a system message"),
            }
        }
    };
    tokio::time::timeout(EXPECT_TIMEOUT, wait)
        .await
        .expect("timed out waiting for a system message")
}

pub async fn next_echo(rx: &mut mpsc::UnboundedReceiver<Event>) -> String {
    let wait = async {
        loop {
            match rx.recv().await {
                Some(Event::Echo(text)) => return text,
                Some(_) => continue,
                None => panic!("probe stopped before echoing"),
            }
        }
    };
    tokio::time::timeout(EXPECT_TIMEOUT, wait)
        .await
        .expect("timed out waiting for an echo")
}

/// Asserts that no system message arrives within `DEFAULT_WAIT_TIME`.
pub async fn assert_no_system(rx: &mut mpsc::UnboundedReceiver<Event>) {
    wait_for(DEFAULT_WAIT_TIME).await;
    while let Ok(event) = rx.try_recv() {
        if let Event::System(sys) = event {
            panic!("unexpected system message: {:?}", sys);
        }
    }
}

/// Supervised worker counting how often it was started.
pub struct Worker {
    starts: Arc<AtomicUsize>,
}

impl Worker {
    pub fn spec(name: &str, starts: Arc<AtomicUsize>) -> ChildSpec {
        ChildSpec::worker(name, move || Worker { starts: starts.clone() })
    }
}

#[async_trait]
impl Process for Worker {
    async fn init(&mut self, _ctx: &ProcessContext) -> anyhow::Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn handle(&mut self, ctx: &ProcessContext, msg: Message) -> anyhow::Result<()> {
        match msg.downcast::<Command>() {
            Ok(command) => execute(ctx, command, None).await,
            Err(_) => Ok(()),
        }
    }
}

pub fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

pub fn count(counter: &Arc<AtomicUsize>) -> usize {
    counter.load(Ordering::SeqCst)
}

/// Process whose init always fails.
pub struct FailingInit {
    pub message: &'static str,
}

#[async_trait]
impl Process for FailingInit {
    async fn init(&mut self, _ctx: &ProcessContext) -> anyhow::Result<()> {
        Err(anyhow!(self.message))
    }

    async fn handle(&mut self, _ctx: &ProcessContext, _msg: Message) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Process whose init panics.
pub struct PanickingInit;

#[async_trait]
impl Process for PanickingInit {
    async fn init(&mut self, _ctx: &ProcessContext) -> anyhow::Result<()> {
        panic!("init exploded");
    }

    async fn handle(&mut self, _ctx: &ProcessContext, _msg: Message) -> anyhow::Result<()> {
        Ok(())
    }
}

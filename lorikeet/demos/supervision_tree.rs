use async_trait::async_trait;
use lorikeet::logging;
use lorikeet::{
    ChildSpec, Message, Node, Process, ProcessContext, Registrar, RestartPolicy, Strategy, Supervisor, SupervisorSpec,
};
use std::time::Duration;

// Messages
struct Work(u32);
struct Crash;

// A worker that counts the jobs it handled and fails on request
struct Counter {
    handled: u32,
}

#[async_trait]
impl Process for Counter {
    async fn init(&mut self, ctx: &ProcessContext) -> anyhow::Result<()> {
        println!("counter {} started", ctx.pid());
        Ok(())
    }

    async fn handle(&mut self, ctx: &ProcessContext, msg: Message) -> anyhow::Result<()> {
        if let Some(Work(n)) = msg.downcast_ref::<Work>() {
            self.handled += 1;
            println!("counter {} handled job {} ({} so far)", ctx.pid(), n, self.handled);
            return Ok(());
        }
        if msg.downcast_ref::<Crash>().is_some() {
            anyhow::bail!("counter asked to crash");
        }
        Ok(())
    }
}

// A one-shot job that finishes after being idle for a while
struct Reporter;

#[async_trait]
impl Process for Reporter {
    async fn handle(&mut self, _ctx: &ProcessContext, _msg: Message) -> anyhow::Result<()> {
        Ok(())
    }

    async fn after(&mut self, ctx: &ProcessContext) {
        println!("reporter {} idle, finishing", ctx.pid());
    }

    fn after_timeout(&self) -> Option<Duration> {
        Some(Duration::from_millis(200))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_development();

    let node = Node::default();
    let spec = SupervisorSpec::new(Strategy::one_for_one().with_intensity(3, Duration::from_secs(5)))
        .child(ChildSpec::worker("counter", || Counter { handled: 0 }))
        .child(ChildSpec::worker("reporter", || Reporter).restart(RestartPolicy::Transient));
    let sup = Supervisor::start(&node, spec).await?;

    for child in sup.which_children() {
        println!("child {} -> {}", child.name, child.pid);
    }

    node.send_named("counter", Work(1)).await?;
    node.send_named("counter", Work(2)).await?;
    let before = node.whereis("counter");
    node.send_named("counter", Crash).await?;

    tokio::time::sleep(Duration::from_millis(300)).await;
    println!("counter before crash: {:?}, after restart: {:?}", before, node.whereis("counter"));
    node.send_named("counter", Work(3)).await?;

    tokio::time::sleep(Duration::from_millis(100)).await;
    node.shutdown().await?;
    println!("supervisor exited: {}", sup.wait().await);
    Ok(())
}

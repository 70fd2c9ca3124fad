use anyhow::anyhow;
use lorikeet::{ExitReason, ProcessError, Relation, RelationKind, SystemMessageKind};

mod test_helpers;
use test_helpers::*;

#[tokio::test]
async fn test_link_is_symmetric_and_idempotent() {
    let node = setup_test_node();
    let (a, _a_events) = spawn_probe(&node).await;
    let (b, _b_events) = spawn_probe(&node).await;

    a.link(b.pid()).await.unwrap();
    a.link(b.pid()).await.unwrap();

    assert_eq!(a.relations(), vec![Relation::linked(b.pid().clone())]);
    assert_eq!(b.relations(), vec![Relation::linked(a.pid().clone())]);
}

#[tokio::test]
async fn test_link_to_self_is_rejected() {
    let node = setup_test_node();
    let (a, _events) = spawn_probe(&node).await;

    assert!(matches!(a.link(a.pid()).await, Err(ProcessError::SelfRelation)));
    assert!(matches!(a.monitor(a.pid()).await, Err(ProcessError::SelfRelation)));
    assert!(a.relations().is_empty());
}

#[tokio::test]
async fn test_link_to_disposed_target_fails() {
    let node = setup_test_node();
    let (a, _a_events) = spawn_probe(&node).await;
    let (b, _b_events) = spawn_probe(&node).await;
    b.cancel();
    wait_exit(&b).await;

    assert!(matches!(a.link(b.pid()).await, Err(ProcessError::TargetDisposed)));
    assert!(matches!(a.monitor(b.pid()).await, Err(ProcessError::TargetDisposed)));
    assert!(a.relations().is_empty());
}

#[tokio::test]
async fn test_disposed_process_cannot_link() {
    let node = setup_test_node();
    let (a, _a_events) = spawn_probe(&node).await;
    let (b, _b_events) = spawn_probe(&node).await;
    a.cancel();
    wait_exit(&a).await;

    assert!(matches!(a.link(b.pid()).await, Err(ProcessError::SelfDisposed)));
    assert!(b.relations().is_empty());
}

#[tokio::test]
async fn test_unlink_clears_both_sides() {
    let node = setup_test_node();
    let (a, _a_events) = spawn_probe(&node).await;
    let (b, mut b_events) = spawn_trapping_probe(&node).await;
    a.link(b.pid()).await.unwrap();

    a.unlink(b.pid()).await.unwrap();
    assert!(a.relations().is_empty());
    assert!(b.relations().is_empty());

    a.send(Command::Fail("boom".into())).await.unwrap();
    wait_exit(&a).await;
    assert_no_system(&mut b_events).await;
    assert!(b.is_alive());
}

#[tokio::test]
async fn test_normal_exit_does_not_cascade() {
    let node = setup_test_node();
    let (a, _a_events) = spawn_probe(&node).await;
    let (b, mut b_events) = spawn_probe(&node).await;
    a.link(b.pid()).await.unwrap();

    a.send(Command::Stop(ExitReason::Normal)).await.unwrap();
    assert_eq!(wait_exit(&a).await, ExitReason::Normal);

    assert!(eventually(|| b.relations().is_empty()).await);
    assert_no_system(&mut b_events).await;
    assert!(b.is_alive());
}

#[tokio::test]
async fn test_abnormal_exit_cascades_through_links() {
    let node = setup_test_node();
    let (a, _a_events) = spawn_probe(&node).await;
    let (b, _b_events) = spawn_probe(&node).await;
    let (c, mut c_events) = spawn_probe(&node).await;
    a.link(b.pid()).await.unwrap();
    c.monitor(a.pid()).await.unwrap();
    c.monitor(b.pid()).await.unwrap();

    b.send(Command::Fail("boom".into())).await.unwrap();

    assert_eq!(wait_exit(&b).await, ExitReason::error(anyhow!("boom")));
    assert_eq!(wait_exit(&a).await, ExitReason::error(anyhow!("boom")));

    let mut downs = vec![next_system(&mut c_events).await, next_system(&mut c_events).await];
    downs.sort_by_key(|down| down.sender == *a.pid());
    assert_eq!(downs[0].kind, SystemMessageKind::Down);
    assert_eq!(&downs[0].sender, b.pid());
    assert_eq!(downs[1].kind, SystemMessageKind::Down);
    assert_eq!(&downs[1].sender, a.pid());
    assert_eq!(downs[1].reason, ExitReason::error(anyhow!("boom")));
    assert!(c.is_alive());
}

#[tokio::test]
async fn test_trapping_process_receives_exit() {
    let node = setup_test_node();
    let (a, mut a_events) = spawn_trapping_probe(&node).await;
    let (b, _b_events) = spawn_probe(&node).await;
    a.link(b.pid()).await.unwrap();

    b.send(Command::Fail("boom".into())).await.unwrap();

    let exit = next_system(&mut a_events).await;
    assert_eq!(exit.kind, SystemMessageKind::Exit);
    assert_eq!(&exit.sender, b.pid());
    assert_eq!(exit.reason, ExitReason::error(anyhow!("boom")));
    assert!(a.is_alive());
    assert!(a.relations().is_empty());
}

#[tokio::test]
async fn test_kill_propagates_to_linked_process() {
    let node = setup_test_node();
    let (a, _a_events) = spawn_probe(&node).await;
    let (b, _b_events) = spawn_trapping_probe(&node).await;
    a.link(b.pid()).await.unwrap();

    node.kill(b.pid()).await.unwrap();

    assert_eq!(wait_exit(&b).await, ExitReason::Kill);
    assert_eq!(wait_exit(&a).await, ExitReason::Kill);
}

#[tokio::test]
async fn test_monitor_records_both_halves() {
    let node = setup_test_node();
    let (watcher, _w_events) = spawn_probe(&node).await;
    let (target, _t_events) = spawn_probe(&node).await;

    watcher.monitor(target.pid()).await.unwrap();

    assert!(watcher.has_relation(&Relation::new(RelationKind::Monitored, target.pid().clone())));
    assert!(target.has_relation(&Relation::new(RelationKind::Monitor, watcher.pid().clone())));
}

#[tokio::test]
async fn test_monitor_reports_normal_exit() {
    let node = setup_test_node();
    let (watcher, mut w_events) = spawn_probe(&node).await;
    let (target, _t_events) = spawn_probe(&node).await;
    watcher.monitor(target.pid()).await.unwrap();

    target.send(Command::Stop(ExitReason::Normal)).await.unwrap();

    let down = next_system(&mut w_events).await;
    assert_eq!(down.kind, SystemMessageKind::Down);
    assert_eq!(&down.sender, target.pid());
    assert_eq!(down.reason, ExitReason::Normal);
    assert!(watcher.is_alive());
    assert!(watcher.relations().is_empty());
}

#[tokio::test]
async fn test_demonitor_stops_notifications() {
    let node = setup_test_node();
    let (watcher, mut w_events) = spawn_probe(&node).await;
    let (target, _t_events) = spawn_probe(&node).await;
    watcher.monitor(target.pid()).await.unwrap();

    watcher.demonitor(target.pid()).await.unwrap();
    assert!(target.relations().is_empty());

    target.send(Command::Fail("boom".into())).await.unwrap();
    wait_exit(&target).await;
    assert_no_system(&mut w_events).await;
}

#[tokio::test]
async fn test_watcher_exit_releases_monitor() {
    let node = setup_test_node();
    let (watcher, _w_events) = spawn_probe(&node).await;
    let (target, _t_events) = spawn_probe(&node).await;
    watcher.monitor(target.pid()).await.unwrap();

    watcher.send(Command::Fail("watcher failed".into())).await.unwrap();
    wait_exit(&watcher).await;

    assert!(eventually(|| target.relations().is_empty()).await);
    assert!(target.is_alive());
}

#[tokio::test]
async fn test_monitor_is_one_directional() {
    let node = setup_test_node();
    let (watcher, _w_events) = spawn_probe(&node).await;
    let (target, mut t_events) = spawn_trapping_probe(&node).await;
    watcher.monitor(target.pid()).await.unwrap();

    watcher.send(Command::Fail("boom".into())).await.unwrap();
    wait_exit(&watcher).await;

    assert_no_system(&mut t_events).await;
    assert!(target.is_alive());
}

#[tokio::test]
async fn test_spawn_link_from_context() {
    let node = setup_test_node();
    let (parent, mut parent_events) = spawn_trapping_probe(&node).await;
    let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();

    parent.send(Command::SpawnLinked(reply_tx)).await.unwrap();
    let child = reply_rx.await.unwrap().unwrap();
    assert!(parent.has_relation(&Relation::linked(child.clone())));

    node.exit(&child, ExitReason::error(anyhow!("child failed"))).await.unwrap();

    let exit = next_system(&mut parent_events).await;
    assert_eq!(exit.kind, SystemMessageKind::Exit);
    assert_eq!(exit.sender, child);
    assert!(parent.is_alive());
}

#[tokio::test]
async fn test_messages_between_processes() {
    let node = setup_test_node();
    let (a, _a_events) = spawn_probe(&node).await;
    let (b, mut b_events) = spawn_probe(&node).await;

    a.send(Command::Forward(b.pid().clone(), "hello".into())).await.unwrap();

    assert_eq!(next_echo(&mut b_events).await, "hello");
}

#[tokio::test]
async fn test_cancel_does_not_cascade_through_links() {
    let node = setup_test_node();
    let (a, mut a_events) = spawn_probe(&node).await;
    let (b, _b_events) = spawn_probe(&node).await;
    a.link(b.pid()).await.unwrap();

    b.cancel();

    assert_eq!(wait_exit(&b).await, ExitReason::Normal);
    assert!(eventually(|| a.relations().is_empty()).await);
    assert_no_system(&mut a_events).await;
    assert!(a.is_alive());
}

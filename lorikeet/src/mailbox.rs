use flume::{Receiver, Sender};
use lorikeet_api::errors::ProcessError;
use lorikeet_api::message::{Message, SystemMessage};
use lorikeet_api::types::{BoxedMessage, ProcessResult};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Dual-queue mailbox with system-message priority.
///
/// Many producers push into two independently bounded flume channels; the
/// owning process is the only consumer. A pending system message is always
/// received before any user message.
#[derive(Debug)]
pub struct Mailbox {
    system_tx: Sender<SystemMessage>,
    system_rx: Receiver<SystemMessage>,
    user_tx: Sender<BoxedMessage>,
    user_rx: Receiver<BoxedMessage>,
    /// Fires once on close and wakes every blocked push and receive.
    closed: CancellationToken,
}

impl Mailbox {
    pub fn new(user_capacity: usize, system_capacity: usize) -> Self {
        let (system_tx, system_rx) = flume::bounded(system_capacity.max(1));
        let (user_tx, user_rx) = flume::bounded(user_capacity.max(1));

        Self {
            system_tx,
            system_rx,
            user_tx,
            user_rx,
            closed: CancellationToken::new(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Enqueues a user message, waiting for space.
    pub async fn push_message(&self, cancel: &CancellationToken, msg: BoxedMessage) -> ProcessResult<()> {
        if self.is_closed() {
            return Err(ProcessError::ClosedMailbox);
        }

        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(ProcessError::ClosedMailbox),
            _ = cancel.cancelled() => Err(ProcessError::Cancelled),
            sent = self.user_tx.send_async(msg) => sent.map_err(|_| ProcessError::ClosedMailbox),
        }
    }

    /// Enqueues a system message, waiting for space.
    pub async fn push_system_message(&self, cancel: &CancellationToken, msg: SystemMessage) -> ProcessResult<()> {
        if self.is_closed() {
            return Err(ProcessError::ClosedMailbox);
        }

        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(ProcessError::ClosedMailbox),
            _ = cancel.cancelled() => Err(ProcessError::Cancelled),
            sent = self.system_tx.send_async(msg) => sent.map_err(|_| ProcessError::ClosedMailbox),
        }
    }

    /// Receives the next message, system messages first.
    ///
    /// `None` or a zero duration waits indefinitely; otherwise an empty
    /// mailbox fails with `ReceiveTimeout` once `timeout` elapses.
    pub async fn receive_timeout(
        &self,
        cancel: &CancellationToken,
        timeout: Option<Duration>,
    ) -> ProcessResult<Message> {
        if self.is_closed() {
            return Err(ProcessError::ClosedMailbox);
        }
        if cancel.is_cancelled() {
            return Err(ProcessError::Cancelled);
        }
        if let Ok(msg) = self.system_rx.try_recv() {
            return Ok(Message::System(msg));
        }
        if let Ok(msg) = self.user_rx.try_recv() {
            return Ok(Message::User(msg));
        }

        let deadline = async {
            match timeout {
                Some(duration) if !duration.is_zero() => tokio::time::sleep(duration).await,
                _ => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(ProcessError::ClosedMailbox),
            _ = cancel.cancelled() => Err(ProcessError::Cancelled),
            Ok(msg) = self.system_rx.recv_async() => Ok(Message::System(msg)),
            Ok(msg) = self.user_rx.recv_async() => Ok(Message::User(msg)),
            _ = deadline => Err(ProcessError::ReceiveTimeout),
        }
    }

    /// Closes the mailbox and drops anything still queued. Idempotent.
    pub fn close(&self) {
        self.closed.cancel();
        let _ = self.system_rx.drain();
        let _ = self.user_rx.drain();
    }

    pub fn len(&self) -> usize {
        self.system_rx.len() + self.user_rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lorikeet_api::message::ExitReason;
    use lorikeet_api::pid::ProcessRef;
    use std::sync::Arc;

    fn user_payload(msg: Message) -> u32 {
        match msg.downcast::<u32>() {
            Ok(value) => value,
            Err(other) => panic!("expected user message, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn system_messages_jump_the_user_backlog() {
        let mailbox = Mailbox::new(8, 8);
        let cancel = CancellationToken::new();

        for i in 0..3u32 {
            mailbox.push_message(&cancel, Box::new(i)).await.unwrap();
        }
        let sender = ProcessRef::new();
        mailbox
            .push_system_message(&cancel, SystemMessage::exit(sender.clone(), ExitReason::Normal))
            .await
            .unwrap();

        let first = mailbox.receive_timeout(&cancel, None).await.unwrap();
        assert_eq!(first.as_system().map(|sys| sys.sender.clone()), Some(sender));

        for expected in 0..3u32 {
            let msg = mailbox.receive_timeout(&cancel, None).await.unwrap();
            assert_eq!(user_payload(msg), expected);
        }
        assert!(mailbox.is_empty());
    }

    #[tokio::test]
    async fn receive_times_out_on_empty_mailbox() {
        let mailbox = Mailbox::new(1, 1);
        let cancel = CancellationToken::new();

        let err = mailbox
            .receive_timeout(&cancel, Some(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::ReceiveTimeout));
    }

    #[tokio::test]
    async fn zero_timeout_waits_for_a_message() {
        let mailbox = Arc::new(Mailbox::new(1, 1));
        let cancel = CancellationToken::new();

        let producer = {
            let mailbox = mailbox.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                mailbox.push_message(&cancel, Box::new(7u32)).await
            })
        };

        let msg = mailbox.receive_timeout(&cancel, Some(Duration::ZERO)).await.unwrap();
        assert_eq!(user_payload(msg), 7);
        producer.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn close_unblocks_receiver_and_rejects_pushes() {
        let mailbox = Arc::new(Mailbox::new(1, 1));
        let cancel = CancellationToken::new();

        let receiver = {
            let mailbox = mailbox.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { mailbox.receive_timeout(&cancel, None).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        mailbox.close();
        mailbox.close();

        assert!(matches!(receiver.await.unwrap(), Err(ProcessError::ClosedMailbox)));
        assert!(matches!(
            mailbox.push_message(&cancel, Box::new(1u32)).await,
            Err(ProcessError::ClosedMailbox)
        ));
    }

    #[tokio::test]
    async fn full_mailbox_push_honours_cancellation() {
        let mailbox = Mailbox::new(1, 1);
        let cancel = CancellationToken::new();
        mailbox.push_message(&cancel, Box::new(1u32)).await.unwrap();

        let blocked = CancellationToken::new();
        let trigger = blocked.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = mailbox.push_message(&blocked, Box::new(2u32)).await.unwrap_err();
        assert!(matches!(err, ProcessError::Cancelled));
        assert_eq!(mailbox.len(), 1);
    }

    #[tokio::test]
    async fn full_mailbox_push_unblocks_on_close() {
        let mailbox = Arc::new(Mailbox::new(1, 1));
        let cancel = CancellationToken::new();
        mailbox
            .push_system_message(&cancel, SystemMessage::down(ProcessRef::new(), ExitReason::Normal))
            .await
            .unwrap();

        let closer = mailbox.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            closer.close();
        });

        let err = mailbox
            .push_system_message(&cancel, SystemMessage::down(ProcessRef::new(), ExitReason::Normal))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::ClosedMailbox));
    }

    #[tokio::test]
    async fn cancelled_receive_reports_cancellation() {
        let mailbox = Mailbox::new(1, 1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = mailbox.receive_timeout(&cancel, None).await.unwrap_err();
        assert!(matches!(err, ProcessError::Cancelled));
    }
}

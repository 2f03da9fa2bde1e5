//! Log client that replays scripted read results.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use courier_log::{
    LogClient, LogError, LogResult, Message, MessageId, ReadGroupRequest, StartId, StreamMessages,
};
use tokio_util::sync::CancellationToken;

/// Log client whose reads return queued results.
///
/// Every read and acknowledge is recorded. Once the script is exhausted a
/// read blocks until its cancellation token fires, like a live-tail read
/// with nothing to deliver.
#[derive(Default)]
pub struct ScriptedLog {
    script: Mutex<VecDeque<LogResult<Vec<StreamMessages>>>>,
    reads: Mutex<Vec<ReadGroupRequest>>,
    acks: Mutex<Vec<MessageId>>,
    failing_acks: Mutex<HashSet<MessageId>>,
}

impl ScriptedLog {
    /// Create an empty script
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a raw read result.
    pub fn push_read(&self, result: LogResult<Vec<StreamMessages>>) {
        self.script.lock().unwrap().push_back(result);
    }

    /// Queue a single-stream read returning `messages`.
    pub fn push_messages(&self, stream: &str, messages: Vec<Message>) {
        self.push_read(Ok(crate::stream_messages(stream, messages)));
    }

    /// Queue a single-stream read returning no messages.
    pub fn push_empty(&self, stream: &str) {
        self.push_messages(stream, Vec::new());
    }

    /// Queue a failing read.
    pub fn push_error(&self, error: LogError) {
        self.push_read(Err(error));
    }

    /// Make every acknowledge of `id` fail.
    pub fn fail_ack_for(&self, id: MessageId) {
        self.failing_acks.lock().unwrap().insert(id);
    }

    /// Read requests issued so far
    pub fn reads(&self) -> Vec<ReadGroupRequest> {
        self.reads.lock().unwrap().clone()
    }

    /// Cursor of every read issued so far
    pub fn read_starts(&self) -> Vec<StartId> {
        self.reads.lock().unwrap().iter().map(|r| r.start).collect()
    }

    /// Number of reads issued so far
    pub fn read_count(&self) -> usize {
        self.reads.lock().unwrap().len()
    }

    /// Acknowledged ids, in call order (failed attempts included)
    pub fn acks(&self) -> Vec<MessageId> {
        self.acks.lock().unwrap().clone()
    }

    /// Number of reads still queued
    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().len()
    }
}

#[async_trait]
impl LogClient for ScriptedLog {
    async fn read_group(
        &self,
        request: &ReadGroupRequest,
        cancel: &CancellationToken,
    ) -> LogResult<Vec<StreamMessages>> {
        self.reads.lock().unwrap().push(request.clone());

        if cancel.is_cancelled() {
            return Err(LogError::Canceled);
        }

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None => {
                cancel.cancelled().await;
                Err(LogError::Canceled)
            }
        }
    }

    async fn ack(&self, _stream: &str, _group: &str, id: &MessageId) -> LogResult<()> {
        self.acks.lock().unwrap().push(*id);

        if self.failing_acks.lock().unwrap().contains(id) {
            return Err(LogError::Backend(format!("scripted ack failure for {}", id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_replays_script_then_blocks_until_cancel() {
        let log = ScriptedLog::new();
        log.push_error(LogError::Timeout);
        log.push_empty("s");
        let cancel = CancellationToken::new();
        let request = ReadGroupRequest::new("s", "g", "c", StartId::NewOnly);

        assert_eq!(log.read_group(&request, &cancel).await, Err(LogError::Timeout));
        assert!(log.read_group(&request, &cancel).await.unwrap()[0].messages.is_empty());

        let blocked = log.read_group(&request, &cancel);
        tokio::pin!(blocked);
        assert!(tokio::time::timeout(Duration::from_millis(20), &mut blocked).await.is_err());

        cancel.cancel();
        assert_eq!(blocked.await, Err(LogError::Canceled));
        assert_eq!(log.read_count(), 3);
    }

    #[tokio::test]
    async fn test_records_acks_and_scripted_failures() {
        let log = ScriptedLog::new();
        log.fail_ack_for(MessageId::new(2, 0));

        assert!(log.ack("s", "g", &MessageId::new(1, 0)).await.is_ok());
        assert!(log.ack("s", "g", &MessageId::new(2, 0)).await.is_err());

        assert_eq!(log.acks(), vec![MessageId::new(1, 0), MessageId::new(2, 0)]);
    }
}

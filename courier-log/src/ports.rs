//! Log client port definition.
//!
//! The port is the only surface the subscription engine needs from the log:
//! a cancellation-aware blocking group read and a per-message acknowledge.
//! Adapters implement it for a concrete backend.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::LogResult;
use crate::types::{MessageId, ReadGroupRequest, StreamMessages};

/// Port for group-scoped consumption of an append log.
///
/// Implementations:
/// - `MemoryLog` - In-process log for testing and development
///
/// Implementations must be safe for concurrent use: a subscription issues
/// acknowledgements from many tasks while its read is outstanding.
#[async_trait]
pub trait LogClient: Send + Sync {
    /// Read messages for a consumer of a group.
    ///
    /// With [`StartId::NewOnly`](crate::StartId::NewOnly) the call waits up to
    /// `request.block` for new data. Without a block window it returns an
    /// empty batch at once.
    ///
    /// # Errors
    ///
    /// - `LogError::Timeout` if the block window elapsed without data
    /// - `LogError::Canceled` promptly after `cancel` fires
    /// - any other variant for operational failures
    async fn read_group(
        &self,
        request: &ReadGroupRequest,
        cancel: &CancellationToken,
    ) -> LogResult<Vec<StreamMessages>>;

    /// Acknowledge a message so it leaves the group's pending list.
    ///
    /// Acknowledging an unknown or already acknowledged id is not an error.
    async fn ack(&self, stream: &str, group: &str, id: &MessageId) -> LogResult<()>;
}

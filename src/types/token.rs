pub type TransferCancellationToken = tokio_util::sync::CancellationToken;

pub fn create_transfer_cancellation_token() -> TransferCancellationToken {
    tokio_util::sync::CancellationToken::new()
}

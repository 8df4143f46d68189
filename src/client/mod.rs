use std::sync::Arc;

use crate::storage::s3::api::S3Api;

pub mod s3;

/// A connection handle to a storage back end.
///
/// A client identifies one endpoint/credential combination. Adapters cache
/// the protocol session built from a client under its `connection_id`, so the
/// id must be stable across calls.
pub trait Client: Send + Sync {
    /// Deterministic identifier of this endpoint/credential combination.
    fn connection_id(&self) -> String;

    /// The S3 control-plane session, for clients that speak S3.
    fn s3_session(&self) -> Option<S3Session> {
        None
    }
}

/// An established S3 session: the bucket plus the API handle operating on it.
#[derive(Clone)]
pub struct S3Session {
    pub bucket: String,
    pub api: Arc<dyn S3Api>,
}

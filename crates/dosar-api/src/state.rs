//! Shared request state.

use dosar_blob::BlobStore;
use dosar_store::Store;
use dosar_upload::UploadCoordinator;

/// Handles shared by every request handler. All members are cheap clones
/// over pooled or path-rooted resources.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub blob: BlobStore,
    pub uploads: UploadCoordinator,
}

//! Mock implementations of the external collaborators for testing.

mod mock_fetcher;
mod mock_notifier;
mod mock_repo;
mod mock_store;

pub use mock_fetcher::MockFetcher;
pub use mock_notifier::MockNotifier;
pub use mock_repo::MockRepo;
pub use mock_store::{MockStore, RecordedStoreOp};

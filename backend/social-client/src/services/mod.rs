pub mod dispatcher;
pub mod feed;
pub mod likes;
pub mod publisher;
pub mod query_cache;
pub mod saves;

pub use dispatcher::{MutationDispatcher, MutationStatus, QueryKey};
pub use feed::{FeedCursor, FeedPage, FeedPaginator, FeedService};
pub use likes::{LikeCommand, LikeController, LikeDelta, LikeSnapshot};
pub use publisher::PostPublisher;
pub use query_cache::QueryCache;
pub use saves::SaveController;

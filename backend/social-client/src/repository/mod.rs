pub mod posts;
pub mod saves;
pub mod users;

pub use posts::{PagePosition, PostContent, PostRepository};
pub use saves::SaveRepository;
pub use users::UserRepository;

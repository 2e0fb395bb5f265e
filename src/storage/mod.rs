pub mod comment;
pub mod store;

pub use comment::{Comment, IncomingComment, Status};
pub use store::{CommentChange, CommentStore};

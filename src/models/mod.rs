// Models module

pub mod comment;
pub mod follow;
pub mod group;
pub mod post;
pub mod user;

// Re-export commonly used types
pub use comment::{Comment, CommentCard, CommentForm, NewComment};
pub use follow::Follow;
pub use group::{Group, NewGroup};
pub use post::{NewPost, Post, PostCard, PostChanges, PostForm, UploadedImage};
pub use user::{LoginForm, SignupForm, User};

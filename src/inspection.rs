pub mod classifier;

pub use classifier::{classify, Classification, HTTP_TOKENS};

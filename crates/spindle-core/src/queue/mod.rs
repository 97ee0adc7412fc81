//! Queue module: the bounded task buffer between `submit` and the workers.

mod bounded;

pub use bounded::BoundedQueue;

//! Publisher and subscriber node roles (§4.5/§4.6), built on top of
//! [`wsn_pubsub::Pubsub`]. Both are driven the same sans-IO way as the
//! layers beneath them: the host calls an `on_*_incoming`/`on_*_timer`
//! method whenever a frame arrives or a timer it armed fires.

mod publisher;
mod subscriber;

pub use publisher::Publisher;
pub use subscriber::Subscriber;

mod protocol;
mod subscription;

pub use protocol::{ChangeEvent, ChannelSpec};
pub use subscription::RealtimeSubscription;

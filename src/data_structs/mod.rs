//! Core data types: the four detection [`Channel`]s, the validated
//! [`IntensityFrame`] and the linear [`CrosstalkModel`].
mod channel;
mod frame;
mod model;

pub use channel::Channel;
pub use frame::{
    ChannelLayout,
    IntensityFrame,
};
pub use model::CrosstalkModel;

#[cfg(test)]
mod tests;

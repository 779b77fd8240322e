pub mod encryption;
pub mod generation;
pub mod pipeline;
pub mod polling;
pub mod queue;
pub mod storage;
pub mod upscale;
pub mod vendor;

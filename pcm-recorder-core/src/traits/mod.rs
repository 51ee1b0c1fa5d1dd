pub mod block_encoder;
pub mod capture_delegate;
pub mod frame_codec;
pub mod frame_source;

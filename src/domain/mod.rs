// Domain layer - Plain data types shared by every layer
pub mod fan;
pub mod position;
pub mod sample;
pub mod sentence;

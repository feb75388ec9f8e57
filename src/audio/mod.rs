pub mod decoder;
pub mod encoder;
pub mod resample;
pub mod stretch;
pub mod trim;

pub mod audio;
pub mod dispatch;
pub mod dsp;
pub mod packer;

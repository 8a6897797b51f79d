pub mod decode;
pub mod synth;

// Detection request pipeline: upload -> normalize -> stage -> infer -> present -> cleanup

pub mod annotate;
pub mod detection;
pub mod engine;
pub mod error;
pub mod normalize;
pub mod orchestrator;
pub mod staging;
pub mod surface;
pub mod types;

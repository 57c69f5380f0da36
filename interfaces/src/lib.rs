pub mod defs;

pub use defs::{
    ClientConfig, CollectSpec, GenerationRequest, SourceAdapter, SourceBatch, TextGenerator,
};

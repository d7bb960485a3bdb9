pub mod edge_tuner;

pub use edge_tuner::EdgeTuner;

// Module audio - graph, block orchestration and the device callback

pub mod block_plan;
pub mod buffer;
pub mod compiled;
pub mod endpoint;
pub mod engine;
pub mod graph;
pub mod latency;
pub mod process_info;

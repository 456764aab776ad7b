pub mod network;
pub mod trains;
pub mod stations;
pub mod timetable;
pub mod routes;

pub type VertexId = usize;
pub type EdgeId = usize;
pub type TrainId = usize;

/// Distance value for unreachable pairs in shortest-path queries.
pub const INF: f64 = f64::INFINITY;

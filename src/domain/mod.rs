// Domain layer: inventory value types, report shapes and ports (interfaces).

pub mod model;
pub mod ports;
pub mod report;

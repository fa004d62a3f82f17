pub mod rank;
pub mod topology;

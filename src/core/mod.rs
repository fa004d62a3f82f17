pub mod edge;
pub mod node;
pub mod table;
pub mod wallet;

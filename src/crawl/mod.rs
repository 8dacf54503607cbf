pub mod controller;
pub mod frontier;
pub mod pool;
pub mod record;

pub mod bridge;
pub mod workspace;

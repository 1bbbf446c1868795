pub mod check;
pub mod ensemble;
pub mod solve;

pub mod approval;
pub mod field;
pub mod line;
pub mod plan;
pub mod unit;

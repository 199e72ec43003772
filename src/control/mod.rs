pub mod aec;
pub mod registers;

pub use aec::{AecController, AecState};
pub use registers::{RegisterKind, RegisterWrite, SensorModel};

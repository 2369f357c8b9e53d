pub mod nullable;
pub mod reconcile;
pub mod stock;

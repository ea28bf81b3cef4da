pub mod classifier;
pub mod evaluation;
pub mod inference;
pub mod scaler;
pub mod training;

pub mod candle_csv;
pub mod model_store;

pub use model_store::ModelStore;

// Raw market data
pub mod candle;

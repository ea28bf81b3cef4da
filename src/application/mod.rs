// Candle -> feature table -> labeled rows
pub mod features;

// Scaling, classifiers, training and live inference
pub mod ml;

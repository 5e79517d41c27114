/// Модуль предобработки данных

pub mod scaling;

pub use scaling::{rows_to_matrix, FeaturePreprocessor};
